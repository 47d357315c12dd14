//! Fixed set of harvest jobs known to this deployment.
//!
//! The registry maps a job name to the worker executable that performs the
//! actual scrape/convert/upload cycle, plus the job's default configuration.
//! The set is immutable after startup; adding a job is a deployment change,
//! not a runtime operation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{JobConfig, ScheduleMode};
use crate::errors::{HarvestError, Result};

/// Deployment-time description of one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Path to the worker executable.
    pub worker: PathBuf,
    /// Whether the worker honors the `SCHEDULE_RUN` calendar gate.
    pub scheduled: bool,
    pub defaults: JobConfig,
}

#[derive(Debug)]
pub struct Registry {
    jobs: BTreeMap<String, JobSpec>,
}

impl Registry {
    pub fn new(jobs: impl IntoIterator<Item = (String, JobSpec)>) -> Self {
        Self {
            jobs: jobs.into_iter().collect(),
        }
    }

    /// The built-in job set, with worker executables under `workers_dir`.
    pub fn builtin(workers_dir: &Path) -> Self {
        let job = |start_hour, end_hour, frequency_minutes, schedule_mode| JobConfig {
            start_hour,
            end_hour,
            frequency_minutes,
            schedule_mode,
            destination_id: String::new(),
            username: String::new(),
            password: String::new(),
            destination_updated: None,
            credentials_updated: None,
        };

        Self::new([
            (
                "daily".to_string(),
                JobSpec {
                    worker: workers_dir.join("harvest-daily"),
                    scheduled: false,
                    defaults: job(9, 22, 60, ScheduleMode::Always),
                },
            ),
            (
                "pickup".to_string(),
                JobSpec {
                    worker: workers_dir.join("harvest-pickup"),
                    scheduled: false,
                    defaults: job(8, 23, 120, ScheduleMode::Always),
                },
            ),
            (
                "weekly".to_string(),
                JobSpec {
                    worker: workers_dir.join("harvest-weekly"),
                    scheduled: true,
                    defaults: job(9, 22, 60, ScheduleMode::Gated),
                },
            ),
        ])
    }

    pub fn get(&self, name: &str) -> Result<&JobSpec> {
        self.jobs
            .get(name)
            .ok_or_else(|| HarvestError::JobNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JobSpec)> {
        self.jobs.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
