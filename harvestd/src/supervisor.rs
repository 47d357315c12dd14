//! OS-process lifecycle for harvest workers.
//!
//! The supervisor owns at most one live child process per job name.
//! Process-table mutation goes through one serializing lock; the lock is
//! never held while waiting on a child, so stopping one job does not block
//! status polls or the lifecycle of other jobs. Workers receive their
//! configuration snapshot through the environment at spawn time and are
//! never hot-reloaded; a configuration change that must take effect on a
//! live worker goes through `restart`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::JobConfig;
use crate::errors::{HarvestError, Result};
use crate::registry::JobSpec;

/// How long a worker gets to exit after SIGTERM before it is killed.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Point-in-time view of one job's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    fn stopped() -> Self {
        Self {
            running: false,
            pid: None,
            exit_code: None,
            started_at: None,
        }
    }

    /// Human-readable status text, as shown by the control panel.
    pub fn text(&self) -> String {
        if self.running {
            "Running".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("Stopped (exit code {})", code),
                None => "Stopped".to_string(),
            }
        }
    }
}

/// Result of a start request.
#[derive(Debug)]
pub enum StartOutcome {
    Started { pid: Option<u32> },
    AlreadyRunning,
}

/// Handle for a spawned worker. Retained after the process exits so status
/// can keep reporting the exit code until the next start replaces it.
struct JobProcess {
    child: Child,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    exit_code: Option<i32>,
}

impl JobProcess {
    /// Non-blocking liveness poll; caches the exit code once observed.
    fn poll(&mut self) -> JobStatus {
        if self.exit_code.is_none() {
            match self.child.try_wait() {
                Ok(None) => {
                    return JobStatus {
                        running: true,
                        pid: self.pid,
                        exit_code: None,
                        started_at: Some(self.started_at),
                    };
                }
                Ok(Some(status)) => {
                    self.exit_code = status.code();
                }
                Err(e) => {
                    warn!("Failed to poll worker (pid {:?}): {}", self.pid, e);
                }
            }
        }
        JobStatus {
            running: false,
            pid: self.pid,
            exit_code: self.exit_code,
            started_at: Some(self.started_at),
        }
    }
}

/// Environment passed to a worker at spawn time. The worker reads these
/// once at startup; it never queries back for live updates.
pub fn worker_env(spec: &JobSpec, config: &JobConfig) -> Vec<(String, String)> {
    let mut env = vec![
        ("START_HOUR".to_string(), config.start_hour.to_string()),
        ("END_HOUR".to_string(), config.end_hour.to_string()),
        ("FREQUENCY".to_string(), config.frequency_minutes.to_string()),
        ("FOLDER_ID".to_string(), config.destination_id.clone()),
        ("SCRIPT_USERNAME".to_string(), config.username.clone()),
        ("SCRIPT_PASSWORD".to_string(), config.password.clone()),
    ];
    if spec.scheduled {
        env.push((
            "SCHEDULE_RUN".to_string(),
            config.schedule_mode.as_env_flag().to_string(),
        ));
    }
    env
}

pub struct Supervisor {
    jobs: Mutex<HashMap<String, JobProcess>>,
    grace_period: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_grace_period(STOP_GRACE_PERIOD)
    }

    /// Mainly for tests that exercise the kill escalation without waiting
    /// out the full grace period.
    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            grace_period,
        }
    }

    /// Non-blocking status poll. `running=false` with no exit code if the
    /// job was never started, with the exit code if it terminated.
    pub async fn status(&self, job: &str) -> JobStatus {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job) {
            Some(process) => process.poll(),
            None => JobStatus::stopped(),
        }
    }

    /// Start the worker for `job` with the given configuration snapshot.
    /// Idempotent: a no-op if the job is already running.
    pub async fn start(
        &self,
        job: &str,
        spec: &JobSpec,
        config: &JobConfig,
    ) -> Result<StartOutcome> {
        let mut jobs = self.jobs.lock().await;

        if let Some(process) = jobs.get_mut(job) {
            if process.poll().running {
                debug!("Job {} is already running, start is a no-op", job);
                return Ok(StartOutcome::AlreadyRunning);
            }
            // Stale handle from a previous run; replaced below.
            jobs.remove(job);
        }

        info!("Starting worker for job {}: {:?}", job, spec.worker);

        let child = Command::new(&spec.worker)
            .envs(worker_env(spec, config))
            .spawn()
            .map_err(|source| HarvestError::Spawn {
                job: job.to_string(),
                source,
            })?;

        let pid = child.id();
        debug!("Job {} spawned with PID {:?}", job, pid);

        jobs.insert(
            job.to_string(),
            JobProcess {
                child,
                pid,
                started_at: Utc::now(),
                exit_code: None,
            },
        );

        Ok(StartOutcome::Started { pid })
    }

    /// Stop the worker for `job`. No-op returning `false` if not running.
    /// Sends SIGTERM, waits up to the grace period, then escalates to
    /// SIGKILL; the handle is always cleared before returning Ok. The table
    /// lock is held only to take the handle out, not across the grace wait,
    /// so status polls and other jobs' lifecycle stay responsive.
    pub async fn stop(&self, job: &str) -> Result<bool> {
        let process = {
            let mut jobs = self.jobs.lock().await;
            jobs.remove(job)
        };

        let Some(mut process) = process else {
            debug!("Job {} has no process, stop is a no-op", job);
            return Ok(false);
        };

        if !process.poll().running {
            // Already exited; just drop the stale handle.
            return Ok(false);
        }

        info!("Stopping job {} (pid {:?})", job, process.pid);

        #[cfg(unix)]
        if let Some(pid) = process.pid {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        {
            let _ = process.child.start_kill();
        }

        match tokio::time::timeout(self.grace_period, process.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Job {} stopped with status {:?}", job, status);
            }
            Ok(Err(e)) => {
                warn!("Error waiting for job {} to stop: {}", job, e);
            }
            Err(_) => {
                warn!("Job {} did not stop within the grace period, force killing", job);
                process.child.kill().await.map_err(|_| {
                    HarvestError::TerminationTimeout {
                        job: job.to_string(),
                        pid: process.pid.unwrap_or_default(),
                    }
                })?;
            }
        }

        Ok(true)
    }

    /// Stop then start. Not atomic: a crash between the two leaves the job
    /// stopped, which is acceptable because the subsequent start is
    /// idempotent and operator-retriable.
    pub async fn restart(
        &self,
        job: &str,
        spec: &JobSpec,
        config: &JobConfig,
    ) -> Result<StartOutcome> {
        self.stop(job).await?;
        self.start(job, spec, config).await
    }

    /// Stop every running job. Used on daemon shutdown.
    pub async fn stop_all(&self) -> Result<()> {
        let names: Vec<String> = {
            let jobs = self.jobs.lock().await;
            jobs.keys().cloned().collect()
        };
        for name in names {
            self.stop(&name).await?;
        }
        Ok(())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
