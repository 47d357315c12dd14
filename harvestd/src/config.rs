//! Per-job configuration model.
//!
//! This module provides:
//! - `JobConfig` - fully-populated settings for one harvest job
//! - `JobConfigPatch` - partial overrides, the persisted/merge form
//! - `ScheduleMode` - interval-driven vs. calendar-gated execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{HarvestError, Result};

/// How a job decides when to execute an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Run every `frequency_minutes` inside the daily run window.
    Always,
    /// Only run when the worker's own calendar predicate matches
    /// (e.g. weekly report on Friday evening).
    Gated,
}

impl ScheduleMode {
    /// Value passed to the worker in `SCHEDULE_RUN`.
    pub fn as_env_flag(&self) -> &'static str {
        match self {
            ScheduleMode::Always => "0",
            ScheduleMode::Gated => "1",
        }
    }
}

/// Complete settings for one job. Every field has a default supplied by
/// the registry; a persisted override that omits a field falls back to
/// that default, never to absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// First hour of the daily run window, in [0,24).
    pub start_hour: u8,
    /// End hour of the daily run window, in [0,24); exclusive.
    pub end_hour: u8,
    /// Minutes between iterations inside the window. Ignored by gated jobs.
    pub frequency_minutes: u32,
    pub schedule_mode: ScheduleMode,
    /// Opaque identifier of the upload destination.
    pub destination_id: String,
    pub username: String,
    pub password: String,
    /// When the destination was last changed. Audit display only.
    #[serde(default)]
    pub destination_updated: Option<DateTime<Utc>>,
    /// When the credentials were last changed. Audit display only.
    #[serde(default)]
    pub credentials_updated: Option<DateTime<Utc>>,
}

impl JobConfig {
    /// Check the field invariants: hours in [0,24), positive frequency.
    pub fn validate(&self) -> Result<()> {
        if self.start_hour >= 24 || self.end_hour >= 24 {
            return Err(HarvestError::InvalidConfig(format!(
                "run window hours must be in [0,24), got {}..{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.frequency_minutes == 0 {
            return Err(HarvestError::InvalidConfig(
                "frequency must be a positive number of minutes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial per-job overrides. This is what the store persists and what it
/// overlays onto the registry defaults on load, per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_mode: Option<ScheduleMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_updated: Option<DateTime<Utc>>,
}

impl JobConfigPatch {
    /// Overlay this patch onto `defaults`, field by field.
    pub fn apply_over(&self, defaults: &JobConfig) -> JobConfig {
        JobConfig {
            start_hour: self.start_hour.unwrap_or(defaults.start_hour),
            end_hour: self.end_hour.unwrap_or(defaults.end_hour),
            frequency_minutes: self
                .frequency_minutes
                .unwrap_or(defaults.frequency_minutes),
            schedule_mode: self.schedule_mode.unwrap_or(defaults.schedule_mode),
            destination_id: self
                .destination_id
                .clone()
                .unwrap_or_else(|| defaults.destination_id.clone()),
            username: self
                .username
                .clone()
                .unwrap_or_else(|| defaults.username.clone()),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| defaults.password.clone()),
            destination_updated: self
                .destination_updated
                .or(defaults.destination_updated),
            credentials_updated: self
                .credentials_updated
                .or(defaults.credentials_updated),
        }
    }
}

impl From<&JobConfig> for JobConfigPatch {
    fn from(config: &JobConfig) -> Self {
        JobConfigPatch {
            start_hour: Some(config.start_hour),
            end_hour: Some(config.end_hour),
            frequency_minutes: Some(config.frequency_minutes),
            schedule_mode: Some(config.schedule_mode),
            destination_id: Some(config.destination_id.clone()),
            username: Some(config.username.clone()),
            password: Some(config.password.clone()),
            destination_updated: config.destination_updated,
            credentials_updated: config.credentials_updated,
        }
    }
}
