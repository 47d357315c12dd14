//! Durable configuration store.
//!
//! Persists the complete job → config mapping as a single JSON document,
//! written atomically after every mutating control operation so a daemon
//! restart never loses operator changes. Loading overlays the persisted
//! per-job patches onto the registry defaults; an absent or unreadable
//! document falls back to pure defaults and never fails the caller.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{JobConfig, JobConfigPatch};
use crate::errors::{HarvestError, Result};
use crate::registry::Registry;

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted document and merge it over the registry defaults,
    /// per job, per field. Fail-soft: missing or corrupt documents yield
    /// pure defaults.
    pub fn load(&self, registry: &Registry) -> HashMap<String, JobConfig> {
        let patches: HashMap<String, JobConfigPatch> = match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(patches) => patches,
                Err(e) => {
                    warn!(
                        "Ignoring unparsable job document '{}': {}",
                        self.path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(
                    "Failed to read job document '{}', using defaults: {}",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        };

        registry
            .iter()
            .map(|(name, spec)| {
                let config = match patches.get(name) {
                    Some(patch) => patch.apply_over(&spec.defaults),
                    None => spec.defaults.clone(),
                };
                (name.to_string(), config)
            })
            .collect()
    }

    /// Atomically persist the complete mapping, overwriting prior content.
    /// The document holds credentials, so it is written 0o600 on unix.
    pub fn save(&self, configs: &HashMap<String, JobConfig>) -> Result<()> {
        let document: HashMap<&str, JobConfigPatch> = configs
            .iter()
            .map(|(name, config)| (name.as_str(), JobConfigPatch::from(config)))
            .collect();

        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| HarvestError::Internal(format!("Failed to serialize job document: {}", e)))?;

        self.write_secure_file(content.as_bytes())?;
        debug!("Saved job document to {:?}", self.path);
        Ok(())
    }

    /// Write the document to a temp file in the target directory, then
    /// atomically rename it into place.
    fn write_secure_file(&self, content: &[u8]) -> Result<()> {
        let persist_err = |source: std::io::Error| HarvestError::Persistence {
            path: self.path.clone(),
            source,
        };

        let parent = self.path.parent().ok_or_else(|| HarvestError::Internal(
            format!("No parent directory for '{}'", self.path.display()),
        ))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(persist_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(persist_err)?;
        }

        tmp.write_all(content).map_err(persist_err)?;

        tmp.persist(&self.path)
            .map_err(|e| persist_err(e.error))?;

        Ok(())
    }
}
