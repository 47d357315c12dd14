use std::path::PathBuf;

pub mod api;
pub mod config;
pub mod errors;
pub mod registry;
pub mod store;
pub mod supervisor;

const GLOBAL_STATE_DIR: &str = ".harvestd";

/// Directory holding the persisted job document.
pub fn global_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(GLOBAL_STATE_DIR))
        .unwrap_or_else(|| PathBuf::from(GLOBAL_STATE_DIR))
}
