//! Shared helpers for harvest daemon integration tests.
//!
//! Workers are stood in for by small shell scripts written into a temp
//! directory; tests poll for state transitions instead of sleeping fixed
//! amounts.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use harvestd::config::{JobConfig, ScheduleMode};
use harvestd::registry::JobSpec;

/// Write an executable shell script to act as a worker.
pub fn write_worker(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).expect("write worker script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod worker script");
    }
    path
}

/// A worker that stays alive until terminated.
pub fn long_running_worker(dir: &Path, name: &str) -> PathBuf {
    write_worker(dir, name, "#!/bin/sh\nexec sleep 30\n")
}

/// A worker that exits immediately with the given code.
pub fn exiting_worker(dir: &Path, name: &str, code: i32) -> PathBuf {
    write_worker(dir, name, &format!("#!/bin/sh\nexit {}\n", code))
}

/// A worker that ignores SIGTERM, for exercising the kill escalation.
pub fn stubborn_worker(dir: &Path, name: &str) -> PathBuf {
    write_worker(
        dir,
        name,
        "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 1; done\n",
    )
}

/// Job spec around a worker script, with interval-job defaults.
pub fn job_spec(worker: PathBuf) -> JobSpec {
    JobSpec {
        worker,
        scheduled: false,
        defaults: default_config(),
    }
}

pub fn default_config() -> JobConfig {
    JobConfig {
        start_hour: 9,
        end_hour: 22,
        frequency_minutes: 60,
        schedule_mode: ScheduleMode::Always,
        destination_id: "F-1".to_string(),
        username: "user".to_string(),
        password: "secret".to_string(),
        destination_updated: None,
        credentials_updated: None,
    }
}

/// Poll an async condition until it holds or the timeout expires.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        sleep(Duration::from_millis(25)).await;
    }
}

/// Wait for a file to appear on disk.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let path = path.to_path_buf();
    wait_until(timeout, || {
        let path = path.clone();
        async move { path.exists() }
    })
    .await
}
