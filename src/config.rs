use std::path::PathBuf;
use std::time::Duration;

use crate::controller::{ControllerConfig, RetryPolicy};

const APP_DIR: &str = "driftguard";
const AUDIT_FILE: &str = "audit.jsonl";

/// Default audit log location: `$XDG_DATA_HOME/driftguard/audit.jsonl`,
/// falling back to the working directory when no data dir is known.
pub fn default_audit_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR).join(AUDIT_FILE))
        .unwrap_or_else(|| PathBuf::from(AUDIT_FILE))
}

/// Tuning knobs shared by the `run`, `watch` and `diff` commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub interval_secs: u64,
}

impl TuningConfig {
    pub fn into_controller_config(self) -> ControllerConfig {
        ControllerConfig {
            concurrency: self.concurrency.max(1),
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            ),
            interval: Duration::from_secs(self.interval_secs.max(1)),
        }
    }
}
