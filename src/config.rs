//! Controller configuration
//!
//! Every option can be given on the command line or through a `FUFU_*`
//! environment variable, which is how the in-cluster Deployment sets them.

use std::time::Duration;

use clap::{Args, ValueEnum};

/// Default field manager recorded on every write
pub const DEFAULT_FIELD_MANAGER: &str = "fufu-controller";

/// Output format of the controller logs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Options of the controller, accepted before or after the `controller` subcommand
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Field manager name used for writes and as the event reporter
    #[arg(long, global = true, env = "FUFU_FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, global = true, env = "FUFU_ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,

    /// Seconds to wait before retrying after a write conflict
    #[arg(long, global = true, env = "FUFU_CONFLICT_REQUEUE_SECS", default_value_t = 1)]
    pub conflict_requeue_secs: u64,

    /// Re-reconcile every Fufu at this interval even without changes
    #[arg(long, global = true, env = "FUFU_RESYNC_SECS")]
    pub resync_secs: Option<u64>,

    /// Only watch Fufus in this namespace (all namespaces when unset)
    #[arg(long, global = true, env = "FUFU_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Log output format
    #[arg(long, global = true, env = "FUFU_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            error_requeue_secs: 30,
            conflict_requeue_secs: 1,
            resync_secs: None,
            watch_namespace: None,
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    /// Timing knobs handed to the reconciler
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            conflict_requeue: Duration::from_secs(self.conflict_requeue_secs),
            resync: self
                .resync_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

/// Requeue timing used by `reconcile` and `error_policy`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Delay before retrying a retryable failure
    pub error_requeue: Duration,
    /// Delay before retrying after a write conflict
    pub conflict_requeue: Duration,
    /// Periodic resync interval after a successful pass
    pub resync: Option<Duration>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ControllerConfig::default().reconcile_settings()
    }
}
