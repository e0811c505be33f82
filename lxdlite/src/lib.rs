//! lxdlite runtime library.
//!
//! Host-side orchestration for VM-hosted LXD containers: a restart state
//! machine that drives image install, disk creation, VM start, LXD start and
//! container create/setup/start against the disk-image/VM-monitor daemon and
//! the container-runtime daemon, with request coalescing, per-stage
//! deadlines, heartbeat-extended timeouts, cancellation and uninstall
//! interrupts.

use std::path::Path;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

// Global guard for tracing-appender to keep the writer thread alive
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub mod manager;
pub mod metrics;
pub mod observer;
pub mod options;
pub mod result;
pub mod rpc;
pub mod store;
pub mod types;

pub use lxdlite_shared::{LxdliteError, LxdliteResult};
pub use manager::{ExportOutcome, GuestManager, GuestManagerBuilder};
pub use metrics::{Corruption, MetricsRecorder, MetricsSink, NullMetrics};
pub use observer::{NullObserver, RestartObserver};
pub use options::{ManagerConfig, RestartOptions, RestartSource};
pub use result::OpResult;
pub use store::ContainerStore;
pub use types::{ContainerId, OsRelease, RestartId, RestartStage, VmType};

/// Initialize tracing for lxdlite.
///
/// Logs are written to `<logs_dir>/lxdlite.log` with daily rotation. Uses
/// the `RUST_LOG` environment variable for filtering (defaults to `info`).
/// Idempotent: subsequent calls return immediately once initialized.
pub fn init_logging(logs_dir: &Path) -> LxdliteResult<()> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        LxdliteError::Storage(format!(
            "Failed to create logs directory {}: {}",
            logs_dir.display(),
            e
        ))
    })?;

    let _ = LOG_GUARD.get_or_init(|| {
        let file_appender = tracing_appender::rolling::daily(logs_dir, "lxdlite.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // If a global default subscriber is already set this returns an
        // error; ignore it to avoid interfering with host-configured tracing.
        let _ = tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_env_filter(env_filter)
            .with_ansi(false)
            .try_init();

        guard
    });

    Ok(())
}
