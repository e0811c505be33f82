//! Restart progress observation.

use crate::result::OpResult;
use crate::types::RestartStage;

/// Capability set for watching one restart's stage transitions.
///
/// Every method has a no-op default so implementors pick the subset they
/// care about. Several observers may watch the same restarter: each attached
/// request carries its own observer and receives every notification from its
/// attach point onward (plus a single catch-up `on_stage_started` for a
/// stage already in progress at attach time).
pub trait RestartObserver: Send + Sync {
    /// A stage began. Fires exactly once per stage per attached request.
    fn on_stage_started(&self, stage: RestartStage) {
        let _ = stage;
    }

    /// The VM image loader finished (or was already installed).
    fn on_component_loaded(&self, result: OpResult) {
        let _ = result;
    }

    /// The disk image stage finished.
    fn on_disk_image_created(&self, success: bool, result: OpResult, free_bytes: u64) {
        let _ = (success, result, free_bytes);
    }

    /// The VM start stage finished.
    fn on_vm_started(&self, success: bool) {
        let _ = success;
    }

    /// LXD is available inside the VM.
    fn on_lxd_started(&self, result: OpResult) {
        let _ = result;
    }

    /// The container exists (created or found).
    fn on_container_created(&self, result: OpResult) {
        let _ = result;
    }

    /// The container user setup (and optional Ansible run) finished.
    fn on_container_setup(&self, success: bool) {
        let _ = success;
    }

    /// The container is running.
    fn on_container_started(&self, result: OpResult) {
        let _ = result;
    }
}

/// Observer that ignores everything. Useful as an explicit placeholder.
pub struct NullObserver;

impl RestartObserver for NullObserver {}
