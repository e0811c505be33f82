//! Process-wide manager configuration and per-request restart options.

use crate::types::RestartStage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide configuration, consumed once at manager construction.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Owner id stamped on daemon signals; signals for other owners are
    /// dropped at the routing entry points.
    pub owner_id: String,
    /// Policy/feature gate. When false every restart completes immediately
    /// with `NotAllowed`.
    pub lxd_allowed: bool,
    /// Enables the best-effort ADB sideload configuration after a container
    /// start.
    pub sideload_enabled: bool,
    /// Enables the best-effort enterprise-reporting query (kernel version
    /// capture) after a container start.
    pub usage_reporting_enabled: bool,
    /// Username used by the SetupContainer stage when the request does not
    /// carry one.
    pub default_container_username: String,
    /// Free-space threshold below which the low-disk side channel fires
    /// after a VM start.
    pub low_disk_threshold_bytes: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            owner_id: String::new(),
            lxd_allowed: true,
            sideload_enabled: false,
            usage_reporting_enabled: false,
            default_container_username: "user".to_string(),
            low_disk_threshold_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// Why a restart was requested. Only used to key metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestartSource {
    #[default]
    Default,
    Installer,
    MultiContainerCreation,
}

/// Immutable per-request restart configuration.
///
/// Consumed once by the restarter that owns the request.
#[derive(Debug, Clone, Default)]
pub struct RestartOptions {
    /// Overrides `ManagerConfig::default_container_username` for the
    /// SetupContainer stage.
    pub container_username: Option<String>,
    /// When set, SetupContainer delegates to the Ansible configuration
    /// collaborator with this playbook.
    pub ansible_playbook: Option<PathBuf>,
    /// Requested disk image size; `None` lets the disk-image service choose.
    pub disk_size_bytes: Option<i64>,
    /// Truncate the flow after the VM is running.
    pub start_vm_only: bool,
    /// Truncate the flow once LXD is available.
    pub stop_after_lxd_available: bool,
    pub restart_source: RestartSource,
}

impl RestartOptions {
    /// The last stage this request needs to see completed.
    pub fn final_stage(&self) -> RestartStage {
        if self.start_vm_only {
            RestartStage::StartTerminaVm
        } else if self.stop_after_lxd_available {
            RestartStage::StartLxd
        } else {
            RestartStage::StartContainer
        }
    }
}
