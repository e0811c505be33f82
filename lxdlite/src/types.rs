//! Core identity and value types for guest lifecycle management.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// VM TYPE
// ============================================================================

/// Kind of virtual machine hosting the container runtime.
///
/// Part of a container's identity: two containers with the same names but
/// different VM types are distinct routing keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    /// The standard Termina VM image.
    #[default]
    Termina,
    /// A VM of unrecognized provenance (forward compatibility).
    Unknown,
}

impl VmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmType::Termina => "termina",
            VmType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VmType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "termina" => Ok(VmType::Termina),
            "unknown" => Ok(VmType::Unknown),
            _ => Err(()),
        }
    }
}

// ============================================================================
// CONTAINER ID
// ============================================================================

/// Identity of one container: the VM it lives in plus its name inside LXD.
///
/// Value type, equality-comparable, used as the primary routing key for
/// restarts and daemon signals. Immutable once constructed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId {
    pub vm_name: String,
    pub container_name: String,
    pub vm_type: VmType,
}

impl ContainerId {
    pub fn new(vm_name: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            container_name: container_name.into(),
            vm_type: VmType::Termina,
        }
    }

    pub fn with_vm_type(
        vm_name: impl Into<String>,
        container_name: impl Into<String>,
        vm_type: VmType,
    ) -> Self {
        Self {
            vm_name: vm_name.into(),
            container_name: container_name.into(),
            vm_type,
        }
    }

    /// True when this container lives in the named VM.
    pub fn is_on_vm(&self, vm_name: &str) -> bool {
        self.vm_name == vm_name
    }

    /// True when a daemon signal scoped by (vm, container) targets this id.
    pub fn matches(&self, vm_name: &str, container_name: &str) -> bool {
        self.vm_name == vm_name && self.container_name == container_name
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vm_name, self.container_name)
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContainerId({}/{}, {})",
            self.vm_name, self.container_name, self.vm_type
        )
    }
}

// ============================================================================
// RESTART ID
// ============================================================================

/// Opaque handle to one restart request.
///
/// Allocated by the manager at registration time. `RestartId::UNINITIALIZED`
/// means "no restart was created": the request completed synchronously (e.g.
/// the feature is disabled) or was absorbed by an in-flight uninstall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RestartId(pub u64);

impl RestartId {
    /// Sentinel returned when no restarter was registered for the request.
    pub const UNINITIALIZED: RestartId = RestartId(0);

    pub fn is_uninitialized(&self) -> bool {
        *self == Self::UNINITIALIZED
    }
}

impl fmt::Display for RestartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RESTART STAGE
// ============================================================================

/// One named step of the restart sequence, in forward order.
///
/// The derived `Ord` follows declaration order and is relied on for plan
/// truncation and catch-up decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RestartStage {
    Start,
    InstallImageLoader,
    CreateDiskImage,
    StartTerminaVm,
    StartLxd,
    CreateContainer,
    SetupContainer,
    StartContainer,
}

impl RestartStage {
    /// The stage after this one, or `None` for the last stage.
    pub fn next(&self) -> Option<RestartStage> {
        use RestartStage::*;
        match self {
            Start => Some(InstallImageLoader),
            InstallImageLoader => Some(CreateDiskImage),
            CreateDiskImage => Some(StartTerminaVm),
            StartTerminaVm => Some(StartLxd),
            StartLxd => Some(CreateContainer),
            CreateContainer => Some(SetupContainer),
            SetupContainer => Some(StartContainer),
            StartContainer => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestartStage::Start => "start",
            RestartStage::InstallImageLoader => "install_image_loader",
            RestartStage::CreateDiskImage => "create_disk_image",
            RestartStage::StartTerminaVm => "start_termina_vm",
            RestartStage::StartLxd => "start_lxd",
            RestartStage::CreateContainer => "create_container",
            RestartStage::SetupContainer => "setup_container",
            RestartStage::StartContainer => "start_container",
        }
    }
}

impl fmt::Display for RestartStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// OS RELEASE
// ============================================================================

/// Container OS metadata reported by the container runtime daemon.
///
/// Persisted per container and read back via
/// `GuestManager::get_container_os_release`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    /// Distribution id, e.g. "debian".
    pub id: String,
    /// Distribution version, e.g. "12".
    pub version_id: String,
    /// Human-readable name, e.g. "Debian GNU/Linux 12 (bookworm)".
    pub pretty_name: String,
}
