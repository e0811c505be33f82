//! Terminal outcomes of guest lifecycle operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of a lifecycle operation (restart, stop, export, ...).
///
/// Every public manager entry point that takes a completion channel resolves
/// it with exactly one of these values; failures never cross the manager
/// boundary as panics or transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpResult {
    Success,

    /// Malformed caller input; no RPC was issued.
    ClientError,
    /// Policy or feature gate forbids the operation.
    NotAllowed,
    /// A daemon delivered a malformed or unrecognized payload.
    UnknownError,

    InstallImageLoaderFailed,
    InstallImageLoaderTimedOut,
    CreateDiskImageFailed,
    CreateDiskImageTimedOut,
    VmStartFailed,
    StartTerminaVmTimedOut,
    VmStopFailed,
    StartLxdFailed,
    StartLxdTimedOut,
    CreateContainerFailed,
    CreateContainerTimedOut,
    SetupContainerFailed,
    SetupContainerTimedOut,
    /// The Ansible configuration collaborator reported failure.
    ContainerConfigurationFailed,
    StartContainerFailed,
    StartContainerTimedOut,
    StopContainerFailed,
    DeleteContainerFailed,

    /// The caller cancelled the restart.
    RestartRequestCancelled,
    /// The restart was interrupted by an uninstall or manager shutdown.
    RestartAborted,
    /// The VM stopped while the restart was still in flight.
    RestartFailedVmStopped,

    /// The daemon reports another exclusive operation already running.
    BlockingOperationAlreadyActive,
    ContainerExportImportFailed,
    ContainerExportImportFailedVmStopped,
    ContainerExportImportFailedArchitecture,
    InstallLinuxPackageFailed,
    UninstallPackageFailed,
    UpgradeContainerFailed,
}

impl OpResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OpResult::Success)
    }

    /// True for deadline-expiry outcomes.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            OpResult::InstallImageLoaderTimedOut
                | OpResult::CreateDiskImageTimedOut
                | OpResult::StartTerminaVmTimedOut
                | OpResult::StartLxdTimedOut
                | OpResult::CreateContainerTimedOut
                | OpResult::SetupContainerTimedOut
                | OpResult::StartContainerTimedOut
        )
    }

    /// True when the operation ended because the caller asked it to
    /// (cancel) or because the install was being removed (abort).
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            OpResult::RestartRequestCancelled | OpResult::RestartAborted
        )
    }
}

impl fmt::Display for OpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
