//! Typed payloads exchanged with the disk-image/VM-monitor daemon and the
//! container-runtime daemon.
//!
//! These mirror the daemons' wire messages closely enough to carry every
//! field the orchestrator reacts to; exact wire formats are the transport
//! layer's concern.

use crate::types::OsRelease;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// DISK IMAGE SERVICE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDiskImageRequest {
    pub vm_name: String,
    /// Requested size; `None` lets the service pick.
    pub disk_size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskImageStatus {
    Created,
    Exists,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDiskImageResponse {
    pub status: DiskImageStatus,
    pub disk_path: PathBuf,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyDiskImageResponse {
    pub success: bool,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskInfo {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDisksResponse {
    pub images: Vec<DiskInfo>,
    pub total_size_bytes: u64,
}

// ============================================================================
// VM MONITOR SERVICE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartVmRequest {
    pub vm_name: String,
    pub disk_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmStatus {
    Unknown,
    /// The VM process is up; readiness arrives as a later signal.
    Starting,
    Running,
    Failure,
}

/// Outcome of mounting the user disk during VM start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountResult {
    Success,
    /// Mounted after rolling back to a consistent state; some data was lost.
    PartialDataLoss,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartVmResponse {
    pub status: VmStatus,
    pub mount_result: MountResult,
    /// Free space on the host volume backing the disk image, when known.
    pub free_bytes: Option<u64>,
    pub failure_reason: String,
}

impl Default for StartVmResponse {
    fn default() -> Self {
        Self {
            status: VmStatus::Starting,
            mount_result: MountResult::Success,
            free_bytes: None,
            failure_reason: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopVmResponse {
    pub success: bool,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnterpriseReportingInfoResponse {
    pub success: bool,
    pub vm_kernel_version: String,
    pub failure_reason: String,
}

// ============================================================================
// CONTAINER RUNTIME SERVICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartLxdStatus {
    AlreadyRunning,
    /// Accepted; completion arrives as an `LxdProgressSignal`.
    Starting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLxdResponse {
    pub status: StartLxdStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateContainerStatus {
    /// Accepted; completion arrives as a `ContainerCreatedSignal`.
    Creating,
    Exists,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLxdContainerResponse {
    pub status: CreateContainerStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartContainerStatus {
    Started,
    /// Accepted; completion arrives as `ContainerStartingSignal`s.
    Starting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLxdContainerResponse {
    pub status: StartContainerStatus,
    pub os_release: Option<OsRelease>,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupUserStatus {
    Success,
    AlreadyExists,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupContainerUserResponse {
    pub status: SetupUserStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLxdContainerResponse {
    pub success: bool,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteContainerStatus {
    /// Accepted; a `ContainerDeletedSignal` follows.
    Deleting,
    DoesNotExist,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteLxdContainerResponse {
    pub status: DeleteContainerStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportContainerStatus {
    /// Accepted; progress arrives as `ExportProgressSignal`s.
    Exporting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportLxdContainerResponse {
    pub status: ExportContainerStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportContainerStatus {
    /// Accepted; progress arrives as `ImportProgressSignal`s.
    Importing,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLxdContainerResponse {
    pub status: ImportContainerStatus,
    pub failure_reason: String,
}

/// What to install into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallSource {
    /// A package file visible inside the container.
    PackageFile(PathBuf),
    /// An apt package id, `name;version;arch;data`.
    AptId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallPackageStatus {
    Started,
    Failed,
    InstallAlreadyActive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallLinuxPackageResponse {
    pub status: InstallPackageStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UninstallPackageStatus {
    Started,
    Failed,
    BlockingOperationInProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallPackageOwningFileResponse {
    pub status: UninstallPackageStatus,
    pub failure_reason: String,
}

/// Debian release the container should be upgraded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerVersion {
    Bullseye,
    Bookworm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeContainerStatus {
    Started,
    AlreadyUpgraded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeContainerResponse {
    pub status: UpgradeContainerStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelUpgradeStatus {
    Cancelled,
    NotRunning,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelUpgradeContainerResponse {
    pub status: CancelUpgradeStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideloadStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureForSideloadResponse {
    pub status: SideloadStatus,
    pub failure_reason: String,
}

// ============================================================================
// SIGNALS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmStoppedSignal {
    pub owner_id: String,
    pub vm_name: String,
}

/// The VM's in-guest services are up and accepting container commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmStartedSignal {
    pub owner_id: String,
    pub vm_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LxdProgressStatus {
    Starting,
    Started,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LxdProgressSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub status: LxdProgressStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerCreatedStatus {
    Created,
    DownloadTimedOut,
    Cancelled,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerCreatedSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub container_name: String,
    pub status: ContainerCreatedStatus,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStartingStatus {
    Starting,
    Started,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStartingSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub container_name: String,
    pub status: ContainerStartingStatus,
    pub os_release: Option<OsRelease>,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDownloadingSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub container_name: String,
    /// Rootfs download progress, 0..=100.
    pub download_progress: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerDeletedStatus {
    Deleted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDeletedSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub container_name: String,
    pub status: ContainerDeletedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportProgressStatus {
    Streaming,
    Done,
    Failed,
    FailedArchitecture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProgressSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub container_name: String,
    pub status: ExportProgressStatus,
    pub input_bytes_streamed: u64,
    pub bytes_exported: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportProgressStatus {
    Uploading,
    Unpacking,
    Done,
    Failed,
    FailedArchitecture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProgressSignal {
    pub owner_id: String,
    pub vm_name: String,
    pub container_name: String,
    pub status: ImportProgressStatus,
}

/// Fan-in of every daemon push notification, for stream attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Signal {
    VmStopped(VmStoppedSignal),
    VmStarted(VmStartedSignal),
    LxdProgress(LxdProgressSignal),
    ContainerCreated(ContainerCreatedSignal),
    ContainerStarting(ContainerStartingSignal),
    ContainerDownloading(ContainerDownloadingSignal),
    ContainerDeleted(ContainerDeletedSignal),
    ExportProgress(ExportProgressSignal),
    ImportProgress(ImportProgressSignal),
}
