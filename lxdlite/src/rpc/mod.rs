//! Client seams for the external daemons and collaborators.
//!
//! The orchestrator consumes everything below as trait objects so the
//! transport (D-Bus, gRPC, test fakes) stays out of this crate.

pub mod messages;

pub use messages::*;

use crate::types::ContainerId;
use lxdlite_shared::LxdliteResult;
use std::path::Path;

/// Disk-image and VM-monitor daemon client.
#[async_trait::async_trait]
pub trait VmService: Send + Sync {
    async fn create_disk_image(
        &self,
        request: CreateDiskImageRequest,
    ) -> LxdliteResult<CreateDiskImageResponse>;

    async fn destroy_disk_image(&self, vm_name: &str) -> LxdliteResult<DestroyDiskImageResponse>;

    async fn list_disks(&self) -> LxdliteResult<ListDisksResponse>;

    async fn start_vm(&self, request: StartVmRequest) -> LxdliteResult<StartVmResponse>;

    async fn stop_vm(&self, vm_name: &str) -> LxdliteResult<StopVmResponse>;

    async fn get_vm_enterprise_reporting_info(
        &self,
        vm_name: &str,
    ) -> LxdliteResult<EnterpriseReportingInfoResponse>;
}

/// Container-runtime daemon client.
#[async_trait::async_trait]
pub trait ContainerService: Send + Sync {
    async fn start_lxd(&self, vm_name: &str) -> LxdliteResult<StartLxdResponse>;

    async fn create_container(
        &self,
        id: &ContainerId,
    ) -> LxdliteResult<CreateLxdContainerResponse>;

    async fn start_container(&self, id: &ContainerId)
    -> LxdliteResult<StartLxdContainerResponse>;

    async fn stop_container(&self, id: &ContainerId) -> LxdliteResult<StopLxdContainerResponse>;

    async fn delete_container(
        &self,
        id: &ContainerId,
    ) -> LxdliteResult<DeleteLxdContainerResponse>;

    async fn setup_container_user(
        &self,
        id: &ContainerId,
        username: &str,
    ) -> LxdliteResult<SetupContainerUserResponse>;

    async fn export_container(
        &self,
        id: &ContainerId,
        export_path: &Path,
    ) -> LxdliteResult<ExportLxdContainerResponse>;

    async fn import_container(
        &self,
        id: &ContainerId,
        import_path: &Path,
    ) -> LxdliteResult<ImportLxdContainerResponse>;

    async fn install_linux_package(
        &self,
        id: &ContainerId,
        source: InstallSource,
    ) -> LxdliteResult<InstallLinuxPackageResponse>;

    async fn uninstall_package_owning_file(
        &self,
        id: &ContainerId,
        file_path: &str,
    ) -> LxdliteResult<UninstallPackageOwningFileResponse>;

    async fn upgrade_container(
        &self,
        id: &ContainerId,
        target: ContainerVersion,
    ) -> LxdliteResult<UpgradeContainerResponse>;

    async fn cancel_upgrade_container(
        &self,
        id: &ContainerId,
    ) -> LxdliteResult<CancelUpgradeContainerResponse>;

    async fn configure_for_sideload(
        &self,
        vm_name: &str,
    ) -> LxdliteResult<ConfigureForSideloadResponse>;
}

/// Installer for the VM image loader component.
#[async_trait::async_trait]
pub trait ImageLoader: Send + Sync {
    /// Install (or verify) the VM image component. Idempotent.
    async fn install(&self) -> LxdliteResult<()>;
}

/// Loader for hosts where the component ships preinstalled.
pub struct ReadyImageLoader;

#[async_trait::async_trait]
impl ImageLoader for ReadyImageLoader {
    async fn install(&self) -> LxdliteResult<()> {
        Ok(())
    }
}

/// Ansible configuration collaborator used by the SetupContainer stage.
#[async_trait::async_trait]
pub trait AnsibleConfigurator: Send + Sync {
    /// Apply the playbook to the container; `true` on success.
    async fn configure_container(&self, id: &ContainerId, playbook: &Path) -> bool;
}

/// Configurator that treats every playbook as already applied.
pub struct NoopConfigurator;

#[async_trait::async_trait]
impl AnsibleConfigurator for NoopConfigurator {
    async fn configure_container(&self, _id: &ContainerId, _playbook: &Path) -> bool {
        true
    }
}

/// Side-channel user notifications emitted from well-defined points of the
/// VM start stage. Presentation lives outside this crate.
pub trait VmNotifier: Send + Sync {
    fn low_disk_space(&self, vm_name: &str, free_bytes: u64) {
        let _ = (vm_name, free_bytes);
    }
}

/// Notifier that drops every notification.
pub struct NullNotifier;

impl VmNotifier for NullNotifier {}
