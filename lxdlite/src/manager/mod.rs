//! Process-wide manager for VM-hosted LXD guests.
//!
//! `GuestManager` owns the registry of in-flight restarts, routes daemon
//! signals to interested restarters, and wraps the one-shot daemon
//! operations (stop VM, export/import, packages, upgrade, uninstall).
//!
//! **Locking strategy**: one `parking_lot::Mutex` guards all mutable state
//! (`registry::Registry`). The lock is only taken for map updates and signal
//! routing, never across an await point; restarter tasks receive everything
//! else over channels.

mod registry;
mod restarter;

use crate::metrics::{MetricsSink, NullMetrics};
use crate::observer::RestartObserver;
use crate::options::{ManagerConfig, RestartOptions};
use crate::result::OpResult;
use crate::rpc::messages::*;
use crate::rpc::{
    AnsibleConfigurator, ContainerService, ImageLoader, NoopConfigurator, NullNotifier,
    ReadyImageLoader, VmNotifier, VmService,
};
use crate::store::ContainerStore;
use crate::types::{ContainerId, OsRelease, RestartId, RestartStage};
use lxdlite_shared::LxdliteResult;
use parking_lot::Mutex;
use registry::{
    AttachedRequest, ExportSlot, ImportSlot, QueuedRestart, Registry, RestarterEvent,
    RestarterHandle,
};
use restarter::{CREATE_CONTAINER_TIMEOUT, Restarter, START_CONTAINER_TIMEOUT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

/// Terminal outcome of a container export, with transfer sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOutcome {
    pub result: OpResult,
    pub container_size: u64,
    pub export_size: u64,
}

impl ExportOutcome {
    fn failed(result: OpResult) -> Self {
        Self {
            result,
            container_size: 0,
            export_size: 0,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) config: ManagerConfig,
    pub(crate) vm_service: Arc<dyn VmService>,
    pub(crate) container_service: Arc<dyn ContainerService>,
    pub(crate) image_loader: Arc<dyn ImageLoader>,
    pub(crate) ansible: Arc<dyn AnsibleConfigurator>,
    pub(crate) notifier: Arc<dyn VmNotifier>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) store: Arc<ContainerStore>,
    pub(crate) state: Mutex<Registry>,
    next_restart_id: AtomicU64,
}

impl Inner {
    /// Allocate an id, record the pending entry, and hand the request to the
    /// container's restarter (spawning one when none is live).
    fn register_restart_locked(
        inner: &Arc<Inner>,
        state: &mut Registry,
        container_id: ContainerId,
        options: RestartOptions,
        observer: Option<Arc<dyn RestartObserver>>,
        completion: oneshot::Sender<OpResult>,
    ) -> RestartId {
        let id = RestartId(inner.next_restart_id.fetch_add(1, Ordering::Relaxed));
        state.pending.insert(id, container_id.clone());
        inner.metrics.restart_started(options.restart_source);

        let request = AttachedRequest {
            id,
            options,
            observer,
            completion,
            first_stage: RestartStage::CreateDiskImage,
        };
        Inner::attach_or_spawn(inner, state, container_id, request);
        id
    }

    /// Attach to the live restarter for the container, or spawn a fresh one.
    /// A request that starts a restarter participates from `Start`.
    fn attach_or_spawn(
        inner: &Arc<Inner>,
        state: &mut Registry,
        container_id: ContainerId,
        request: AttachedRequest,
    ) {
        if let Some(handle) = state.flows.get(&container_id) {
            match handle.events.send(RestarterEvent::Attach(request)) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => {
                    // The task is gone but had not unregistered yet.
                    state.flows.remove(&container_id);
                    let RestarterEvent::Attach(request) = event else {
                        unreachable!("attach send returns the attach event");
                    };
                    Inner::spawn_restarter(inner, state, container_id, request);
                    return;
                }
            }
        }
        Inner::spawn_restarter(inner, state, container_id, request);
    }

    fn spawn_restarter(
        inner: &Arc<Inner>,
        state: &mut Registry,
        container_id: ContainerId,
        mut request: AttachedRequest,
    ) {
        request.first_stage = RestartStage::Start;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        state
            .flows
            .insert(container_id.clone(), RestarterHandle { events: events_tx });
        let restarter = Restarter::new(inner.clone(), container_id, events_rx, request);
        tokio::spawn(restarter.run());
    }

    /// Re-home a request that raced a restarter's exit.
    pub(crate) fn reattach(inner: &Arc<Inner>, container_id: ContainerId, request: AttachedRequest) {
        let mut state = inner.state.lock();
        Inner::attach_or_spawn(inner, &mut state, container_id, request);
    }
}

/// Entry point for guest lifecycle orchestration.
///
/// Cheaply cloneable; all clones share one registry. Must be used from
/// within a tokio runtime, since restarters and teardown run as tasks.
#[derive(Clone)]
pub struct GuestManager {
    inner: Arc<Inner>,
}

impl GuestManager {
    pub fn builder(
        vm_service: Arc<dyn VmService>,
        container_service: Arc<dyn ContainerService>,
    ) -> GuestManagerBuilder {
        GuestManagerBuilder::new(vm_service, container_service)
    }

    // ========================================================================
    // RESTART LIFECYCLE
    // ========================================================================

    /// Restart the container with default options.
    ///
    /// Returns the restart's id and the channel its terminal result arrives
    /// on. The result fires exactly once on every path.
    pub fn restart_container(
        &self,
        container_id: ContainerId,
        observer: Option<Arc<dyn RestartObserver>>,
    ) -> (RestartId, oneshot::Receiver<OpResult>) {
        self.restart_container_with_options(container_id, RestartOptions::default(), observer)
    }

    /// Restart the container, or coalesce onto a restart already in flight
    /// for it. A request issued while an uninstall for the container's VM is
    /// tearing down returns `RestartId::UNINITIALIZED` and runs afterwards.
    pub fn restart_container_with_options(
        &self,
        container_id: ContainerId,
        options: RestartOptions,
        observer: Option<Arc<dyn RestartObserver>>,
    ) -> (RestartId, oneshot::Receiver<OpResult>) {
        let (completion, receiver) = oneshot::channel();
        let mut state = self.inner.state.lock();

        if let Some(slot) = state.removals.get_mut(&container_id.vm_name) {
            tracing::debug!(
                container = %container_id,
                "Uninstall in progress, queueing restart"
            );
            slot.queued.push(QueuedRestart {
                container_id,
                options,
                observer,
                completion,
            });
            return (RestartId::UNINITIALIZED, receiver);
        }

        let id = Inner::register_restart_locked(
            &self.inner,
            &mut state,
            container_id,
            options,
            observer,
            completion,
        );
        (id, receiver)
    }

    /// Cancel a pending restart. Idempotent: unknown and already-finished
    /// ids are ignored.
    pub fn cancel_restart(&self, id: RestartId) {
        if id.is_uninitialized() {
            return;
        }
        let state = self.inner.state.lock();
        if let Some(container_id) = state.pending.get(&id) {
            if let Some(handle) = state.flows.get(container_id) {
                let _ = handle.events.send(RestarterEvent::Cancel(id));
            }
        }
    }

    /// True while the restart's completion has not fired.
    pub fn is_restart_pending(&self, id: RestartId) -> bool {
        !id.is_uninitialized() && self.inner.state.lock().pending.contains_key(&id)
    }

    // ========================================================================
    // VM STATE
    // ========================================================================

    /// True once the VM-monitor service confirmed readiness.
    pub fn is_vm_running(&self, vm_name: &str) -> bool {
        self.inner.state.lock().running_vms.contains(vm_name)
    }

    /// Record a VM as running. Production path for readiness confirmed out
    /// of band; also used by tests.
    pub fn add_running_vm(&self, vm_name: &str) {
        self.inner
            .state
            .lock()
            .running_vms
            .insert(vm_name.to_string());
    }

    /// Record a stop in flight for the VM; restarts defer their VM-start
    /// stage until the stop drains. Also used by tests.
    pub fn add_stopping_vm(&self, vm_name: &str) {
        self.inner
            .state
            .lock()
            .stopping_vms
            .insert(vm_name.to_string());
    }

    /// Stop the VM and apply the stopped-VM bookkeeping.
    pub async fn stop_vm(&self, vm_name: &str) -> OpResult {
        if vm_name.is_empty() {
            return OpResult::ClientError;
        }
        self.add_stopping_vm(vm_name);

        match self.inner.vm_service.stop_vm(vm_name).await {
            Err(err) => {
                tracing::warn!(vm_name, error = %err, "StopVm RPC failed");
                self.inner.state.lock().stopping_vms.remove(vm_name);
                OpResult::VmStopFailed
            }
            Ok(response) if !response.success => {
                tracing::warn!(vm_name, reason = %response.failure_reason, "StopVm failed");
                self.inner.state.lock().stopping_vms.remove(vm_name);
                OpResult::VmStopFailed
            }
            Ok(_) => {
                self.apply_vm_stopped(vm_name);
                OpResult::Success
            }
        }
    }

    // ========================================================================
    // DISK IMAGES
    // ========================================================================

    /// Create (or find) the VM's disk image. An empty VM name is rejected
    /// before any RPC is issued.
    pub async fn create_disk_image(
        &self,
        vm_name: &str,
        disk_size_bytes: Option<i64>,
    ) -> (OpResult, PathBuf) {
        if vm_name.is_empty() {
            return (OpResult::ClientError, PathBuf::new());
        }
        let request = CreateDiskImageRequest {
            vm_name: vm_name.to_string(),
            disk_size_bytes,
        };
        match self.inner.vm_service.create_disk_image(request).await {
            Err(err) => {
                tracing::warn!(vm_name, error = %err, "CreateDiskImage RPC failed");
                (OpResult::CreateDiskImageFailed, PathBuf::new())
            }
            Ok(response) => match response.status {
                DiskImageStatus::Created | DiskImageStatus::Exists => {
                    (OpResult::Success, response.disk_path)
                }
                DiskImageStatus::Failed => {
                    tracing::warn!(vm_name, reason = %response.failure_reason, "Create failed");
                    (OpResult::CreateDiskImageFailed, PathBuf::new())
                }
            },
        }
    }

    /// Destroy the VM's disk image; `true` on success. An empty VM name is
    /// rejected before any RPC is issued.
    pub async fn destroy_disk_image(&self, vm_name: &str) -> bool {
        if vm_name.is_empty() {
            return false;
        }
        match self.inner.vm_service.destroy_disk_image(vm_name).await {
            Err(err) => {
                tracing::warn!(vm_name, error = %err, "DestroyDiskImage RPC failed");
                false
            }
            Ok(response) => {
                if !response.success {
                    tracing::warn!(vm_name, reason = %response.failure_reason, "Destroy failed");
                }
                response.success
            }
        }
    }

    /// Total size of all VM disks.
    pub async fn list_vm_disks(&self) -> (OpResult, u64) {
        match self.inner.vm_service.list_disks().await {
            Err(err) => {
                tracing::warn!(error = %err, "ListDisks RPC failed");
                (OpResult::UnknownError, 0)
            }
            Ok(response) => (OpResult::Success, response.total_size_bytes),
        }
    }

    // ========================================================================
    // LXD / CONTAINER OPERATIONS
    // ========================================================================

    /// Start LXD inside the VM.
    pub async fn start_lxd(&self, vm_name: &str) -> OpResult {
        match self.inner.container_service.start_lxd(vm_name).await {
            Err(err) => {
                tracing::warn!(vm_name, error = %err, "StartLxd RPC failed");
                OpResult::StartLxdFailed
            }
            Ok(response) => match response.status {
                StartLxdStatus::AlreadyRunning | StartLxdStatus::Starting => OpResult::Success,
                StartLxdStatus::Failed => OpResult::StartLxdFailed,
            },
        }
    }

    /// Create the container, waiting for the created signal when the daemon
    /// reports the create as asynchronous.
    pub async fn create_lxd_container(&self, container_id: &ContainerId) -> OpResult {
        let response = match self
            .inner
            .container_service
            .create_container(container_id)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Create RPC failed");
                return OpResult::CreateContainerFailed;
            }
            Ok(response) => response,
        };

        match response.status {
            CreateContainerStatus::Exists => {
                if let Err(err) = self.inner.store.register(container_id) {
                    tracing::warn!(error = %err, "Register failed");
                }
                OpResult::Success
            }
            CreateContainerStatus::Failed => OpResult::CreateContainerFailed,
            CreateContainerStatus::Creating => {
                let receiver = {
                    let (tx, rx) = oneshot::channel();
                    self.inner
                        .state
                        .lock()
                        .created_waiters
                        .entry(container_key(container_id))
                        .or_default()
                        .push(tx);
                    rx
                };
                match tokio::time::timeout(CREATE_CONTAINER_TIMEOUT, receiver).await {
                    Err(_) => OpResult::CreateContainerTimedOut,
                    Ok(Err(_)) => OpResult::UnknownError,
                    Ok(Ok(status)) => match status {
                        ContainerCreatedStatus::Created => OpResult::Success,
                        ContainerCreatedStatus::Unknown => OpResult::UnknownError,
                        _ => OpResult::CreateContainerFailed,
                    },
                }
            }
        }
    }

    /// Start the container, waiting for the terminal starting signal when
    /// the daemon reports the start as asynchronous.
    pub async fn start_lxd_container(&self, container_id: &ContainerId) -> OpResult {
        let response = match self
            .inner
            .container_service
            .start_container(container_id)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Start RPC failed");
                return OpResult::StartContainerFailed;
            }
            Ok(response) => response,
        };

        match response.status {
            StartContainerStatus::Started => {
                if let Some(os_release) = &response.os_release {
                    let _ = self.inner.store.set_os_release(container_id, os_release);
                }
                OpResult::Success
            }
            StartContainerStatus::Failed => OpResult::StartContainerFailed,
            StartContainerStatus::Starting => {
                let receiver = {
                    let (tx, rx) = oneshot::channel();
                    self.inner
                        .state
                        .lock()
                        .started_waiters
                        .entry(container_key(container_id))
                        .or_default()
                        .push(tx);
                    rx
                };
                match tokio::time::timeout(START_CONTAINER_TIMEOUT, receiver).await {
                    Err(_) => OpResult::StartContainerTimedOut,
                    Ok(Err(_)) => OpResult::UnknownError,
                    Ok(Ok(status)) => match status {
                        ContainerStartingStatus::Started => OpResult::Success,
                        _ => OpResult::StartContainerFailed,
                    },
                }
            }
        }
    }

    pub async fn stop_lxd_container(&self, container_id: &ContainerId) -> OpResult {
        match self
            .inner
            .container_service
            .stop_container(container_id)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Stop RPC failed");
                OpResult::StopContainerFailed
            }
            Ok(response) if response.success => OpResult::Success,
            Ok(response) => {
                tracing::warn!(
                    container = %container_id,
                    reason = %response.failure_reason,
                    "Container stop failed"
                );
                OpResult::StopContainerFailed
            }
        }
    }

    /// Delete the container. A `DoesNotExist` response still unregisters the
    /// container and counts as success.
    pub async fn delete_lxd_container(&self, container_id: &ContainerId) -> OpResult {
        match self
            .inner
            .container_service
            .delete_container(container_id)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Delete RPC failed");
                OpResult::DeleteContainerFailed
            }
            Ok(response) => match response.status {
                DeleteContainerStatus::Deleting => OpResult::Success,
                DeleteContainerStatus::DoesNotExist => {
                    let _ = self.inner.store.unregister(container_id);
                    OpResult::Success
                }
                DeleteContainerStatus::Failed => OpResult::DeleteContainerFailed,
            },
        }
    }

    // ========================================================================
    // EXPORT / IMPORT
    // ========================================================================

    /// Export the container to `export_path`. Exclusive per container: a
    /// second export while one is in flight fails immediately without
    /// contacting the daemon.
    pub fn export_lxd_container(
        &self,
        container_id: &ContainerId,
        export_path: &Path,
    ) -> oneshot::Receiver<ExportOutcome> {
        let (completion, receiver) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if state.exports.contains_key(container_id) {
                tracing::warn!(container = %container_id, "Export already in progress");
                let _ = completion.send(ExportOutcome::failed(
                    OpResult::ContainerExportImportFailed,
                ));
                return receiver;
            }
            state
                .exports
                .insert(container_id.clone(), ExportSlot { completion });
        }

        let manager = self.clone();
        let container_id = container_id.clone();
        let export_path = export_path.to_path_buf();
        tokio::spawn(async move {
            let started = manager
                .inner
                .container_service
                .export_container(&container_id, &export_path)
                .await;
            match started {
                Ok(response) if response.status == ExportContainerStatus::Exporting => {}
                Ok(response) => {
                    tracing::warn!(reason = %response.failure_reason, "Export rejected");
                    manager.finish_export(
                        &container_id.vm_name,
                        &container_id.container_name,
                        ExportOutcome::failed(OpResult::ContainerExportImportFailed),
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Export RPC failed");
                    manager.finish_export(
                        &container_id.vm_name,
                        &container_id.container_name,
                        ExportOutcome::failed(OpResult::ContainerExportImportFailed),
                    );
                }
            }
        });
        receiver
    }

    /// Import the container from `import_path`. Exclusive per container.
    pub fn import_lxd_container(
        &self,
        container_id: &ContainerId,
        import_path: &Path,
    ) -> oneshot::Receiver<OpResult> {
        let (completion, receiver) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if state.imports.contains_key(container_id) {
                tracing::warn!(container = %container_id, "Import already in progress");
                let _ = completion.send(OpResult::ContainerExportImportFailed);
                return receiver;
            }
            state
                .imports
                .insert(container_id.clone(), ImportSlot { completion });
        }

        let manager = self.clone();
        let container_id = container_id.clone();
        let import_path = import_path.to_path_buf();
        tokio::spawn(async move {
            let started = manager
                .inner
                .container_service
                .import_container(&container_id, &import_path)
                .await;
            match started {
                Ok(response) if response.status == ImportContainerStatus::Importing => {}
                Ok(response) => {
                    tracing::warn!(reason = %response.failure_reason, "Import rejected");
                    manager.finish_import(
                        &container_id.vm_name,
                        &container_id.container_name,
                        OpResult::ContainerExportImportFailed,
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Import RPC failed");
                    manager.finish_import(
                        &container_id.vm_name,
                        &container_id.container_name,
                        OpResult::ContainerExportImportFailed,
                    );
                }
            }
        });
        receiver
    }

    // ========================================================================
    // PACKAGES / UPGRADE
    // ========================================================================

    pub async fn install_linux_package(
        &self,
        container_id: &ContainerId,
        source: InstallSource,
    ) -> OpResult {
        match self
            .inner
            .container_service
            .install_linux_package(container_id, source)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Install RPC failed");
                OpResult::InstallLinuxPackageFailed
            }
            Ok(response) => match response.status {
                InstallPackageStatus::Started => OpResult::Success,
                InstallPackageStatus::Failed => {
                    tracing::warn!(reason = %response.failure_reason, "Package install failed");
                    OpResult::InstallLinuxPackageFailed
                }
                InstallPackageStatus::InstallAlreadyActive => {
                    OpResult::BlockingOperationAlreadyActive
                }
            },
        }
    }

    pub async fn uninstall_package_owning_file(
        &self,
        container_id: &ContainerId,
        file_path: &str,
    ) -> OpResult {
        match self
            .inner
            .container_service
            .uninstall_package_owning_file(container_id, file_path)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Uninstall RPC failed");
                OpResult::UninstallPackageFailed
            }
            Ok(response) => match response.status {
                UninstallPackageStatus::Started => OpResult::Success,
                UninstallPackageStatus::Failed => {
                    tracing::warn!(reason = %response.failure_reason, "Package uninstall failed");
                    OpResult::UninstallPackageFailed
                }
                UninstallPackageStatus::BlockingOperationInProgress => {
                    OpResult::BlockingOperationAlreadyActive
                }
            },
        }
    }

    pub async fn upgrade_container(
        &self,
        container_id: &ContainerId,
        target: ContainerVersion,
    ) -> OpResult {
        match self
            .inner
            .container_service
            .upgrade_container(container_id, target)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Upgrade RPC failed");
                OpResult::UpgradeContainerFailed
            }
            Ok(response) => match response.status {
                UpgradeContainerStatus::Started | UpgradeContainerStatus::AlreadyUpgraded => {
                    OpResult::Success
                }
                UpgradeContainerStatus::Failed => OpResult::UpgradeContainerFailed,
            },
        }
    }

    pub async fn cancel_upgrade_container(&self, container_id: &ContainerId) -> OpResult {
        match self
            .inner
            .container_service
            .cancel_upgrade_container(container_id)
            .await
        {
            Err(err) => {
                tracing::warn!(container = %container_id, error = %err, "Cancel RPC failed");
                OpResult::UpgradeContainerFailed
            }
            Ok(response) => match response.status {
                CancelUpgradeStatus::Cancelled | CancelUpgradeStatus::NotRunning => {
                    OpResult::Success
                }
                CancelUpgradeStatus::Failed => OpResult::UpgradeContainerFailed,
            },
        }
    }

    // ========================================================================
    // UNINSTALL
    // ========================================================================

    /// Remove everything on the named VM: abort its restarts (each completes
    /// with `RestartAborted`), stop the VM, destroy its disk image, and
    /// unregister its containers. `is_restart_pending` reports `false` for
    /// the aborted ids as soon as this returns.
    pub fn remove_vm(&self, vm_name: &str) -> oneshot::Receiver<OpResult> {
        let (completion, receiver) = oneshot::channel();
        let vm_name = vm_name.to_string();
        {
            let mut state = self.inner.state.lock();
            state.removals.entry(vm_name.clone()).or_default();

            let doomed: Vec<RestartId> = state
                .pending
                .iter()
                .filter(|(_, container)| container.is_on_vm(&vm_name))
                .map(|(id, _)| *id)
                .collect();
            for id in &doomed {
                state.pending.remove(id);
            }
            state.route_to_vm(&vm_name, || RestarterEvent::Abort);
            tracing::info!(%vm_name, aborted = doomed.len(), "Uninstall started");
        }

        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.inner.vm_service.stop_vm(&vm_name).await {
                tracing::warn!(%vm_name, error = %err, "StopVm during uninstall failed");
            }
            manager.apply_vm_stopped(&vm_name);

            let destroyed = manager.inner.vm_service.destroy_disk_image(&vm_name).await;
            let result = match destroyed {
                Ok(response) if response.success => OpResult::Success,
                Ok(response) => {
                    tracing::warn!(vm_name, reason = %response.failure_reason, "Destroy failed");
                    OpResult::UnknownError
                }
                Err(err) => {
                    tracing::warn!(vm_name, error = %err, "DestroyDiskImage RPC failed");
                    OpResult::UnknownError
                }
            };

            if let Err(err) = manager.inner.store.unregister_vm(&vm_name) {
                tracing::warn!(%vm_name, error = %err, "Store cleanup failed");
            }

            // Restarts absorbed during teardown run now, as fresh restarters.
            let queued = manager
                .inner
                .state
                .lock()
                .removals
                .remove(&vm_name)
                .map(|slot| slot.queued)
                .unwrap_or_default();
            for request in queued {
                let mut state = manager.inner.state.lock();
                Inner::register_restart_locked(
                    &manager.inner,
                    &mut state,
                    request.container_id,
                    request.options,
                    request.observer,
                    request.completion,
                );
            }

            tracing::info!(%vm_name, %result, "Uninstall finished");
            let _ = completion.send(result);
        });
        receiver
    }

    /// Abort every in-flight restart and fail in-flight exports/imports.
    /// Used on session shutdown so no completion is silently dropped.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        for handle in state.flows.values() {
            let _ = handle.events.send(RestarterEvent::Abort);
        }
        for (_, slot) in state.exports.drain() {
            let _ = slot
                .completion
                .send(ExportOutcome::failed(OpResult::ContainerExportImportFailed));
        }
        for (_, slot) in state.imports.drain() {
            let _ = slot.completion.send(OpResult::ContainerExportImportFailed);
        }
        tracing::info!("Manager shutdown requested");
    }

    // ========================================================================
    // METADATA
    // ========================================================================

    pub fn get_container_os_release(&self, container_id: &ContainerId) -> Option<OsRelease> {
        self.inner.store.os_release(container_id).ok().flatten()
    }

    pub fn registered_containers(&self) -> Vec<ContainerId> {
        self.inner.store.registered_containers().unwrap_or_default()
    }

    /// Kernel version captured by the last successful enterprise-reporting
    /// query, if any.
    pub fn last_launch_kernel_version(&self) -> Option<String> {
        self.inner.store.kernel_version().ok().flatten()
    }

    // ========================================================================
    // SIGNAL ROUTING
    // ========================================================================

    /// Forward every signal from the stream to `handle_signal` until the
    /// stream ends.
    pub fn attach_signal_stream<S>(&self, stream: S)
    where
        S: futures::Stream<Item = Signal> + Send + 'static,
    {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(signal) = tokio_stream::StreamExt::next(&mut stream).await {
                manager.handle_signal(signal);
            }
        });
    }

    pub fn handle_signal(&self, signal: Signal) {
        match signal {
            Signal::VmStopped(signal) => self.on_vm_stopped(signal),
            Signal::VmStarted(signal) => self.on_vm_started(signal),
            Signal::LxdProgress(signal) => self.on_lxd_progress(signal),
            Signal::ContainerCreated(signal) => self.on_container_created(signal),
            Signal::ContainerStarting(signal) => self.on_container_starting(signal),
            Signal::ContainerDownloading(signal) => self.on_container_downloading(signal),
            Signal::ContainerDeleted(signal) => self.on_container_deleted(signal),
            Signal::ExportProgress(signal) => self.on_export_progress(signal),
            Signal::ImportProgress(signal) => self.on_import_progress(signal),
        }
    }

    pub fn on_vm_stopped(&self, signal: VmStoppedSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        self.apply_vm_stopped(&signal.vm_name);
    }

    pub fn on_vm_started(&self, signal: VmStartedSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        let mut state = self.inner.state.lock();
        state.running_vms.insert(signal.vm_name.clone());
        state.route_to_vm(&signal.vm_name, || RestarterEvent::VmStarted);
    }

    pub fn on_lxd_progress(&self, signal: LxdProgressSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        let state = self.inner.state.lock();
        state.route_to_vm(&signal.vm_name, || RestarterEvent::LxdProgress(signal.status));
    }

    pub fn on_container_created(&self, signal: ContainerCreatedSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        if signal.status == ContainerCreatedStatus::Created {
            let id = ContainerId::new(&signal.vm_name, &signal.container_name);
            if let Err(err) = self.inner.store.register(&id) {
                tracing::warn!(error = %err, "Register on created-signal failed");
            }
        }
        let mut state = self.inner.state.lock();
        state.resolve_created_waiters(&signal.vm_name, &signal.container_name, signal.status);
        state.route_to_container(
            &signal.vm_name,
            &signal.container_name,
            RestarterEvent::ContainerCreated(signal.status),
        );
    }

    pub fn on_container_starting(&self, signal: ContainerStartingSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        let ContainerStartingSignal {
            vm_name,
            container_name,
            status,
            os_release,
            ..
        } = signal;
        if let Some(os_release) = &os_release {
            let id = ContainerId::new(&vm_name, &container_name);
            let _ = self.inner.store.set_os_release(&id, os_release);
        }
        let mut state = self.inner.state.lock();
        if status != ContainerStartingStatus::Starting {
            state.resolve_started_waiters(&vm_name, &container_name, status);
        }
        state.route_to_container(
            &vm_name,
            &container_name,
            RestarterEvent::ContainerStarting(status, os_release),
        );
    }

    pub fn on_container_downloading(&self, signal: ContainerDownloadingSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        let state = self.inner.state.lock();
        state.route_to_container(
            &signal.vm_name,
            &signal.container_name,
            RestarterEvent::ContainerDownloading,
        );
    }

    pub fn on_container_deleted(&self, signal: ContainerDeletedSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        if signal.status == ContainerDeletedStatus::Deleted {
            let id = ContainerId::new(&signal.vm_name, &signal.container_name);
            if let Err(err) = self.inner.store.unregister(&id) {
                tracing::warn!(error = %err, "Unregister on deleted-signal failed");
            }
        }
    }

    pub fn on_export_progress(&self, signal: ExportProgressSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        let outcome = match signal.status {
            ExportProgressStatus::Streaming => return,
            ExportProgressStatus::Done => ExportOutcome {
                result: OpResult::Success,
                container_size: signal.input_bytes_streamed,
                export_size: signal.bytes_exported,
            },
            ExportProgressStatus::Failed => ExportOutcome {
                result: OpResult::ContainerExportImportFailed,
                container_size: signal.input_bytes_streamed,
                export_size: signal.bytes_exported,
            },
            ExportProgressStatus::FailedArchitecture => ExportOutcome {
                result: OpResult::ContainerExportImportFailedArchitecture,
                container_size: signal.input_bytes_streamed,
                export_size: signal.bytes_exported,
            },
        };
        self.finish_export(&signal.vm_name, &signal.container_name, outcome);
    }

    pub fn on_import_progress(&self, signal: ImportProgressSignal) {
        if !self.owner_matches(&signal.owner_id) {
            return;
        }
        let result = match signal.status {
            ImportProgressStatus::Uploading | ImportProgressStatus::Unpacking => return,
            ImportProgressStatus::Done => OpResult::Success,
            ImportProgressStatus::Failed => OpResult::ContainerExportImportFailed,
            ImportProgressStatus::FailedArchitecture => {
                OpResult::ContainerExportImportFailedArchitecture
            }
        };
        self.finish_import(&signal.vm_name, &signal.container_name, result);
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    fn owner_matches(&self, owner_id: &str) -> bool {
        let expected = &self.inner.config.owner_id;
        if expected.is_empty() || owner_id == expected {
            true
        } else {
            tracing::trace!(owner_id, "Dropping signal for foreign owner");
            false
        }
    }

    /// Stopped-VM bookkeeping shared by the signal path and the stop-VM
    /// response path. Idempotent.
    fn apply_vm_stopped(&self, vm_name: &str) {
        let mut state = self.inner.state.lock();
        state.running_vms.remove(vm_name);
        state.stopping_vms.remove(vm_name);

        let stopped_exports: Vec<ContainerId> = state
            .exports
            .keys()
            .filter(|container| container.is_on_vm(vm_name))
            .cloned()
            .collect();
        for key in stopped_exports {
            if let Some(slot) = state.exports.remove(&key) {
                let _ = slot.completion.send(ExportOutcome::failed(
                    OpResult::ContainerExportImportFailedVmStopped,
                ));
            }
        }

        let stopped_imports: Vec<ContainerId> = state
            .imports
            .keys()
            .filter(|container| container.is_on_vm(vm_name))
            .cloned()
            .collect();
        for key in stopped_imports {
            if let Some(slot) = state.imports.remove(&key) {
                let _ = slot
                    .completion
                    .send(OpResult::ContainerExportImportFailedVmStopped);
            }
        }

        state.route_to_vm(vm_name, || RestarterEvent::VmStopped);
    }

    fn finish_export(&self, vm_name: &str, container_name: &str, outcome: ExportOutcome) {
        let mut state = self.inner.state.lock();
        let key = state
            .exports
            .keys()
            .find(|container| container.matches(vm_name, container_name))
            .cloned();
        if let Some(key) = key
            && let Some(slot) = state.exports.remove(&key)
        {
            let _ = slot.completion.send(outcome);
        }
    }

    fn finish_import(&self, vm_name: &str, container_name: &str, result: OpResult) {
        let mut state = self.inner.state.lock();
        let key = state
            .imports
            .keys()
            .find(|container| container.matches(vm_name, container_name))
            .cloned();
        if let Some(key) = key
            && let Some(slot) = state.imports.remove(&key)
        {
            let _ = slot.completion.send(result);
        }
    }
}

impl std::fmt::Debug for GuestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("GuestManager")
            .field("pending_restarts", &state.pending.len())
            .field("running_vms", &state.running_vms.len())
            .finish()
    }
}

fn container_key(container_id: &ContainerId) -> (String, String) {
    (
        container_id.vm_name.clone(),
        container_id.container_name.clone(),
    )
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for `GuestManager`. The two daemon clients are required; every
/// other collaborator has a functional default.
pub struct GuestManagerBuilder {
    config: ManagerConfig,
    vm_service: Arc<dyn VmService>,
    container_service: Arc<dyn ContainerService>,
    image_loader: Arc<dyn ImageLoader>,
    ansible: Arc<dyn AnsibleConfigurator>,
    notifier: Arc<dyn VmNotifier>,
    metrics: Arc<dyn MetricsSink>,
    store: Option<ContainerStore>,
}

impl GuestManagerBuilder {
    fn new(vm_service: Arc<dyn VmService>, container_service: Arc<dyn ContainerService>) -> Self {
        Self {
            config: ManagerConfig::default(),
            vm_service,
            container_service,
            image_loader: Arc::new(ReadyImageLoader),
            ansible: Arc::new(NoopConfigurator),
            notifier: Arc::new(NullNotifier),
            metrics: Arc::new(NullMetrics),
            store: None,
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.image_loader = loader;
        self
    }

    pub fn ansible(mut self, ansible: Arc<dyn AnsibleConfigurator>) -> Self {
        self.ansible = ansible;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn VmNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use a specific metadata store; defaults to an in-memory store.
    pub fn store(mut self, store: ContainerStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> LxdliteResult<GuestManager> {
        let store = match self.store {
            Some(store) => store,
            None => ContainerStore::in_memory()?,
        };
        Ok(GuestManager {
            inner: Arc::new(Inner {
                config: self.config,
                vm_service: self.vm_service,
                container_service: self.container_service,
                image_loader: self.image_loader,
                ansible: self.ansible,
                notifier: self.notifier,
                metrics: self.metrics,
                store: Arc::new(store),
                state: Mutex::new(Registry::default()),
                next_restart_id: AtomicU64::new(1),
            }),
        })
    }
}

// Compile-time assertion that the manager can cross threads freely.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<GuestManager>;
};
