//! Shared fixtures: fake daemon services with programmable responses and
//! call counters, a recording observer, and an isolated manager context.

#![allow(dead_code)]

use lxdlite::manager::GuestManager;
use lxdlite::metrics::MetricsRecorder;
use lxdlite::observer::RestartObserver;
use lxdlite::options::ManagerConfig;
use lxdlite::rpc::messages::*;
use lxdlite::rpc::{AnsibleConfigurator, ContainerService, ImageLoader, VmNotifier, VmService};
use lxdlite::types::{ContainerId, OsRelease, RestartStage};
use lxdlite_shared::LxdliteResult;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const OWNER: &str = "test-owner";
pub const VM_NAME: &str = "termina";
pub const CONTAINER_NAME: &str = "penguin";

pub fn container_id() -> ContainerId {
    ContainerId::new(VM_NAME, CONTAINER_NAME)
}

/// Let spawned tasks and signal forwarding drain without advancing the
/// (paused) clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// FAKE VM SERVICE
// ============================================================================

struct FakeVmState {
    create_disk_image_response: CreateDiskImageResponse,
    create_disk_image_never_responds: bool,
    start_vm_response: StartVmResponse,
    start_vm_never_responds: bool,
    suppress_vm_started_signal: bool,
    stop_vm_success: bool,
    reporting_response: EnterpriseReportingInfoResponse,
    create_disk_image_calls: usize,
    destroy_disk_image_calls: usize,
    list_disks_calls: usize,
    start_vm_calls: usize,
    stop_vm_calls: usize,
    reporting_calls: usize,
}

impl Default for FakeVmState {
    fn default() -> Self {
        Self {
            create_disk_image_response: CreateDiskImageResponse {
                status: DiskImageStatus::Exists,
                disk_path: PathBuf::from("/run/disks/termina.img"),
                failure_reason: String::new(),
            },
            create_disk_image_never_responds: false,
            // The monitor reports Starting and confirms readiness with a
            // follow-up signal, like the real daemon.
            start_vm_response: StartVmResponse::default(),
            start_vm_never_responds: false,
            suppress_vm_started_signal: false,
            stop_vm_success: true,
            reporting_response: EnterpriseReportingInfoResponse::default(),
            create_disk_image_calls: 0,
            destroy_disk_image_calls: 0,
            list_disks_calls: 0,
            start_vm_calls: 0,
            stop_vm_calls: 0,
            reporting_calls: 0,
        }
    }
}

pub struct FakeVmService {
    state: Mutex<FakeVmState>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl FakeVmService {
    fn new(signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self {
            state: Mutex::new(FakeVmState::default()),
            signals,
        }
    }

    pub fn set_create_disk_image_response(&self, response: CreateDiskImageResponse) {
        self.state.lock().create_disk_image_response = response;
    }

    pub fn set_create_disk_image_never_responds(&self, never: bool) {
        self.state.lock().create_disk_image_never_responds = never;
    }

    pub fn set_start_vm_response(&self, response: StartVmResponse) {
        self.state.lock().start_vm_response = response;
    }

    pub fn set_start_vm_never_responds(&self, never: bool) {
        self.state.lock().start_vm_never_responds = never;
    }

    pub fn set_suppress_vm_started_signal(&self, suppress: bool) {
        self.state.lock().suppress_vm_started_signal = suppress;
    }

    pub fn set_reporting_response(&self, response: EnterpriseReportingInfoResponse) {
        self.state.lock().reporting_response = response;
    }

    pub fn set_stop_vm_success(&self, success: bool) {
        self.state.lock().stop_vm_success = success;
    }

    pub fn create_disk_image_calls(&self) -> usize {
        self.state.lock().create_disk_image_calls
    }

    pub fn destroy_disk_image_calls(&self) -> usize {
        self.state.lock().destroy_disk_image_calls
    }

    pub fn start_vm_calls(&self) -> usize {
        self.state.lock().start_vm_calls
    }

    pub fn stop_vm_calls(&self) -> usize {
        self.state.lock().stop_vm_calls
    }

    pub fn reporting_calls(&self) -> usize {
        self.state.lock().reporting_calls
    }
}

#[async_trait::async_trait]
impl VmService for FakeVmService {
    async fn create_disk_image(
        &self,
        _request: CreateDiskImageRequest,
    ) -> LxdliteResult<CreateDiskImageResponse> {
        let (response, never) = {
            let mut state = self.state.lock();
            state.create_disk_image_calls += 1;
            (
                state.create_disk_image_response.clone(),
                state.create_disk_image_never_responds,
            )
        };
        if never {
            std::future::pending::<()>().await;
        }
        Ok(response)
    }

    async fn destroy_disk_image(&self, _vm_name: &str) -> LxdliteResult<DestroyDiskImageResponse> {
        self.state.lock().destroy_disk_image_calls += 1;
        Ok(DestroyDiskImageResponse {
            success: true,
            failure_reason: String::new(),
        })
    }

    async fn list_disks(&self) -> LxdliteResult<ListDisksResponse> {
        self.state.lock().list_disks_calls += 1;
        Ok(ListDisksResponse::default())
    }

    async fn start_vm(&self, request: StartVmRequest) -> LxdliteResult<StartVmResponse> {
        let (response, never, suppress) = {
            let mut state = self.state.lock();
            state.start_vm_calls += 1;
            (
                state.start_vm_response.clone(),
                state.start_vm_never_responds,
                state.suppress_vm_started_signal,
            )
        };
        if never {
            std::future::pending::<()>().await;
        }
        if response.status == VmStatus::Starting && !suppress {
            let _ = self.signals.send(Signal::VmStarted(VmStartedSignal {
                owner_id: OWNER.to_string(),
                vm_name: request.vm_name,
            }));
        }
        Ok(response)
    }

    async fn stop_vm(&self, _vm_name: &str) -> LxdliteResult<StopVmResponse> {
        let mut state = self.state.lock();
        state.stop_vm_calls += 1;
        Ok(StopVmResponse {
            success: state.stop_vm_success,
            failure_reason: String::new(),
        })
    }

    async fn get_vm_enterprise_reporting_info(
        &self,
        _vm_name: &str,
    ) -> LxdliteResult<EnterpriseReportingInfoResponse> {
        let mut state = self.state.lock();
        state.reporting_calls += 1;
        Ok(state.reporting_response.clone())
    }
}

// ============================================================================
// FAKE CONTAINER SERVICE
// ============================================================================

struct FakeContainerState {
    start_lxd_response: StartLxdResponse,
    suppress_lxd_started_signal: bool,
    create_container_response: CreateLxdContainerResponse,
    create_container_never_responds: bool,
    created_signal_status: ContainerCreatedStatus,
    suppress_created_signal: bool,
    start_container_response: StartLxdContainerResponse,
    start_container_never_responds: bool,
    suppress_started_signal: bool,
    started_signal_os_release: Option<OsRelease>,
    setup_user_response: SetupContainerUserResponse,
    setup_user_never_responds: bool,
    install_response: InstallLinuxPackageResponse,
    uninstall_response: UninstallPackageOwningFileResponse,
    upgrade_response: UpgradeContainerResponse,
    cancel_upgrade_response: CancelUpgradeContainerResponse,
    delete_response: DeleteLxdContainerResponse,
    export_response: ExportLxdContainerResponse,
    import_response: ImportLxdContainerResponse,
    last_setup_username: Option<String>,
    start_lxd_calls: usize,
    create_container_calls: usize,
    start_container_calls: usize,
    setup_user_calls: usize,
    export_calls: usize,
    import_calls: usize,
    sideload_calls: usize,
}

impl Default for FakeContainerState {
    fn default() -> Self {
        Self {
            start_lxd_response: StartLxdResponse {
                status: StartLxdStatus::Starting,
                failure_reason: String::new(),
            },
            suppress_lxd_started_signal: false,
            create_container_response: CreateLxdContainerResponse {
                status: CreateContainerStatus::Creating,
                failure_reason: String::new(),
            },
            create_container_never_responds: false,
            created_signal_status: ContainerCreatedStatus::Created,
            suppress_created_signal: false,
            start_container_response: StartLxdContainerResponse {
                status: StartContainerStatus::Starting,
                os_release: None,
                failure_reason: String::new(),
            },
            start_container_never_responds: false,
            suppress_started_signal: false,
            started_signal_os_release: None,
            setup_user_response: SetupContainerUserResponse {
                status: SetupUserStatus::Success,
                failure_reason: String::new(),
            },
            setup_user_never_responds: false,
            install_response: InstallLinuxPackageResponse {
                status: InstallPackageStatus::Started,
                failure_reason: String::new(),
            },
            uninstall_response: UninstallPackageOwningFileResponse {
                status: UninstallPackageStatus::Started,
                failure_reason: String::new(),
            },
            upgrade_response: UpgradeContainerResponse {
                status: UpgradeContainerStatus::Started,
                failure_reason: String::new(),
            },
            cancel_upgrade_response: CancelUpgradeContainerResponse {
                status: CancelUpgradeStatus::Cancelled,
                failure_reason: String::new(),
            },
            delete_response: DeleteLxdContainerResponse {
                status: DeleteContainerStatus::Deleting,
                failure_reason: String::new(),
            },
            export_response: ExportLxdContainerResponse {
                status: ExportContainerStatus::Exporting,
                failure_reason: String::new(),
            },
            import_response: ImportLxdContainerResponse {
                status: ImportContainerStatus::Importing,
                failure_reason: String::new(),
            },
            last_setup_username: None,
            start_lxd_calls: 0,
            create_container_calls: 0,
            start_container_calls: 0,
            setup_user_calls: 0,
            export_calls: 0,
            import_calls: 0,
            sideload_calls: 0,
        }
    }
}

pub struct FakeContainerService {
    state: Mutex<FakeContainerState>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl FakeContainerService {
    fn new(signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self {
            state: Mutex::new(FakeContainerState::default()),
            signals,
        }
    }

    pub fn set_start_lxd_response(&self, response: StartLxdResponse) {
        self.state.lock().start_lxd_response = response;
    }

    pub fn set_create_container_response(&self, response: CreateLxdContainerResponse) {
        self.state.lock().create_container_response = response;
    }

    pub fn set_create_container_never_responds(&self, never: bool) {
        self.state.lock().create_container_never_responds = never;
    }

    pub fn set_created_signal_status(&self, status: ContainerCreatedStatus) {
        self.state.lock().created_signal_status = status;
    }

    pub fn set_suppress_created_signal(&self, suppress: bool) {
        self.state.lock().suppress_created_signal = suppress;
    }

    pub fn set_start_container_response(&self, response: StartLxdContainerResponse) {
        self.state.lock().start_container_response = response;
    }

    pub fn set_start_container_never_responds(&self, never: bool) {
        self.state.lock().start_container_never_responds = never;
    }

    pub fn set_suppress_started_signal(&self, suppress: bool) {
        self.state.lock().suppress_started_signal = suppress;
    }

    pub fn set_started_signal_os_release(&self, os_release: Option<OsRelease>) {
        self.state.lock().started_signal_os_release = os_release;
    }

    pub fn set_setup_user_response(&self, response: SetupContainerUserResponse) {
        self.state.lock().setup_user_response = response;
    }

    pub fn set_setup_user_never_responds(&self, never: bool) {
        self.state.lock().setup_user_never_responds = never;
    }

    pub fn set_install_response(&self, response: InstallLinuxPackageResponse) {
        self.state.lock().install_response = response;
    }

    pub fn set_uninstall_response(&self, response: UninstallPackageOwningFileResponse) {
        self.state.lock().uninstall_response = response;
    }

    pub fn set_delete_response(&self, response: DeleteLxdContainerResponse) {
        self.state.lock().delete_response = response;
    }

    pub fn last_setup_username(&self) -> Option<String> {
        self.state.lock().last_setup_username.clone()
    }

    pub fn start_lxd_calls(&self) -> usize {
        self.state.lock().start_lxd_calls
    }

    pub fn create_container_calls(&self) -> usize {
        self.state.lock().create_container_calls
    }

    pub fn start_container_calls(&self) -> usize {
        self.state.lock().start_container_calls
    }

    pub fn setup_user_calls(&self) -> usize {
        self.state.lock().setup_user_calls
    }

    pub fn export_calls(&self) -> usize {
        self.state.lock().export_calls
    }

    pub fn sideload_calls(&self) -> usize {
        self.state.lock().sideload_calls
    }
}

#[async_trait::async_trait]
impl ContainerService for FakeContainerService {
    async fn start_lxd(&self, vm_name: &str) -> LxdliteResult<StartLxdResponse> {
        let (response, suppress) = {
            let mut state = self.state.lock();
            state.start_lxd_calls += 1;
            (
                state.start_lxd_response.clone(),
                state.suppress_lxd_started_signal,
            )
        };
        if response.status == StartLxdStatus::Starting && !suppress {
            let _ = self.signals.send(Signal::LxdProgress(LxdProgressSignal {
                owner_id: OWNER.to_string(),
                vm_name: vm_name.to_string(),
                status: LxdProgressStatus::Started,
            }));
        }
        Ok(response)
    }

    async fn create_container(
        &self,
        id: &ContainerId,
    ) -> LxdliteResult<CreateLxdContainerResponse> {
        let (response, never, signal_status, suppress) = {
            let mut state = self.state.lock();
            state.create_container_calls += 1;
            (
                state.create_container_response.clone(),
                state.create_container_never_responds,
                state.created_signal_status,
                state.suppress_created_signal,
            )
        };
        if never {
            std::future::pending::<()>().await;
        }
        if response.status == CreateContainerStatus::Creating && !suppress {
            let _ = self
                .signals
                .send(Signal::ContainerCreated(ContainerCreatedSignal {
                    owner_id: OWNER.to_string(),
                    vm_name: id.vm_name.clone(),
                    container_name: id.container_name.clone(),
                    status: signal_status,
                    failure_reason: String::new(),
                }));
        }
        Ok(response)
    }

    async fn start_container(
        &self,
        id: &ContainerId,
    ) -> LxdliteResult<StartLxdContainerResponse> {
        let (response, never, os_release, suppress) = {
            let mut state = self.state.lock();
            state.start_container_calls += 1;
            (
                state.start_container_response.clone(),
                state.start_container_never_responds,
                state.started_signal_os_release.clone(),
                state.suppress_started_signal,
            )
        };
        if never {
            std::future::pending::<()>().await;
        }
        if response.status == StartContainerStatus::Starting && !suppress {
            let _ = self
                .signals
                .send(Signal::ContainerStarting(ContainerStartingSignal {
                    owner_id: OWNER.to_string(),
                    vm_name: id.vm_name.clone(),
                    container_name: id.container_name.clone(),
                    status: ContainerStartingStatus::Started,
                    os_release,
                    failure_reason: String::new(),
                }));
        }
        Ok(response)
    }

    async fn stop_container(&self, _id: &ContainerId) -> LxdliteResult<StopLxdContainerResponse> {
        Ok(StopLxdContainerResponse {
            success: true,
            failure_reason: String::new(),
        })
    }

    async fn delete_container(
        &self,
        _id: &ContainerId,
    ) -> LxdliteResult<DeleteLxdContainerResponse> {
        Ok(self.state.lock().delete_response.clone())
    }

    async fn setup_container_user(
        &self,
        _id: &ContainerId,
        username: &str,
    ) -> LxdliteResult<SetupContainerUserResponse> {
        let (response, never) = {
            let mut state = self.state.lock();
            state.setup_user_calls += 1;
            state.last_setup_username = Some(username.to_string());
            (
                state.setup_user_response.clone(),
                state.setup_user_never_responds,
            )
        };
        if never {
            std::future::pending::<()>().await;
        }
        Ok(response)
    }

    async fn export_container(
        &self,
        _id: &ContainerId,
        _export_path: &Path,
    ) -> LxdliteResult<ExportLxdContainerResponse> {
        let mut state = self.state.lock();
        state.export_calls += 1;
        Ok(state.export_response.clone())
    }

    async fn import_container(
        &self,
        _id: &ContainerId,
        _import_path: &Path,
    ) -> LxdliteResult<ImportLxdContainerResponse> {
        let mut state = self.state.lock();
        state.import_calls += 1;
        Ok(state.import_response.clone())
    }

    async fn install_linux_package(
        &self,
        _id: &ContainerId,
        _source: InstallSource,
    ) -> LxdliteResult<InstallLinuxPackageResponse> {
        Ok(self.state.lock().install_response.clone())
    }

    async fn uninstall_package_owning_file(
        &self,
        _id: &ContainerId,
        _file_path: &str,
    ) -> LxdliteResult<UninstallPackageOwningFileResponse> {
        Ok(self.state.lock().uninstall_response.clone())
    }

    async fn upgrade_container(
        &self,
        _id: &ContainerId,
        _target: ContainerVersion,
    ) -> LxdliteResult<UpgradeContainerResponse> {
        Ok(self.state.lock().upgrade_response.clone())
    }

    async fn cancel_upgrade_container(
        &self,
        _id: &ContainerId,
    ) -> LxdliteResult<CancelUpgradeContainerResponse> {
        Ok(self.state.lock().cancel_upgrade_response.clone())
    }

    async fn configure_for_sideload(
        &self,
        _vm_name: &str,
    ) -> LxdliteResult<ConfigureForSideloadResponse> {
        self.state.lock().sideload_calls += 1;
        Ok(ConfigureForSideloadResponse {
            status: SideloadStatus::Succeeded,
            failure_reason: String::new(),
        })
    }
}

// ============================================================================
// FAKE COLLABORATORS
// ============================================================================

#[derive(Default)]
pub struct FakeImageLoader {
    never_completes: Mutex<bool>,
    calls: Mutex<usize>,
}

impl FakeImageLoader {
    pub fn set_never_completes(&self, never: bool) {
        *self.never_completes.lock() = never;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait::async_trait]
impl ImageLoader for FakeImageLoader {
    async fn install(&self) -> LxdliteResult<()> {
        *self.calls.lock() += 1;
        if *self.never_completes.lock() {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub struct FakeAnsible {
    succeed: Mutex<bool>,
    calls: Mutex<usize>,
    last_playbook: Mutex<Option<PathBuf>>,
}

impl Default for FakeAnsible {
    fn default() -> Self {
        Self {
            succeed: Mutex::new(true),
            calls: Mutex::new(0),
            last_playbook: Mutex::new(None),
        }
    }
}

impl FakeAnsible {
    pub fn set_succeed(&self, succeed: bool) {
        *self.succeed.lock() = succeed;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    pub fn last_playbook(&self) -> Option<PathBuf> {
        self.last_playbook.lock().clone()
    }
}

#[async_trait::async_trait]
impl AnsibleConfigurator for FakeAnsible {
    async fn configure_container(&self, _id: &ContainerId, playbook: &Path) -> bool {
        *self.calls.lock() += 1;
        *self.last_playbook.lock() = Some(playbook.to_path_buf());
        *self.succeed.lock()
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    low_disk_events: Mutex<Vec<(String, u64)>>,
}

impl FakeNotifier {
    pub fn low_disk_events(&self) -> Vec<(String, u64)> {
        self.low_disk_events.lock().clone()
    }
}

impl VmNotifier for FakeNotifier {
    fn low_disk_space(&self, vm_name: &str, free_bytes: u64) {
        self.low_disk_events
            .lock()
            .push((vm_name.to_string(), free_bytes));
    }
}

// ============================================================================
// OBSERVERS
// ============================================================================

/// Records the stage notifications it receives.
#[derive(Default)]
pub struct RecordingObserver {
    stages: Mutex<Vec<RestartStage>>,
}

impl RecordingObserver {
    pub fn stages(&self) -> Vec<RestartStage> {
        self.stages.lock().clone()
    }
}

impl RestartObserver for RecordingObserver {
    fn on_stage_started(&self, stage: RestartStage) {
        self.stages.lock().push(stage);
    }
}

/// Point during a restart at which `CancelingObserver` cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    ComponentLoaded,
    DiskImageCreated,
    VmStarted,
    LxdStarted,
    ContainerCreated,
    ContainerSetup,
    ContainerStarted,
}

/// Observer that cancels its own restart from inside a stage callback.
pub struct CancelingObserver {
    manager: GuestManager,
    cancel_on: CancelPoint,
    pub restart_id: Mutex<Option<lxdlite::types::RestartId>>,
    stages: Mutex<Vec<RestartStage>>,
}

impl CancelingObserver {
    pub fn new(manager: GuestManager, cancel_on: CancelPoint) -> Self {
        Self {
            manager,
            cancel_on,
            restart_id: Mutex::new(None),
            stages: Mutex::new(Vec::new()),
        }
    }

    pub fn set_restart_id(&self, id: lxdlite::types::RestartId) {
        *self.restart_id.lock() = Some(id);
    }

    pub fn stages(&self) -> Vec<RestartStage> {
        self.stages.lock().clone()
    }

    fn maybe_cancel(&self, point: CancelPoint) {
        if point == self.cancel_on
            && let Some(id) = *self.restart_id.lock()
        {
            self.manager.cancel_restart(id);
        }
    }
}

impl RestartObserver for CancelingObserver {
    fn on_stage_started(&self, stage: RestartStage) {
        self.stages.lock().push(stage);
    }

    fn on_component_loaded(&self, _result: lxdlite::result::OpResult) {
        self.maybe_cancel(CancelPoint::ComponentLoaded);
    }

    fn on_disk_image_created(
        &self,
        _success: bool,
        _result: lxdlite::result::OpResult,
        _free_bytes: u64,
    ) {
        self.maybe_cancel(CancelPoint::DiskImageCreated);
    }

    fn on_vm_started(&self, _success: bool) {
        self.maybe_cancel(CancelPoint::VmStarted);
    }

    fn on_lxd_started(&self, _result: lxdlite::result::OpResult) {
        self.maybe_cancel(CancelPoint::LxdStarted);
    }

    fn on_container_created(&self, _result: lxdlite::result::OpResult) {
        self.maybe_cancel(CancelPoint::ContainerCreated);
    }

    fn on_container_setup(&self, _success: bool) {
        self.maybe_cancel(CancelPoint::ContainerSetup);
    }

    fn on_container_started(&self, _result: lxdlite::result::OpResult) {
        self.maybe_cancel(CancelPoint::ContainerStarted);
    }
}

// ============================================================================
// TEST CONTEXT
// ============================================================================

/// Isolated manager wired to fresh fakes, with the fake-to-manager signal
/// stream attached.
pub struct TestContext {
    pub manager: GuestManager,
    pub vm: Arc<FakeVmService>,
    pub containers: Arc<FakeContainerService>,
    pub loader: Arc<FakeImageLoader>,
    pub ansible: Arc<FakeAnsible>,
    pub notifier: Arc<FakeNotifier>,
    pub metrics: Arc<MetricsRecorder>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    pub fn default_config() -> ManagerConfig {
        ManagerConfig {
            owner_id: OWNER.to_string(),
            ..ManagerConfig::default()
        }
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let vm = Arc::new(FakeVmService::new(signal_tx.clone()));
        let containers = Arc::new(FakeContainerService::new(signal_tx));
        let loader = Arc::new(FakeImageLoader::default());
        let ansible = Arc::new(FakeAnsible::default());
        let notifier = Arc::new(FakeNotifier::default());
        let metrics = Arc::new(MetricsRecorder::new());

        let manager = GuestManager::builder(vm.clone(), containers.clone())
            .config(config)
            .image_loader(loader.clone())
            .ansible(ansible.clone())
            .notifier(notifier.clone())
            .metrics(metrics.clone())
            .build()
            .expect("failed to build manager");
        manager.attach_signal_stream(UnboundedReceiverStream::new(signal_rx));

        Self {
            manager,
            vm,
            containers,
            loader,
            ansible,
            notifier,
            metrics,
        }
    }

    pub fn vm_stopped_signal(&self) -> VmStoppedSignal {
        VmStoppedSignal {
            owner_id: OWNER.to_string(),
            vm_name: VM_NAME.to_string(),
        }
    }

    pub fn vm_started_signal(&self) -> VmStartedSignal {
        VmStartedSignal {
            owner_id: OWNER.to_string(),
            vm_name: VM_NAME.to_string(),
        }
    }

    pub fn downloading_signal(&self) -> ContainerDownloadingSignal {
        ContainerDownloadingSignal {
            owner_id: OWNER.to_string(),
            vm_name: VM_NAME.to_string(),
            container_name: CONTAINER_NAME.to_string(),
            download_progress: 50,
        }
    }

    pub fn container_starting_signal(
        &self,
        status: ContainerStartingStatus,
    ) -> ContainerStartingSignal {
        ContainerStartingSignal {
            owner_id: OWNER.to_string(),
            vm_name: VM_NAME.to_string(),
            container_name: CONTAINER_NAME.to_string(),
            status,
            os_release: None,
            failure_reason: String::new(),
        }
    }

    pub fn export_progress_signal(&self, status: ExportProgressStatus) -> ExportProgressSignal {
        ExportProgressSignal {
            owner_id: OWNER.to_string(),
            vm_name: VM_NAME.to_string(),
            container_name: CONTAINER_NAME.to_string(),
            status,
            input_bytes_streamed: 123,
            bytes_exported: 456,
        }
    }

    pub fn import_progress_signal(&self, status: ImportProgressStatus) -> ImportProgressSignal {
        ImportProgressSignal {
            owner_id: OWNER.to_string(),
            vm_name: VM_NAME.to_string(),
            container_name: CONTAINER_NAME.to_string(),
            status,
        }
    }
}
