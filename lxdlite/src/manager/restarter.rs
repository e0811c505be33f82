//! The per-container restart state machine.
//!
//! One restarter runs as one tokio task and owns every request targeting its
//! container. Stages run strictly in order; daemon signals, cancellation and
//! coalesced requests arrive over the task's event channel and are only acted
//! on at stage boundaries and signal-wait turns, so no stage transition races
//! another.

use super::registry::{AttachedRequest, RestarterEvent};
use super::Inner;
use crate::metrics::Corruption;
use crate::observer::RestartObserver;
use crate::options::RestartOptions;
use crate::result::OpResult;
use crate::rpc::messages::{
    ContainerCreatedStatus, ContainerStartingStatus, CreateContainerStatus,
    CreateDiskImageRequest, DiskImageStatus, LxdProgressStatus, MountResult, SetupUserStatus,
    StartContainerStatus, StartLxdStatus, StartVmRequest, VmStatus,
};
use crate::types::{ContainerId, OsRelease, RestartId, RestartStage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};

pub(crate) const INSTALL_IMAGE_LOADER_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub(crate) const CREATE_DISK_IMAGE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub(crate) const START_TERMINA_VM_TIMEOUT: Duration = Duration::from_secs(8 * 60);
pub(crate) const START_LXD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Heartbeat window: the deadline is this far from stage entry or from the
/// last downloading signal, whichever is later.
pub(crate) const CREATE_CONTAINER_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub(crate) const SETUP_CONTAINER_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Heartbeat window, extended by container-starting progress signals.
pub(crate) const START_CONTAINER_TIMEOUT: Duration = Duration::from_secs(8 * 60);

/// One request riding this restarter.
struct RequestSlot {
    id: RestartId,
    options: RestartOptions,
    observer: Option<Arc<dyn RestartObserver>>,
    /// Taken when the request completes; `None` means already resolved.
    completion: Option<oneshot::Sender<OpResult>>,
    first_stage: RestartStage,
    final_stage: RestartStage,
}

/// Signal content surfaced to the stage wait loops.
enum StageEvent {
    VmStopped,
    VmStarted,
    LxdProgress(LxdProgressStatus),
    ContainerCreated(ContainerCreatedStatus),
    ContainerStarting(ContainerStartingStatus, Option<OsRelease>),
    Downloading,
}

enum WaitResult {
    Event(StageEvent),
    Timeout,
    /// Aborted, every request resolved, or the VM went away.
    Halted,
}

enum StageOutcome {
    Advance,
    Fatal(OpResult),
    /// Nothing left to drive; stop without a terminal result.
    Idle,
}

pub(crate) struct Restarter {
    shared: Arc<Inner>,
    container_id: ContainerId,
    events: mpsc::UnboundedReceiver<RestarterEvent>,
    requests: Vec<RequestSlot>,
    /// Stage currently in progress, for late-attach catch-up.
    current: Option<RestartStage>,
    /// Furthest stage completed.
    completed: Option<RestartStage>,
    /// Disk path reported by the CreateDiskImage stage.
    disk_path: PathBuf,
    aborted: bool,
    /// Set when the VM stops after this restarter started it.
    vm_stopped: bool,
}

impl Restarter {
    pub(crate) fn new(
        shared: Arc<Inner>,
        container_id: ContainerId,
        events: mpsc::UnboundedReceiver<RestarterEvent>,
        initial: AttachedRequest,
    ) -> Self {
        let mut restarter = Self {
            shared,
            container_id,
            events,
            requests: Vec::new(),
            current: None,
            completed: None,
            disk_path: PathBuf::new(),
            aborted: false,
            vm_stopped: false,
        };
        restarter.push_request(initial);
        restarter
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(container = %self.container_id, "Restarter running");

        if !self.shared.config.lxd_allowed {
            self.finish_all(OpResult::NotAllowed);
            self.unregister_and_redispatch();
            return;
        }

        let mut stage = Some(RestartStage::Start);
        let mut failure: Option<OpResult> = None;

        while let Some(current) = stage {
            self.drain_events();
            if self.aborted {
                failure = Some(OpResult::RestartAborted);
                break;
            }
            if self.vm_stopped {
                failure = Some(OpResult::RestartFailedVmStopped);
                break;
            }
            if !self.has_active() {
                break;
            }
            if current > self.target_stage() {
                break;
            }

            self.current = Some(current);
            self.emit_stage_started(current);

            let entered = Instant::now();
            let outcome = self.run_stage(current).await;
            self.shared.metrics.stage_duration(current, entered.elapsed());

            self.drain_events();
            if self.aborted {
                failure = Some(OpResult::RestartAborted);
                break;
            }

            match outcome {
                StageOutcome::Advance => {
                    self.completed = Some(current);
                    self.current = None;
                    self.complete_requests_through(current);
                    stage = current.next();
                }
                StageOutcome::Fatal(result) => {
                    failure = Some(result);
                    break;
                }
                StageOutcome::Idle => break,
            }
        }

        let result = match failure {
            Some(result) => result,
            None if self.aborted => OpResult::RestartAborted,
            // Anything still active at this point wanted no further stages.
            None => OpResult::Success,
        };
        if !result.is_success() {
            tracing::info!(container = %self.container_id, %result, "Restart failed");
        }
        self.finish_all(result);

        let container_id = self.container_id.clone();
        self.unregister_and_redispatch();
        tracing::debug!(container = %container_id, "Restarter finished");
    }

    // ========================================================================
    // Stage dispatch
    // ========================================================================

    async fn run_stage(&mut self, stage: RestartStage) -> StageOutcome {
        match stage {
            RestartStage::Start => StageOutcome::Advance,
            RestartStage::InstallImageLoader => self.stage_install_image_loader().await,
            RestartStage::CreateDiskImage => self.stage_create_disk_image().await,
            RestartStage::StartTerminaVm => self.stage_start_vm().await,
            RestartStage::StartLxd => self.stage_start_lxd().await,
            RestartStage::CreateContainer => self.stage_create_container().await,
            RestartStage::SetupContainer => self.stage_setup_container().await,
            RestartStage::StartContainer => self.stage_start_container().await,
        }
    }

    async fn stage_install_image_loader(&mut self) -> StageOutcome {
        if self.shared.state.lock().image_loader_ready {
            self.emit_component_loaded(OpResult::Success);
            return StageOutcome::Advance;
        }

        let deadline = Instant::now() + INSTALL_IMAGE_LOADER_TIMEOUT;
        let loader = self.shared.image_loader.clone();
        match timeout_at(deadline, loader.install()).await {
            Err(_) => StageOutcome::Fatal(OpResult::InstallImageLoaderTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Image loader install failed");
                self.emit_component_loaded(OpResult::InstallImageLoaderFailed);
                StageOutcome::Fatal(OpResult::InstallImageLoaderFailed)
            }
            Ok(Ok(())) => {
                self.shared.state.lock().image_loader_ready = true;
                self.emit_component_loaded(OpResult::Success);
                StageOutcome::Advance
            }
        }
    }

    async fn stage_create_disk_image(&mut self) -> StageOutcome {
        if self.container_id.vm_name.is_empty() {
            return StageOutcome::Fatal(OpResult::ClientError);
        }

        let request = CreateDiskImageRequest {
            vm_name: self.container_id.vm_name.clone(),
            disk_size_bytes: self.requested_disk_size(),
        };

        let deadline = Instant::now() + CREATE_DISK_IMAGE_TIMEOUT;
        let service = self.shared.vm_service.clone();
        match timeout_at(deadline, service.create_disk_image(request)).await {
            Err(_) => StageOutcome::Fatal(OpResult::CreateDiskImageTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "CreateDiskImage RPC failed");
                self.emit_disk_image_created(false, OpResult::CreateDiskImageFailed, 0);
                StageOutcome::Fatal(OpResult::CreateDiskImageFailed)
            }
            Ok(Ok(response)) => match response.status {
                DiskImageStatus::Created | DiskImageStatus::Exists => {
                    self.disk_path = response.disk_path;
                    self.emit_disk_image_created(true, OpResult::Success, 0);
                    StageOutcome::Advance
                }
                DiskImageStatus::Failed => {
                    tracing::warn!(
                        reason = %response.failure_reason,
                        "Disk image service reported failure"
                    );
                    self.emit_disk_image_created(false, OpResult::CreateDiskImageFailed, 0);
                    StageOutcome::Fatal(OpResult::CreateDiskImageFailed)
                }
            },
        }
    }

    async fn stage_start_vm(&mut self) -> StageOutcome {
        let deadline = Instant::now() + START_TERMINA_VM_TIMEOUT;
        let vm_name = self.container_id.vm_name.clone();

        // A concurrent stop for this VM must drain before we start it again.
        if self.shared.state.lock().stopping_vms.contains(&vm_name) {
            tracing::debug!(%vm_name, "VM is stopping, deferring start");
            loop {
                match self.wait_for_event(deadline).await {
                    WaitResult::Event(StageEvent::VmStopped) => break,
                    WaitResult::Event(_) => continue,
                    WaitResult::Timeout => {
                        return StageOutcome::Fatal(OpResult::StartTerminaVmTimedOut);
                    }
                    WaitResult::Halted => return self.interrupted_outcome(),
                }
            }
        }

        let request = StartVmRequest {
            vm_name: vm_name.clone(),
            disk_path: self.disk_path.clone(),
        };
        let service = self.shared.vm_service.clone();
        let response = match timeout_at(deadline, service.start_vm(request)).await {
            Err(_) => return StageOutcome::Fatal(OpResult::StartTerminaVmTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "StartVm RPC failed");
                self.emit_vm_started(false);
                return StageOutcome::Fatal(OpResult::VmStartFailed);
            }
            Ok(Ok(response)) => response,
        };

        match response.mount_result {
            MountResult::Failure => {
                self.shared.metrics.corruption(Corruption::MountFailed);
                self.emit_vm_started(false);
                return StageOutcome::Fatal(OpResult::VmStartFailed);
            }
            MountResult::PartialDataLoss => {
                self.shared.metrics.corruption(Corruption::MountRolledBack);
            }
            MountResult::Success => {}
        }

        if let Some(free_bytes) = response.free_bytes
            && free_bytes < self.shared.config.low_disk_threshold_bytes
        {
            self.shared.notifier.low_disk_space(&vm_name, free_bytes);
        }

        match response.status {
            VmStatus::Running => {
                self.shared.state.lock().running_vms.insert(vm_name);
            }
            VmStatus::Starting => loop {
                match self.wait_for_event(deadline).await {
                    WaitResult::Event(StageEvent::VmStarted) => break,
                    WaitResult::Event(_) => continue,
                    WaitResult::Timeout => {
                        return StageOutcome::Fatal(OpResult::StartTerminaVmTimedOut);
                    }
                    WaitResult::Halted => return self.interrupted_outcome(),
                }
            },
            VmStatus::Failure | VmStatus::Unknown => {
                tracing::warn!(reason = %response.failure_reason, "VM failed to start");
                self.emit_vm_started(false);
                return StageOutcome::Fatal(OpResult::VmStartFailed);
            }
        }

        self.emit_vm_started(true);
        StageOutcome::Advance
    }

    async fn stage_start_lxd(&mut self) -> StageOutcome {
        let deadline = Instant::now() + START_LXD_TIMEOUT;
        let service = self.shared.container_service.clone();
        let response = match timeout_at(deadline, service.start_lxd(&self.container_id.vm_name))
            .await
        {
            Err(_) => return StageOutcome::Fatal(OpResult::StartLxdTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "StartLxd RPC failed");
                self.emit_lxd_started(OpResult::StartLxdFailed);
                return StageOutcome::Fatal(OpResult::StartLxdFailed);
            }
            Ok(Ok(response)) => response,
        };

        match response.status {
            StartLxdStatus::AlreadyRunning => {}
            StartLxdStatus::Failed => {
                self.emit_lxd_started(OpResult::StartLxdFailed);
                return StageOutcome::Fatal(OpResult::StartLxdFailed);
            }
            StartLxdStatus::Starting => loop {
                match self.wait_for_event(deadline).await {
                    WaitResult::Event(StageEvent::LxdProgress(LxdProgressStatus::Started)) => break,
                    WaitResult::Event(StageEvent::LxdProgress(LxdProgressStatus::Failed)) => {
                        self.emit_lxd_started(OpResult::StartLxdFailed);
                        return StageOutcome::Fatal(OpResult::StartLxdFailed);
                    }
                    WaitResult::Event(_) => continue,
                    WaitResult::Timeout => return StageOutcome::Fatal(OpResult::StartLxdTimedOut),
                    WaitResult::Halted => return self.interrupted_outcome(),
                }
            },
        }

        self.emit_lxd_started(OpResult::Success);
        StageOutcome::Advance
    }

    async fn stage_create_container(&mut self) -> StageOutcome {
        let mut deadline = Instant::now() + CREATE_CONTAINER_TIMEOUT;
        let service = self.shared.container_service.clone();
        let response = match timeout_at(deadline, service.create_container(&self.container_id))
            .await
        {
            Err(_) => return StageOutcome::Fatal(OpResult::CreateContainerTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "CreateContainer RPC failed");
                return StageOutcome::Fatal(OpResult::CreateContainerFailed);
            }
            Ok(Ok(response)) => response,
        };

        match response.status {
            CreateContainerStatus::Exists => {
                self.register_container();
                self.emit_container_created(OpResult::Success);
                StageOutcome::Advance
            }
            CreateContainerStatus::Failed => {
                tracing::warn!(reason = %response.failure_reason, "Container create failed");
                StageOutcome::Fatal(OpResult::CreateContainerFailed)
            }
            CreateContainerStatus::Creating => loop {
                match self.wait_for_event(deadline).await {
                    WaitResult::Event(StageEvent::Downloading) => {
                        // Heartbeat: a fixed window from the last progress
                        // signal, never shortened.
                        deadline = Instant::now() + CREATE_CONTAINER_TIMEOUT;
                    }
                    WaitResult::Event(StageEvent::ContainerCreated(status)) => {
                        return match status {
                            ContainerCreatedStatus::Created => {
                                self.register_container();
                                self.emit_container_created(OpResult::Success);
                                StageOutcome::Advance
                            }
                            ContainerCreatedStatus::Unknown => {
                                StageOutcome::Fatal(OpResult::UnknownError)
                            }
                            ContainerCreatedStatus::DownloadTimedOut
                            | ContainerCreatedStatus::Cancelled
                            | ContainerCreatedStatus::Failed => {
                                StageOutcome::Fatal(OpResult::CreateContainerFailed)
                            }
                        };
                    }
                    WaitResult::Event(_) => continue,
                    WaitResult::Timeout => {
                        return StageOutcome::Fatal(OpResult::CreateContainerTimedOut);
                    }
                    WaitResult::Halted => return self.interrupted_outcome(),
                }
            },
        }
    }

    async fn stage_setup_container(&mut self) -> StageOutcome {
        let deadline = Instant::now() + SETUP_CONTAINER_TIMEOUT;
        let username = self
            .requests
            .iter()
            .filter(|slot| slot.completion.is_some())
            .find_map(|slot| slot.options.container_username.clone())
            .unwrap_or_else(|| self.shared.config.default_container_username.clone());

        let service = self.shared.container_service.clone();
        let response = match timeout_at(
            deadline,
            service.setup_container_user(&self.container_id, &username),
        )
        .await
        {
            Err(_) => return StageOutcome::Fatal(OpResult::SetupContainerTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "SetupContainerUser RPC failed");
                self.emit_container_setup(false);
                return StageOutcome::Fatal(OpResult::SetupContainerFailed);
            }
            Ok(Ok(response)) => response,
        };

        match response.status {
            SetupUserStatus::Success | SetupUserStatus::AlreadyExists => {}
            SetupUserStatus::Failed => {
                tracing::warn!(reason = %response.failure_reason, "Container user setup failed");
                self.emit_container_setup(false);
                return StageOutcome::Fatal(OpResult::SetupContainerFailed);
            }
        }

        let playbook = self
            .requests
            .iter()
            .filter(|slot| slot.completion.is_some())
            .find_map(|slot| slot.options.ansible_playbook.clone());
        if let Some(playbook) = playbook {
            let ansible = self.shared.ansible.clone();
            let container_id = self.container_id.clone();
            match timeout_at(
                deadline,
                ansible.configure_container(&container_id, &playbook),
            )
            .await
            {
                Err(_) => return StageOutcome::Fatal(OpResult::SetupContainerTimedOut),
                Ok(false) => {
                    self.emit_container_setup(false);
                    return StageOutcome::Fatal(OpResult::ContainerConfigurationFailed);
                }
                Ok(true) => {}
            }
        }

        self.emit_container_setup(true);
        StageOutcome::Advance
    }

    async fn stage_start_container(&mut self) -> StageOutcome {
        let mut deadline = Instant::now() + START_CONTAINER_TIMEOUT;
        let service = self.shared.container_service.clone();
        let response = match timeout_at(deadline, service.start_container(&self.container_id))
            .await
        {
            Err(_) => return StageOutcome::Fatal(OpResult::StartContainerTimedOut),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "StartContainer RPC failed");
                return StageOutcome::Fatal(OpResult::StartContainerFailed);
            }
            Ok(Ok(response)) => response,
        };

        match response.status {
            StartContainerStatus::Started => {
                self.persist_os_release(response.os_release.as_ref());
            }
            StartContainerStatus::Failed => {
                tracing::warn!(reason = %response.failure_reason, "Container start failed");
                return StageOutcome::Fatal(OpResult::StartContainerFailed);
            }
            StartContainerStatus::Starting => loop {
                match self.wait_for_event(deadline).await {
                    WaitResult::Event(StageEvent::ContainerStarting(status, os_release)) => {
                        match status {
                            ContainerStartingStatus::Starting => {
                                deadline = Instant::now() + START_CONTAINER_TIMEOUT;
                            }
                            ContainerStartingStatus::Started => {
                                self.persist_os_release(os_release.as_ref());
                                break;
                            }
                            ContainerStartingStatus::Cancelled
                            | ContainerStartingStatus::Failed => {
                                return StageOutcome::Fatal(OpResult::StartContainerFailed);
                            }
                        }
                    }
                    WaitResult::Event(_) => continue,
                    WaitResult::Timeout => {
                        return StageOutcome::Fatal(OpResult::StartContainerTimedOut);
                    }
                    WaitResult::Halted => return self.interrupted_outcome(),
                }
            },
        }

        self.emit_container_started(OpResult::Success);
        self.post_start_tasks().await;
        StageOutcome::Advance
    }

    /// Best-effort work after the container is up. Never fails the restart.
    async fn post_start_tasks(&self) {
        let vm_name = &self.container_id.vm_name;

        if self.shared.config.usage_reporting_enabled {
            match self
                .shared
                .vm_service
                .get_vm_enterprise_reporting_info(vm_name)
                .await
            {
                Ok(info) if info.success => {
                    if let Err(err) = self
                        .shared
                        .store
                        .set_kernel_version(Some(&info.vm_kernel_version))
                    {
                        tracing::warn!(error = %err, "Failed to persist kernel version");
                    }
                }
                Ok(info) => {
                    tracing::warn!(
                        reason = %info.failure_reason,
                        "Enterprise reporting info unavailable"
                    );
                    let _ = self.shared.store.set_kernel_version(None);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Enterprise reporting query failed");
                    let _ = self.shared.store.set_kernel_version(None);
                }
            }
        }

        if self.shared.config.sideload_enabled {
            match self
                .shared
                .container_service
                .configure_for_sideload(vm_name)
                .await
            {
                Ok(response) => {
                    tracing::debug!(status = ?response.status, "Sideload configuration finished")
                }
                Err(err) => tracing::warn!(error = %err, "Sideload configuration failed"),
            }
        }
    }

    // ========================================================================
    // Event handling
    // ========================================================================

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.note_event(event);
        }
    }

    async fn wait_for_event(&mut self, deadline: Instant) -> WaitResult {
        loop {
            if self.halted() {
                return WaitResult::Halted;
            }
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Some(stage_event) = self.note_event(event) {
                            return WaitResult::Event(stage_event);
                        }
                    }
                    // Manager dropped; treat as shutdown.
                    None => return WaitResult::Halted,
                },
                _ = tokio::time::sleep_until(deadline) => return WaitResult::Timeout,
            }
        }
    }

    fn note_event(&mut self, event: RestarterEvent) -> Option<StageEvent> {
        match event {
            RestarterEvent::Attach(request) => {
                self.push_request(request);
                None
            }
            RestarterEvent::Cancel(id) => {
                self.cancel_request(id);
                None
            }
            RestarterEvent::Abort => {
                self.aborted = true;
                None
            }
            RestarterEvent::VmStopped => {
                // Only fatal once this restarter has brought the VM up; a
                // stop draining before our start is a normal hand-off.
                if self.completed >= Some(RestartStage::StartTerminaVm) {
                    self.vm_stopped = true;
                }
                Some(StageEvent::VmStopped)
            }
            RestarterEvent::VmStarted => Some(StageEvent::VmStarted),
            RestarterEvent::LxdProgress(status) => Some(StageEvent::LxdProgress(status)),
            RestarterEvent::ContainerCreated(status) => {
                Some(StageEvent::ContainerCreated(status))
            }
            RestarterEvent::ContainerStarting(status, os_release) => {
                Some(StageEvent::ContainerStarting(status, os_release))
            }
            RestarterEvent::ContainerDownloading => Some(StageEvent::Downloading),
        }
    }

    fn push_request(&mut self, request: AttachedRequest) {
        let final_stage = request.options.final_stage();
        let slot = RequestSlot {
            id: request.id,
            options: request.options,
            observer: request.observer,
            completion: Some(request.completion),
            first_stage: request.first_stage,
            final_stage,
        };

        if self.aborted {
            self.resolve(slot, OpResult::RestartAborted);
            return;
        }

        // Everything this request wanted already happened.
        if self.completed >= Some(final_stage) {
            self.resolve(slot, OpResult::Success);
            return;
        }

        // Catch the late observer up to the stage in progress.
        if let Some(current) = self.current
            && current >= slot.first_stage
            && current <= slot.final_stage
            && let Some(observer) = &slot.observer
        {
            observer.on_stage_started(current);
        }

        self.requests.push(slot);
    }

    fn cancel_request(&mut self, id: RestartId) {
        let Some(index) = self
            .requests
            .iter()
            .position(|slot| slot.id == id && slot.completion.is_some())
        else {
            return;
        };
        let mut slot = self.requests.remove(index);
        self.complete_slot(&mut slot, OpResult::RestartRequestCancelled);
    }

    // ========================================================================
    // Completion
    // ========================================================================

    fn resolve(&self, mut slot: RequestSlot, result: OpResult) {
        self.complete_slot(&mut slot, result);
    }

    fn complete_slot(&self, slot: &mut RequestSlot, result: OpResult) {
        let Some(sender) = slot.completion.take() else {
            return;
        };
        self.shared.state.lock().pending.remove(&slot.id);
        self.shared
            .metrics
            .restart_result(slot.options.restart_source, result);
        let _ = sender.send(result);
        tracing::debug!(
            restart_id = %slot.id,
            container = %self.container_id,
            %result,
            "Restart request completed"
        );
    }

    fn complete_requests_through(&mut self, stage: RestartStage) {
        let mut index = 0;
        while index < self.requests.len() {
            if self.requests[index].completion.is_some()
                && self.requests[index].final_stage <= stage
            {
                let mut slot = self.requests.remove(index);
                self.complete_slot(&mut slot, OpResult::Success);
            } else {
                index += 1;
            }
        }
    }

    fn finish_all(&mut self, result: OpResult) {
        let mut slots = std::mem::take(&mut self.requests);
        for slot in &mut slots {
            self.complete_slot(slot, result);
        }
    }

    /// Drop the registry entry and hand any requests that raced our exit to a
    /// fresh restarter.
    fn unregister_and_redispatch(mut self) {
        let mut late_attaches = Vec::new();
        {
            let mut state = self.shared.state.lock();
            state.flows.remove(&self.container_id);
            while let Ok(event) = self.events.try_recv() {
                if let RestarterEvent::Attach(request) = event {
                    late_attaches.push(request);
                }
            }
        }
        for request in late_attaches {
            Inner::reattach(&self.shared, self.container_id.clone(), request);
        }
    }

    // ========================================================================
    // Bookkeeping helpers
    // ========================================================================

    fn has_active(&self) -> bool {
        self.requests.iter().any(|slot| slot.completion.is_some())
    }

    fn halted(&self) -> bool {
        self.aborted || self.vm_stopped || !self.has_active()
    }

    fn interrupted_outcome(&self) -> StageOutcome {
        if self.vm_stopped && !self.aborted && self.has_active() {
            StageOutcome::Fatal(OpResult::RestartFailedVmStopped)
        } else {
            StageOutcome::Idle
        }
    }

    fn target_stage(&self) -> RestartStage {
        self.requests
            .iter()
            .filter(|slot| slot.completion.is_some())
            .map(|slot| slot.final_stage)
            .max()
            .unwrap_or(RestartStage::Start)
    }

    fn requested_disk_size(&self) -> Option<i64> {
        self.requests
            .iter()
            .filter(|slot| slot.completion.is_some())
            .find_map(|slot| slot.options.disk_size_bytes)
    }

    fn register_container(&self) {
        if let Err(err) = self.shared.store.register(&self.container_id) {
            tracing::warn!(error = %err, container = %self.container_id, "Register failed");
        }
    }

    fn persist_os_release(&self, os_release: Option<&OsRelease>) {
        if let Some(os_release) = os_release
            && let Err(err) = self.shared.store.set_os_release(&self.container_id, os_release)
        {
            tracing::warn!(error = %err, container = %self.container_id, "OS release store failed");
        }
    }

    // ========================================================================
    // Observer notification
    // ========================================================================

    fn for_participants(&self, stage: RestartStage, notify: impl Fn(&dyn RestartObserver)) {
        for slot in &self.requests {
            if slot.completion.is_some()
                && slot.first_stage <= stage
                && stage <= slot.final_stage
                && let Some(observer) = &slot.observer
            {
                notify(observer.as_ref());
            }
        }
    }

    fn emit_stage_started(&self, stage: RestartStage) {
        tracing::debug!(container = %self.container_id, %stage, "Stage started");
        self.for_participants(stage, |observer| observer.on_stage_started(stage));
    }

    fn emit_component_loaded(&self, result: OpResult) {
        self.for_participants(RestartStage::InstallImageLoader, |observer| {
            observer.on_component_loaded(result)
        });
    }

    fn emit_disk_image_created(&self, success: bool, result: OpResult, free_bytes: u64) {
        self.for_participants(RestartStage::CreateDiskImage, |observer| {
            observer.on_disk_image_created(success, result, free_bytes)
        });
    }

    fn emit_vm_started(&self, success: bool) {
        self.for_participants(RestartStage::StartTerminaVm, |observer| {
            observer.on_vm_started(success)
        });
    }

    fn emit_lxd_started(&self, result: OpResult) {
        self.for_participants(RestartStage::StartLxd, |observer| {
            observer.on_lxd_started(result)
        });
    }

    fn emit_container_created(&self, result: OpResult) {
        self.for_participants(RestartStage::CreateContainer, |observer| {
            observer.on_container_created(result)
        });
    }

    fn emit_container_setup(&self, success: bool) {
        self.for_participants(RestartStage::SetupContainer, |observer| {
            observer.on_container_setup(success)
        });
    }

    fn emit_container_started(&self, result: OpResult) {
        self.for_participants(RestartStage::StartContainer, |observer| {
            observer.on_container_started(result)
        });
    }
}
