//! Process-wide registry of in-flight work.
//!
//! All fields live behind the manager's single coordination lock; the lock
//! is never held across an await point. Restarter tasks receive work through
//! unbounded channels so routing under the lock never blocks.

use crate::manager::ExportOutcome;
use crate::observer::RestartObserver;
use crate::options::RestartOptions;
use crate::result::OpResult;
use crate::rpc::messages::{ContainerCreatedStatus, ContainerStartingStatus, LxdProgressStatus};
use crate::types::{ContainerId, OsRelease, RestartId, RestartStage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// One restart request as handed to a restarter task.
pub(crate) struct AttachedRequest {
    pub id: RestartId,
    pub options: RestartOptions,
    pub observer: Option<Arc<dyn RestartObserver>>,
    pub completion: oneshot::Sender<OpResult>,
    /// First stage this request's observer participates in. `Start` for the
    /// request that created the restarter, `CreateDiskImage` for requests
    /// coalesced onto one already in flight.
    pub first_stage: RestartStage,
}

/// Events delivered to a restarter task.
pub(crate) enum RestarterEvent {
    Attach(AttachedRequest),
    Cancel(RestartId),
    /// Uninstall or shutdown: finish every request with `RestartAborted`.
    Abort,
    /// The restarter's VM stopped (routed by vm name).
    VmStopped,
    /// The restarter's VM confirmed readiness.
    VmStarted,
    LxdProgress(LxdProgressStatus),
    ContainerCreated(ContainerCreatedStatus),
    ContainerStarting(ContainerStartingStatus, Option<OsRelease>),
    /// Rootfs download heartbeat for the CreateContainer stage.
    ContainerDownloading,
}

/// Channel handle to a live restarter task.
pub(crate) struct RestarterHandle {
    pub events: mpsc::UnboundedSender<RestarterEvent>,
}

/// An export waiting for daemon progress signals.
pub(crate) struct ExportSlot {
    pub completion: oneshot::Sender<ExportOutcome>,
}

/// An import waiting for daemon progress signals.
pub(crate) struct ImportSlot {
    pub completion: oneshot::Sender<OpResult>,
}

/// A restart absorbed by an in-flight uninstall, dispatched after teardown.
pub(crate) struct QueuedRestart {
    pub container_id: ContainerId,
    pub options: RestartOptions,
    pub observer: Option<Arc<dyn RestartObserver>>,
    pub completion: oneshot::Sender<OpResult>,
}

/// Teardown in progress for one VM.
#[derive(Default)]
pub(crate) struct RemovalSlot {
    pub queued: Vec<QueuedRestart>,
}

/// Key for signal waiters: (vm_name, container_name).
pub(crate) type ContainerKey = (String, String);

/// All mutable manager state.
#[derive(Default)]
pub(crate) struct Registry {
    /// At most one live restarter per container identity.
    pub flows: HashMap<ContainerId, RestarterHandle>,
    /// Restart ids whose completion has not fired yet.
    pub pending: HashMap<RestartId, ContainerId>,
    /// VMs confirmed ready by the monitor service.
    pub running_vms: std::collections::HashSet<String>,
    /// VMs with a stop in flight; a restart's VM-start stage defers on this.
    pub stopping_vms: std::collections::HashSet<String>,
    pub exports: HashMap<ContainerId, ExportSlot>,
    pub imports: HashMap<ContainerId, ImportSlot>,
    pub removals: HashMap<String, RemovalSlot>,
    /// One-shot waiters for container-created signals (manager-level ops).
    pub created_waiters: HashMap<ContainerKey, Vec<oneshot::Sender<ContainerCreatedStatus>>>,
    /// One-shot waiters for terminal container-starting signals.
    pub started_waiters: HashMap<ContainerKey, Vec<oneshot::Sender<ContainerStartingStatus>>>,
    /// Set after the image loader component installs once per process.
    pub image_loader_ready: bool,
}

impl Registry {
    /// Send an event to every restarter whose container lives on `vm_name`.
    pub fn route_to_vm(&self, vm_name: &str, make_event: impl Fn() -> RestarterEvent) {
        for (container, handle) in &self.flows {
            if container.is_on_vm(vm_name) {
                let _ = handle.events.send(make_event());
            }
        }
    }

    /// Send an event to the restarter registered for (vm, container), if any.
    pub fn route_to_container(&self, vm_name: &str, container_name: &str, event: RestarterEvent) {
        for (container, handle) in &self.flows {
            if container.matches(vm_name, container_name) {
                let _ = handle.events.send(event);
                return;
            }
        }
    }

    /// Resolve created-signal waiters for a container.
    pub fn resolve_created_waiters(
        &mut self,
        vm_name: &str,
        container_name: &str,
        status: ContainerCreatedStatus,
    ) {
        if let Some(waiters) = self
            .created_waiters
            .remove(&(vm_name.to_string(), container_name.to_string()))
        {
            for waiter in waiters {
                let _ = waiter.send(status);
            }
        }
    }

    /// Resolve started-signal waiters for a container.
    pub fn resolve_started_waiters(
        &mut self,
        vm_name: &str,
        container_name: &str,
        status: ContainerStartingStatus,
    ) {
        if let Some(waiters) = self
            .started_waiters
            .remove(&(vm_name.to_string(), container_name.to_string()))
        {
            for waiter in waiters {
                let _ = waiter.send(status);
            }
        }
    }
}
