//! Tokio driver binding a [`Workspace`] to real backends.
//!
//! Host requests become spawned tasks; each task reports back through one
//! unbounded queue, which [`WorkspaceRuntime::step`] drains one event at a
//! time. The workspace therefore has a single writer even though backend I/O
//! runs concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use workspace_protocol::{
    ChannelMessage, CommandSpec, FileTree, ProcessHandle, ProcessId, ProjectStore,
    RealtimeChannel, SandboxRuntime, SpawnedProcess, UserId,
};

use crate::error::WorkspaceError;
use crate::runtime::events::{SandboxEvent, UserCommand, WorkspaceEvent};
use crate::runtime::gateway::JoinEpoch;
use crate::runtime::host::{GatewayHost, SandboxHost, StoreHost, WorkspaceHost};
use crate::runtime::sandbox::{ProcessRole, RunId};
use crate::runtime::workspace::{Lifecycle, Workspace};

/// The three services a workspace consumes.
#[derive(Clone)]
pub struct Backends {
    pub channel: Arc<dyn RealtimeChannel>,
    pub sandbox: Arc<dyn SandboxRuntime>,
    pub store: Arc<dyn ProjectStore>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Cloneable sender for user input from outside the driver loop.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    events: mpsc::UnboundedSender<WorkspaceEvent>,
}

impl WorkspaceHandle {
    /// Queues `command`. Returns false once the driver is gone.
    pub fn dispatch(&self, command: UserCommand) -> bool {
        self.events.send(WorkspaceEvent::User(command)).is_ok()
    }
}

type ProcessTable = Arc<Mutex<HashMap<ProcessId, Arc<dyn ProcessHandle>>>>;

struct DriverHost {
    backends: Backends,
    events: mpsc::UnboundedSender<WorkspaceEvent>,
    processes: ProcessTable,
    subscription: Option<JoinHandle<()>>,
    ready_listener: Option<JoinHandle<()>>,
    render_requested: bool,
}

impl DriverHost {
    fn send(&self, event: impl Into<WorkspaceEvent>) {
        let _ = self.events.send(event.into());
    }

    fn spawn_reporting<F>(&self, task: F)
    where
        F: std::future::Future<Output = WorkspaceEvent> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = task.await;
            let _ = events.send(event);
        });
    }

    fn listen_for_server_ready(&mut self) {
        if self.ready_listener.is_some() {
            return;
        }

        let mut ready = self.backends.sandbox.server_ready();
        let events = self.events.clone();
        self.ready_listener = Some(tokio::spawn(async move {
            while let Some(signal) = ready.next().await {
                if events.send(SandboxEvent::ServerReady(signal).into()).is_err() {
                    return;
                }
            }
        }));
    }

    fn stop_tasks(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
        if let Some(task) = self.ready_listener.take() {
            task.abort();
        }
    }
}

impl GatewayHost for DriverHost {
    fn join_channel(&mut self, project_id: &str, epoch: JoinEpoch, delay: Duration) {
        let channel = Arc::clone(&self.backends.channel);
        let events = self.events.clone();
        let project_id = project_id.to_string();

        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let subscription = match channel.join(&project_id).await {
                Ok(subscription) => subscription,
                Err(error) => {
                    let _ = events.send(WorkspaceEvent::ChannelJoinFailed { epoch, error });
                    return;
                }
            };

            if events.send(WorkspaceEvent::ChannelJoined { epoch }).is_err() {
                return;
            }

            let mut inbound = subscription.into_stream();
            while let Some(event) = inbound.next().await {
                if events
                    .send(WorkspaceEvent::ChannelDelivered { epoch, event })
                    .is_err()
                {
                    return;
                }
            }

            let _ = events.send(WorkspaceEvent::ChannelDropped {
                epoch,
                reason: "subscription stream ended".to_string(),
            });
        });

        if let Some(previous) = self.subscription.replace(task) {
            previous.abort();
        }
    }

    fn leave_channel(&mut self, project_id: &str) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
        self.backends.channel.leave(project_id);
    }

    fn publish(&mut self, project_id: &str, topic: &str, message: ChannelMessage) {
        let sent = self.backends.channel.publish(project_id, topic, message);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(error) = sent.await {
                let _ = events.send(WorkspaceEvent::PublishFailed { error });
            }
        });
    }
}

impl StoreHost for DriverHost {
    fn load_project(&mut self, project_id: &str) {
        let loaded = self.backends.store.get_project(project_id);
        self.spawn_reporting(async move {
            match loaded.await {
                Ok(record) => WorkspaceEvent::ProjectLoaded(record),
                Err(error) => WorkspaceEvent::ProjectLoadFailed(error),
            }
        });
    }

    fn load_users(&mut self) {
        let loaded = self.backends.store.list_users();
        self.spawn_reporting(async move {
            match loaded.await {
                Ok(users) => WorkspaceEvent::UsersLoaded(users),
                Err(error) => WorkspaceEvent::UsersLoadFailed(error),
            }
        });
    }

    fn persist_file_tree(&mut self, project_id: &str, generation: u64, tree: FileTree) {
        let persisted = self.backends.store.update_file_tree(project_id, tree);
        self.spawn_reporting(async move {
            match persisted.await {
                Ok(()) => WorkspaceEvent::FileTreePersisted { generation },
                Err(error) => WorkspaceEvent::FileTreePersistFailed { generation, error },
            }
        });
    }

    fn add_users(&mut self, project_id: &str, users: Vec<UserId>) {
        let added = self.backends.store.add_users(project_id, users);
        self.spawn_reporting(async move {
            match added.await {
                Ok(()) => WorkspaceEvent::CollaboratorsAdded,
                Err(error) => WorkspaceEvent::CollaboratorsAddFailed(error),
            }
        });
    }
}

impl SandboxHost for DriverHost {
    fn mount(&mut self, run_id: RunId, tree: FileTree) {
        let mounted = self.backends.sandbox.mount(tree);
        self.spawn_reporting(async move {
            match mounted.await {
                Ok(()) => WorkspaceEvent::Sandbox(SandboxEvent::Mounted { run_id }),
                Err(error) => WorkspaceEvent::Sandbox(SandboxEvent::MountFailed { run_id, error }),
            }
        });
    }

    fn spawn(&mut self, run_id: RunId, role: ProcessRole, command: CommandSpec) {
        let spawned = self.backends.sandbox.spawn(command);
        let events = self.events.clone();
        let processes = Arc::clone(&self.processes);

        tokio::spawn(async move {
            let SpawnedProcess {
                handle,
                mut output,
                exit,
            } = match spawned.await {
                Ok(process) => process,
                Err(error) => {
                    let _ = events.send(SandboxEvent::SpawnFailed { run_id, role, error }.into());
                    return;
                }
            };

            let process_id = handle.id();
            lock_unpoisoned(&processes).insert(process_id, handle);
            let _ = events.send(
                SandboxEvent::ProcessSpawned {
                    run_id,
                    role,
                    process_id,
                }
                .into(),
            );

            while let Some(chunk) = output.next().await {
                let _ = events.send(SandboxEvent::ProcessOutput { run_id, role, chunk }.into());
            }

            let code = exit.await;
            lock_unpoisoned(&processes).remove(&process_id);
            let _ = events.send(
                SandboxEvent::ProcessExited {
                    run_id,
                    role,
                    process_id,
                    code,
                }
                .into(),
            );
        });
    }

    fn kill(&mut self, process_id: ProcessId) {
        let handle = lock_unpoisoned(&self.processes).get(&process_id).cloned();
        match handle {
            Some(handle) => handle.kill(),
            None => tracing::debug!(process_id, "kill requested for process that already exited"),
        }
    }

    fn teardown_sandbox(&mut self) {
        let handles: Vec<Arc<dyn ProcessHandle>> =
            lock_unpoisoned(&self.processes).drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            handle.kill();
        }
        if let Some(task) = self.ready_listener.take() {
            task.abort();
        }
        self.backends.sandbox.teardown();
    }
}

impl WorkspaceHost for DriverHost {
    fn request_render(&mut self) {
        self.render_requested = true;
    }
}

impl Drop for DriverHost {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

/// Owns a [`Workspace`] and drives it from backend completions and user input.
pub struct WorkspaceRuntime {
    workspace: Workspace,
    host: DriverHost,
    inbox: mpsc::UnboundedReceiver<WorkspaceEvent>,
}

impl WorkspaceRuntime {
    pub fn new(workspace: Workspace, backends: Backends) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        Self {
            workspace,
            host: DriverHost {
                backends,
                events,
                processes: Arc::new(Mutex::new(HashMap::new())),
                subscription: None,
                ready_listener: None,
                render_requested: false,
            },
            inbox,
        }
    }

    /// Activates the workspace. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), WorkspaceError> {
        self.host.listen_for_server_ready();
        self.workspace.activate(&mut self.host)
    }

    pub fn handle(&self) -> WorkspaceHandle {
        WorkspaceHandle {
            events: self.host.events.clone(),
        }
    }

    pub fn dispatch(&self, command: UserCommand) {
        self.host.send(command);
    }

    /// Waits for the next event and applies it.
    pub async fn step(&mut self) -> Result<(), WorkspaceError> {
        match self.inbox.recv().await {
            Some(event) => self.apply(event),
            None => Ok(()),
        }
    }

    /// Applies every event already queued, without waiting. Returns the number applied.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.inbox.try_recv() {
            if let Err(error) = self.apply(event) {
                tracing::warn!(error = %error, "workspace event rejected");
            }
            applied += 1;
        }
        applied
    }

    /// Steps until the workspace is deactivated or a blocking error occurs.
    pub async fn run_until_deactivated(&mut self) -> Result<(), WorkspaceError> {
        while !self.is_finished() {
            if let Err(error) = self.step().await {
                if error.is_blocking() {
                    return Err(error);
                }
                tracing::warn!(error = %error, "workspace command rejected");
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, event: WorkspaceEvent) -> Result<(), WorkspaceError> {
        self.workspace.apply(event, &mut self.host)
    }

    /// Leaves the channel and releases the sandbox.
    pub fn shutdown(&mut self) {
        self.workspace.deactivate(&mut self.host);
        self.host.stop_tasks();
    }

    /// Returns whether state changed since the last call.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.host.render_requested)
    }

    pub fn is_finished(&self) -> bool {
        self.workspace.lifecycle() == Lifecycle::Deactivated
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
