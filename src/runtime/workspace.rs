//! The workspace aggregate: one activation of one project for one user.
//!
//! `Workspace` owns every component and is the only writer of their state.
//! Side effects go out through a [`WorkspaceHost`]; their completions come
//! back through [`Workspace::apply`], one event at a time.

use std::collections::{BTreeMap, BTreeSet};

use time::OffsetDateTime;
use uuid::Uuid;
use workspace_protocol::{
    ChannelMessage, ProjectId, ProjectRecord, UserId, UserRef, PROJECT_MESSAGE_TOPIC,
};

use crate::config::WorkspaceConfig;
use crate::core::file_tree::FileTreeStore;
use crate::core::selection::{CollaboratorSelector, CommitOutcome};
use crate::core::transcript::{EntryAuthor, EntryBody, EntrySeq, TranscriptLog};
use crate::error::WorkspaceError;
use crate::runtime::events::{SandboxEvent, UserCommand, WorkspaceEvent};
use crate::runtime::gateway::{ChannelGateway, Delivery};
use crate::runtime::host::WorkspaceHost;
use crate::runtime::router::MessageRouter;
use crate::runtime::sandbox::SandboxController;

/// Identity of one workspace activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub project_id: ProjectId,
    pub user: UserRef,
    pub started_at: OffsetDateTime,
}

impl SessionContext {
    pub fn new(project_id: impl Into<ProjectId>, user: UserRef) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            project_id: project_id.into(),
            user,
            started_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Project metadata. The file tree itself lives in [`FileTreeStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub user_ids: BTreeSet<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Active,
    Deactivated,
}

#[derive(Debug)]
pub struct Workspace {
    session: SessionContext,
    lifecycle: Lifecycle,
    project: Option<Project>,
    directory: BTreeMap<UserId, UserRef>,
    files: FileTreeStore,
    transcript: TranscriptLog,
    router: MessageRouter,
    gateway: ChannelGateway,
    sandbox: SandboxController,
    selector: CollaboratorSelector,
    alerts: Vec<String>,
}

impl Workspace {
    pub fn new(session: SessionContext, config: &WorkspaceConfig) -> Self {
        Self {
            session,
            lifecycle: Lifecycle::Created,
            project: None,
            directory: BTreeMap::new(),
            files: FileTreeStore::new(),
            transcript: TranscriptLog::new(),
            router: MessageRouter::new(config.assistant_id.clone()),
            gateway: ChannelGateway::new(config.rejoin),
            sandbox: SandboxController::new(config.commands.clone(), config.output_history),
            selector: CollaboratorSelector::new(config.empty_commit),
            alerts: Vec::new(),
        }
    }

    /// Joins the project channel and requests the project record and user directory.
    ///
    /// Activating an already active workspace does nothing.
    pub fn activate(&mut self, host: &mut dyn WorkspaceHost) -> Result<(), WorkspaceError> {
        match self.lifecycle {
            Lifecycle::Active => return Ok(()),
            Lifecycle::Deactivated => return Err(WorkspaceError::Deactivated),
            Lifecycle::Created => {}
        }

        let project_id = self.session.project_id.clone();
        self.gateway.activate(&project_id, host)?;
        host.load_project(&project_id);
        host.load_users();
        self.lifecycle = Lifecycle::Active;
        tracing::info!(
            session_id = %self.session.session_id,
            project_id = %project_id,
            user_id = %self.session.user.id,
            "workspace activated"
        );
        Ok(())
    }

    /// Leaves the channel and tears down the sandbox session.
    pub fn deactivate(&mut self, host: &mut dyn WorkspaceHost) {
        if self.lifecycle == Lifecycle::Deactivated {
            return;
        }

        if self.lifecycle == Lifecycle::Active {
            self.flush_persist(host);
            self.gateway.deactivate(host);
            self.sandbox.teardown(host);
        }
        self.lifecycle = Lifecycle::Deactivated;
        tracing::info!(session_id = %self.session.session_id, "workspace deactivated");
        host.request_render();
    }

    /// Applies one event. Errors are returned only for rejected user commands
    /// and for the blocking initial join failure.
    pub fn apply(
        &mut self,
        event: WorkspaceEvent,
        host: &mut dyn WorkspaceHost,
    ) -> Result<(), WorkspaceError> {
        if self.lifecycle == Lifecycle::Deactivated {
            if matches!(event, WorkspaceEvent::User(_)) {
                return Err(WorkspaceError::Deactivated);
            }
            tracing::debug!(?event, "ignoring event after deactivation");
            return Ok(());
        }

        let result = self.dispatch(event, host);
        if self.lifecycle == Lifecycle::Active {
            self.flush_persist(host);
        }
        host.request_render();
        result
    }

    fn dispatch(
        &mut self,
        event: WorkspaceEvent,
        host: &mut dyn WorkspaceHost,
    ) -> Result<(), WorkspaceError> {
        match event {
            WorkspaceEvent::ChannelJoined { epoch } => self.gateway.on_joined(epoch),
            WorkspaceEvent::ChannelJoinFailed { epoch, error } => {
                if let Err(error) = self.gateway.on_join_failed(epoch, error, host) {
                    self.alert(error.to_string());
                    return Err(error);
                }
            }
            WorkspaceEvent::ChannelDelivered { epoch, event } => {
                if let Some(Delivery::ProjectMessage(message)) = self.gateway.accept(epoch, event) {
                    self.router.route(
                        message,
                        &self.session.user.id,
                        &mut self.transcript,
                        &mut self.files,
                    );
                }
            }
            WorkspaceEvent::ChannelDropped { epoch, reason } => {
                self.gateway.on_dropped(epoch, &reason, host);
            }
            WorkspaceEvent::PublishFailed { error } => {
                tracing::warn!(error = %error, "message publish failed; it was not delivered");
                self.alert(format!("message not delivered: {error}"));
            }
            WorkspaceEvent::ProjectLoaded(record) => self.on_project_loaded(record),
            WorkspaceEvent::ProjectLoadFailed(error) => {
                tracing::warn!(error = %error, "failed to load project");
                self.alert(format!("failed to load project: {error}"));
            }
            WorkspaceEvent::UsersLoaded(users) => {
                tracing::debug!(count = users.len(), "user directory loaded");
                self.directory
                    .extend(users.into_iter().map(|user| (user.id.clone(), user)));
            }
            WorkspaceEvent::UsersLoadFailed(error) => {
                tracing::warn!(error = %error, "failed to load user directory");
            }
            WorkspaceEvent::FileTreePersisted { generation } => self.files.on_persisted(generation),
            WorkspaceEvent::FileTreePersistFailed { generation, error } => {
                self.files.on_persist_failed(generation, error.message());
                self.alert(format!("file changes not saved: {error}"));
            }
            WorkspaceEvent::CollaboratorsAdded => {
                let added = self.selector.on_committed();
                tracing::info!(count = added.len(), "collaborators added");
                if let Some(project) = self.project.as_mut() {
                    project.user_ids.extend(added);
                }
            }
            WorkspaceEvent::CollaboratorsAddFailed(error) => {
                tracing::warn!(error = %error, "failed to add collaborators");
                self.selector.on_commit_failed();
                self.alert(format!("failed to add collaborators: {error}"));
            }
            WorkspaceEvent::Sandbox(event) => self.on_sandbox_event(event, host),
            WorkspaceEvent::User(command) => return self.handle_command(command, host),
        }
        Ok(())
    }

    pub fn handle_command(
        &mut self,
        command: UserCommand,
        host: &mut dyn WorkspaceHost,
    ) -> Result<(), WorkspaceError> {
        if command == UserCommand::Deactivate {
            self.deactivate(host);
            return Ok(());
        }
        self.ensure_active()?;

        match command {
            UserCommand::SendMessage(text) => self.send_message(&text, host).map(|_| ()),
            UserCommand::EditFile { path, contents } => self.files.set(path, contents),
            UserCommand::OpenFile(path) => self.files.open(&path),
            UserCommand::CloseFile(path) => {
                self.files.close(&path);
                Ok(())
            }
            UserCommand::RemoveFile(path) => self.files.remove(&path).map(|_| ()),
            UserCommand::Run => {
                if !self.files.is_loaded() {
                    return Err(WorkspaceError::ProjectNotLoaded);
                }
                self.sandbox.run(self.files.snapshot(), host);
                Ok(())
            }
            UserCommand::ToggleCollaborator(user_id) => {
                self.selector.toggle(user_id);
                Ok(())
            }
            UserCommand::CommitCollaborators => {
                self.commit_collaborators(host);
                Ok(())
            }
            UserCommand::CancelCollaborators => {
                self.selector.cancel();
                Ok(())
            }
            UserCommand::Reconnect => self.gateway.reconnect(host),
            UserCommand::Deactivate => Ok(()),
        }
    }

    /// Publishes `text` to the other members and echoes it locally.
    ///
    /// Blank input is ignored and yields `None`.
    pub fn send_message(
        &mut self,
        text: &str,
        host: &mut dyn WorkspaceHost,
    ) -> Result<Option<EntrySeq>, WorkspaceError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let user = self.session.user.clone();
        self.gateway
            .publish(PROJECT_MESSAGE_TOPIC, ChannelMessage::text(user.clone(), text), host)?;
        let seq = self
            .transcript
            .append(EntryAuthor::Local(user), EntryBody::Text(text.to_string()));
        Ok(Some(seq))
    }

    fn commit_collaborators(&mut self, host: &mut dyn WorkspaceHost) {
        match self.selector.commit() {
            CommitOutcome::Send(users) => {
                tracing::info!(count = users.len(), "adding collaborators");
                host.add_users(&self.session.project_id, users);
            }
            CommitOutcome::Skipped => self.selector.cancel(),
            CommitOutcome::AlreadyPending => {
                tracing::debug!("collaborator commit already in flight");
            }
        }
    }

    fn on_project_loaded(&mut self, record: ProjectRecord) {
        if record.id != self.session.project_id {
            tracing::warn!(
                expected = %self.session.project_id,
                received = %record.id,
                "ignoring record for another project"
            );
            return;
        }

        for user in record.users.iter().filter_map(|member| member.as_user()) {
            self.directory
                .entry(user.id.clone())
                .or_insert_with(|| user.clone());
        }

        self.project = Some(Project {
            id: record.id,
            name: record.name,
            user_ids: record
                .users
                .iter()
                .map(|member| member.id().to_string())
                .collect(),
        });
        tracing::info!(files = record.file_tree.len(), "project loaded");
        self.files.replace(record.file_tree);
    }

    fn on_sandbox_event(&mut self, event: SandboxEvent, host: &mut dyn WorkspaceHost) {
        match event {
            SandboxEvent::Mounted { run_id } => self.sandbox.on_mounted(run_id, host),
            SandboxEvent::MountFailed { run_id, error } => {
                self.sandbox.on_mount_failed(run_id, &error, host);
            }
            SandboxEvent::ProcessSpawned {
                run_id,
                role,
                process_id,
            } => self.sandbox.on_spawned(run_id, role, process_id, host),
            SandboxEvent::SpawnFailed {
                run_id,
                role,
                error,
            } => self.sandbox.on_spawn_failed(run_id, role, &error, host),
            SandboxEvent::ProcessOutput {
                run_id,
                role,
                chunk,
            } => self.sandbox.on_output(run_id, role, &chunk),
            SandboxEvent::ProcessExited {
                run_id,
                role,
                process_id,
                code,
            } => self.sandbox.on_exited(run_id, role, process_id, code, host),
            SandboxEvent::ServerReady(ready) => self.sandbox.on_server_ready(&ready),
        }
    }

    fn flush_persist(&mut self, host: &mut dyn WorkspaceHost) {
        if let Some(request) = self.files.take_persist_request() {
            tracing::debug!(generation = request.generation, "persisting file tree");
            host.persist_file_tree(&self.session.project_id, request.generation, request.tree);
        }
    }

    fn ensure_active(&self) -> Result<(), WorkspaceError> {
        match self.lifecycle {
            Lifecycle::Active => Ok(()),
            Lifecycle::Created => Err(WorkspaceError::NotActive),
            Lifecycle::Deactivated => Err(WorkspaceError::Deactivated),
        }
    }

    fn alert(&mut self, message: String) {
        self.alerts.push(message);
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /// Project members resolved through the user directory.
    pub fn members(&self) -> Vec<UserRef> {
        let Some(project) = &self.project else {
            return Vec::new();
        };

        project
            .user_ids
            .iter()
            .map(|id| {
                self.directory
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| UserRef::new(id.clone(), ""))
            })
            .collect()
    }

    /// Directory users who are not yet project members.
    pub fn candidates(&self) -> Vec<&UserRef> {
        self.directory
            .values()
            .filter(|user| {
                self.project
                    .as_ref()
                    .map_or(true, |project| !project.user_ids.contains(&user.id))
            })
            .collect()
    }

    pub fn directory(&self) -> impl Iterator<Item = &UserRef> + '_ {
        self.directory.values()
    }

    pub fn files(&self) -> &FileTreeStore {
        &self.files
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn gateway(&self) -> &ChannelGateway {
        &self.gateway
    }

    pub fn sandbox(&self) -> &SandboxController {
        &self.sandbox
    }

    pub fn selector(&self) -> &CollaboratorSelector {
        &self.selector
    }

    /// Drains user-facing failure notices collected since the last call.
    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }
}
