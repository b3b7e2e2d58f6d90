//! Sequencing of the sandboxed runtime: mount, install, start, ready.
//!
//! The controller never runs anything itself. It asks the host to mount and
//! spawn, and advances only when the matching completion arrives for the
//! current [`RunId`]. At most one start process is live at any time: a new run
//! kills the previous one before anything else is spawned.

use std::collections::VecDeque;

use url::Url;
use workspace_protocol::{CommandSpec, FileTree, ProcessId, SandboxError, ServerReady};

use crate::runtime::host::SandboxHost;

pub type RunId = u64;

const TRANSITION_HISTORY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    Install,
    Start,
}

impl ProcessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Start => "start",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Idle,
    Mounting,
    Installing,
    Starting,
    Running,
    Ready,
    Restarting,
    Failed,
}

impl SandboxState {
    /// True while a run is in progress or serving.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCommands {
    pub install: CommandSpec,
    pub start: CommandSpec,
}

impl Default for SandboxCommands {
    fn default() -> Self {
        Self {
            install: CommandSpec::new("npm", ["install"]),
            start: CommandSpec::new("npm", ["start"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub run_id: RunId,
    pub role: ProcessRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxTransition {
    pub run_id: RunId,
    pub from: SandboxState,
    pub to: SandboxState,
}

#[derive(Debug)]
pub struct SandboxController {
    state: SandboxState,
    run_id: RunId,
    commands: SandboxCommands,
    install_process: Option<ProcessId>,
    live_process: Option<ProcessId>,
    preview_address: Option<Url>,
    last_error: Option<String>,
    output: VecDeque<OutputLine>,
    output_capacity: usize,
    transitions: VecDeque<SandboxTransition>,
    torn_down: bool,
}

impl SandboxController {
    pub fn new(commands: SandboxCommands, output_capacity: usize) -> Self {
        Self {
            state: SandboxState::Idle,
            run_id: 0,
            commands,
            install_process: None,
            live_process: None,
            preview_address: None,
            last_error: None,
            output: VecDeque::new(),
            output_capacity,
            transitions: VecDeque::new(),
            torn_down: false,
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn commands(&self) -> &SandboxCommands {
        &self.commands
    }

    pub fn live_process(&self) -> Option<ProcessId> {
        self.live_process
    }

    pub fn preview_address(&self) -> Option<&Url> {
        self.preview_address.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Recent output lines, oldest first.
    pub fn output(&self) -> impl Iterator<Item = &OutputLine> + '_ {
        self.output.iter()
    }

    pub fn output_for(&self, role: ProcessRole) -> impl Iterator<Item = &OutputLine> + '_ {
        self.output.iter().filter(move |line| line.role == role)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &SandboxTransition> + '_ {
        self.transitions.iter()
    }

    /// Starts a run from `snapshot`, restarting if one is already in progress.
    pub fn run<H: SandboxHost + ?Sized>(&mut self, snapshot: FileTree, host: &mut H) {
        if self.torn_down {
            tracing::debug!("ignoring run request after sandbox teardown");
            return;
        }

        if self.state.is_active() {
            tracing::info!(run_id = self.run_id, state = ?self.state, "restarting sandbox run");
            self.transition(SandboxState::Restarting);
            self.kill_processes(host);
            self.preview_address = None;
        }

        self.run_id += 1;
        self.last_error = None;
        self.transition(SandboxState::Mounting);
        tracing::info!(run_id = self.run_id, files = snapshot.len(), "mounting file tree");
        host.mount(self.run_id, snapshot);
    }

    pub fn on_mounted<H: SandboxHost + ?Sized>(&mut self, run_id: RunId, host: &mut H) {
        if !self.is_current(run_id) || self.state != SandboxState::Mounting {
            return;
        }

        self.transition(SandboxState::Installing);
        tracing::info!(run_id, command = %self.commands.install, "installing dependencies");
        host.spawn(run_id, ProcessRole::Install, self.commands.install.clone());
    }

    pub fn on_mount_failed<H: SandboxHost + ?Sized>(
        &mut self,
        run_id: RunId,
        error: &SandboxError,
        host: &mut H,
    ) {
        if !self.is_current(run_id) {
            return;
        }
        self.fail(format!("mount failed: {error}"), host);
    }

    pub fn on_spawned<H: SandboxHost + ?Sized>(
        &mut self,
        run_id: RunId,
        role: ProcessRole,
        process_id: ProcessId,
        host: &mut H,
    ) {
        if !self.is_current(run_id) {
            tracing::debug!(run_id, process_id, "killing process spawned for superseded run");
            host.kill(process_id);
            return;
        }

        match (role, self.state) {
            (ProcessRole::Install, SandboxState::Installing) => {
                self.install_process = Some(process_id);
            }
            (ProcessRole::Start, SandboxState::Starting) => {
                self.live_process = Some(process_id);
                self.transition(SandboxState::Running);
                tracing::info!(run_id, process_id, "start process running");
            }
            _ => {
                tracing::warn!(run_id, role = role.as_str(), state = ?self.state, "unexpected spawn; killing");
                host.kill(process_id);
            }
        }
    }

    pub fn on_spawn_failed<H: SandboxHost + ?Sized>(
        &mut self,
        run_id: RunId,
        role: ProcessRole,
        error: &SandboxError,
        host: &mut H,
    ) {
        if !self.is_current(run_id) {
            return;
        }
        self.fail(format!("failed to spawn {} process: {error}", role.as_str()), host);
    }

    /// Records process output for diagnostics. Output never drives transitions.
    pub fn on_output(&mut self, run_id: RunId, role: ProcessRole, chunk: &str) {
        if !self.is_current(run_id) {
            return;
        }

        for line in chunk.lines().filter(|line| !line.trim().is_empty()) {
            tracing::debug!(run_id, role = role.as_str(), line, "sandbox output");
            if self.output_capacity == 0 {
                continue;
            }
            while self.output.len() >= self.output_capacity {
                self.output.pop_front();
            }
            self.output.push_back(OutputLine {
                run_id,
                role,
                text: line.to_string(),
            });
        }
    }

    pub fn on_exited<H: SandboxHost + ?Sized>(
        &mut self,
        run_id: RunId,
        role: ProcessRole,
        process_id: ProcessId,
        code: i32,
        host: &mut H,
    ) {
        if !self.is_current(run_id) {
            return;
        }

        match role {
            ProcessRole::Install if self.install_process == Some(process_id) => {
                self.install_process = None;
                if code != 0 {
                    self.fail(format!("install exited with code {code}"), host);
                    return;
                }
                if self.state != SandboxState::Installing {
                    return;
                }

                if let Some(previous) = self.live_process.take() {
                    tracing::debug!(run_id, process_id = previous, "killing previous live process");
                    host.kill(previous);
                }
                self.transition(SandboxState::Starting);
                tracing::info!(run_id, command = %self.commands.start, "starting project");
                host.spawn(run_id, ProcessRole::Start, self.commands.start.clone());
            }
            ProcessRole::Start if self.live_process == Some(process_id) => {
                self.live_process = None;
                self.fail(format!("start process exited with code {code}"), host);
            }
            _ => {
                tracing::debug!(run_id, process_id, "ignoring exit of untracked process");
            }
        }
    }

    /// Accepts the readiness signal while the start process is running.
    ///
    /// Signals carry no run id, so they are gated on state alone: a signal
    /// from a killed server is dropped while the next run mounts, installs or
    /// starts, but one that arrives after the new start process is running is
    /// taken as that run's readiness.
    pub fn on_server_ready(&mut self, ready: &ServerReady) {
        if self.state != SandboxState::Running {
            tracing::debug!(state = ?self.state, port = ready.port, "ignoring server-ready outside running state");
            return;
        }

        match preview_url(ready) {
            Ok(url) => {
                tracing::info!(run_id = self.run_id, address = %url, "preview ready");
                self.preview_address = Some(url);
                self.transition(SandboxState::Ready);
            }
            Err(error) => {
                tracing::warn!(address = %ready.address, error = %error, "ignoring unparseable preview address");
            }
        }
    }

    /// Moves to `Failed`, killing every tracked process.
    pub fn fail<H: SandboxHost + ?Sized>(&mut self, reason: String, host: &mut H) {
        tracing::warn!(run_id = self.run_id, state = ?self.state, reason = %reason, "sandbox run failed");
        self.kill_processes(host);
        self.preview_address = None;
        self.last_error = Some(reason);
        self.transition(SandboxState::Failed);
    }

    /// Releases the sandbox session. Later completions and runs are ignored.
    pub fn teardown<H: SandboxHost + ?Sized>(&mut self, host: &mut H) {
        if self.torn_down {
            return;
        }

        self.kill_processes(host);
        self.preview_address = None;
        self.torn_down = true;
        self.run_id += 1;
        self.transition(SandboxState::Idle);
        host.teardown_sandbox();
    }

    fn kill_processes<H: SandboxHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(process_id) = self.install_process.take() {
            host.kill(process_id);
        }
        if let Some(process_id) = self.live_process.take() {
            host.kill(process_id);
        }
    }

    fn transition(&mut self, to: SandboxState) {
        if self.state == to {
            return;
        }

        if self.transitions.len() >= TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(SandboxTransition {
            run_id: self.run_id,
            from: self.state,
            to,
        });
        self.state = to;
    }

    fn is_current(&self, run_id: RunId) -> bool {
        !self.torn_down && run_id == self.run_id
    }
}

fn preview_url(ready: &ServerReady) -> Result<Url, url::ParseError> {
    let mut url = match Url::parse(&ready.address) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{}", ready.address))?
        }
        Err(error) => return Err(error),
    };

    if url.port().is_none() && url.port_or_known_default() != Some(ready.port) {
        // Only fails for cannot-be-a-base urls, which keep their original form.
        let _ = url.set_port(Some(ready.port));
    }
    Ok(url)
}
