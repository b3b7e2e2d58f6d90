//! Scripted sandbox runtime.
//!
//! Processes follow a [`ProcessScript`] chosen by their command line. Output
//! lines are yielded in order; a script without an exit code keeps running
//! until killed. A script's readiness signal is emitted once its output has
//! been consumed, so it always follows the spawn it belongs to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, watch};
use workspace_protocol::{
    CommandSpec, FileTree, ProcessHandle, ProcessId, SandboxError, SandboxRuntime, ServerReady,
    SpawnedProcess,
};

use crate::lock_unpoisoned;

/// Exit code reported for a killed process.
pub const KILLED_EXIT_CODE: i32 = 137;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessScript {
    pub output: Vec<String>,
    /// `None` keeps the process alive until it is killed.
    pub exit_code: Option<i32>,
    pub ready: Option<ServerReady>,
}

impl ProcessScript {
    /// Prints `output` and exits with `code`.
    #[must_use]
    pub fn exits<I, S>(output: I, code: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output: output.into_iter().map(Into::into).collect(),
            exit_code: Some(code),
            ready: None,
        }
    }

    /// Prints `output`, signals readiness on `port` and serves until killed.
    #[must_use]
    pub fn serves<I, S>(output: I, port: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output: output.into_iter().map(Into::into).collect(),
            exit_code: None,
            ready: Some(ServerReady {
                port,
                address: format!("http://localhost:{port}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    Mount { paths: Vec<String> },
    Spawn { command: String, process_id: ProcessId },
    Kill { process_id: ProcessId },
    Teardown,
}

#[derive(Debug, Default)]
struct SandboxState {
    scripts: HashMap<String, ProcessScript>,
    calls: Vec<SandboxCall>,
    mounted: Option<FileTree>,
    failing_mounts: usize,
    failing_spawns: HashMap<String, String>,
}

#[derive(Debug)]
struct SandboxInner {
    state: Mutex<SandboxState>,
    next_process: AtomicU64,
    ready: broadcast::Sender<ServerReady>,
}

#[derive(Debug, Clone)]
pub struct MockSandbox {
    inner: Arc<SandboxInner>,
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSandbox {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SandboxInner {
                state: Mutex::new(SandboxState::default()),
                next_process: AtomicU64::new(1),
                ready: broadcast::channel(16).0,
            }),
        }
    }

    /// Installs `script` for processes spawned with exactly `command_line`.
    /// Unscripted commands exit 0 without output.
    pub fn script(&self, command_line: &str, script: ProcessScript) {
        lock_unpoisoned(&self.inner.state)
            .scripts
            .insert(normalize(command_line), script);
    }

    pub fn fail_next_mounts(&self, count: usize) {
        lock_unpoisoned(&self.inner.state).failing_mounts = count;
    }

    /// Makes every spawn of `command_line` fail with `message`.
    pub fn fail_spawn(&self, command_line: &str, message: &str) {
        lock_unpoisoned(&self.inner.state)
            .failing_spawns
            .insert(normalize(command_line), message.to_string());
    }

    /// Emits a readiness signal outside any script.
    pub fn signal_ready(&self, ready: ServerReady) {
        let _ = self.inner.ready.send(ready);
    }

    #[must_use]
    pub fn mounted(&self) -> Option<FileTree> {
        lock_unpoisoned(&self.inner.state).mounted.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<SandboxCall> {
        lock_unpoisoned(&self.inner.state).calls.clone()
    }

    fn record(&self, call: SandboxCall) {
        record(&self.inner, call);
    }
}

fn record(inner: &SandboxInner, call: SandboxCall) {
    lock_unpoisoned(&inner.state).calls.push(call);
}

fn normalize(command_line: &str) -> String {
    command_line.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct MockProcessHandle {
    id: ProcessId,
    killed: watch::Sender<bool>,
    sandbox: Arc<SandboxInner>,
}

impl ProcessHandle for MockProcessHandle {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn kill(&self) {
        record(&self.sandbox, SandboxCall::Kill { process_id: self.id });
        self.killed.send_replace(true);
    }
}

impl SandboxRuntime for MockSandbox {
    fn mount(&self, tree: FileTree) -> BoxFuture<'static, Result<(), SandboxError>> {
        self.record(SandboxCall::Mount {
            paths: tree.paths().map(str::to_string).collect(),
        });

        let mut state = lock_unpoisoned(&self.inner.state);
        if state.failing_mounts > 0 {
            state.failing_mounts -= 1;
            return future::ready(Err(SandboxError::new("mount rejected"))).boxed();
        }
        state.mounted = Some(tree);
        future::ready(Ok(())).boxed()
    }

    fn spawn(&self, command: CommandSpec) -> BoxFuture<'static, Result<SpawnedProcess, SandboxError>> {
        let command_line = normalize(&command.to_string());
        let script = {
            let state = lock_unpoisoned(&self.inner.state);
            if let Some(message) = state.failing_spawns.get(&command_line) {
                return future::ready(Err(SandboxError::new(message.clone()))).boxed();
            }
            state
                .scripts
                .get(&command_line)
                .cloned()
                .unwrap_or_else(|| ProcessScript::exits(Vec::<String>::new(), 0))
        };

        let process_id = self.inner.next_process.fetch_add(1, Ordering::Relaxed);
        self.record(SandboxCall::Spawn {
            command: command_line,
            process_id,
        });

        let (killed, mut killed_rx) = watch::channel(false);
        let handle = Arc::new(MockProcessHandle {
            id: process_id,
            killed,
            sandbox: Arc::clone(&self.inner),
        });

        let ready_tx = self.inner.ready.clone();
        let ready = script.ready.clone();
        let output: BoxStream<'static, String> = stream::iter(script.output)
            .chain(stream::once(async move {
                if let Some(ready) = ready {
                    let _ = ready_tx.send(ready);
                }
                None::<String>
            })
            .filter_map(future::ready))
            .boxed();

        let exit = match script.exit_code {
            Some(code) => future::ready(code).boxed(),
            None => async move {
                let _ = killed_rx.wait_for(|killed| *killed).await;
                KILLED_EXIT_CODE
            }
            .boxed(),
        };

        future::ready(Ok(SpawnedProcess {
            handle,
            output,
            exit,
        }))
        .boxed()
    }

    fn server_ready(&self) -> BoxStream<'static, ServerReady> {
        let receiver = self.inner.ready.subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(ready) => return Some((ready, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    fn teardown(&self) {
        self.record(SandboxCall::Teardown);
        lock_unpoisoned(&self.inner.state).mounted = None;
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use workspace_protocol::{CommandSpec, FileNode, FileTree, SandboxRuntime};

    use super::{MockSandbox, ProcessScript, SandboxCall, KILLED_EXIT_CODE};

    #[tokio::test]
    async fn scripted_process_streams_output_then_exits() {
        let sandbox = MockSandbox::new();
        sandbox.script("npm install", ProcessScript::exits(["added 3 packages"], 0));

        let process = sandbox
            .spawn(CommandSpec::new("npm", ["install"]))
            .await
            .expect("spawn");
        let output: Vec<String> = process.output.collect().await;

        assert_eq!(output, vec!["added 3 packages".to_string()]);
        assert_eq!(process.exit.await, 0);
    }

    #[tokio::test]
    async fn serving_process_signals_ready_and_exits_on_kill() {
        let sandbox = MockSandbox::new();
        sandbox.script("npm start", ProcessScript::serves(["listening"], 3000));
        let mut ready = sandbox.server_ready();

        let process = sandbox
            .spawn(CommandSpec::new("npm", ["start"]))
            .await
            .expect("spawn");
        let process_id = process.handle.id();
        let _: Vec<String> = process.output.collect().await;

        let signal = ready.next().await.expect("ready signal");
        assert_eq!(signal.port, 3000);

        process.handle.kill();
        assert_eq!(process.exit.await, KILLED_EXIT_CODE);
        assert_eq!(sandbox.calls().last(), Some(&SandboxCall::Kill { process_id }));
    }

    #[tokio::test]
    async fn mount_failures_and_spawn_failures_are_scripted() {
        let sandbox = MockSandbox::new();
        sandbox.fail_next_mounts(1);
        sandbox.fail_spawn("npm start", "no such command");

        let tree: FileTree = [("a.js".to_string(), FileNode::new("x"))].into_iter().collect();
        assert!(sandbox.mount(tree.clone()).await.is_err());
        assert!(sandbox.mount(tree.clone()).await.is_ok());
        assert_eq!(sandbox.mounted(), Some(tree));

        let spawned = sandbox.spawn(CommandSpec::new("npm", ["start"])).await;
        assert_eq!(
            spawned.map(|process| process.handle.id()).map_err(|error| error.to_string()),
            Err("no such command".to_string())
        );
    }
}
