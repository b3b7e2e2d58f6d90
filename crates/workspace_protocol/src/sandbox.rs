use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::tree::FileTree;

/// Sandbox-assigned process identifier.
pub type ProcessId = u64;

/// Failure reported by the sandboxed runtime (mount or spawn).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SandboxError {
    message: String,
}

impl SandboxError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Program plus arguments handed to [`SandboxRuntime::spawn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a command line on whitespace. Returns `None` for blank input.
    #[must_use]
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Readiness signal emitted by the sandbox once a served port is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub address: String,
}

/// Kill switch for one spawned process.
pub trait ProcessHandle: Send + Sync {
    fn id(&self) -> ProcessId;

    /// Requests termination. Idempotent; the exit future resolves afterwards.
    fn kill(&self);
}

/// A started process: its kill handle, its output chunks and its exit code.
///
/// `output` is finite for the lifetime of the process.
pub struct SpawnedProcess {
    pub handle: Arc<dyn ProcessHandle>,
    pub output: BoxStream<'static, String>,
    pub exit: BoxFuture<'static, i32>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("id", &self.handle.id())
            .finish_non_exhaustive()
    }
}

/// Isolated runtime that can mount a tree and run commands against it.
pub trait SandboxRuntime: Send + Sync + 'static {
    /// Replaces the sandbox file system with `tree`.
    fn mount(&self, tree: FileTree) -> BoxFuture<'static, Result<(), SandboxError>>;

    /// Starts `command` inside the mounted file system.
    fn spawn(&self, command: CommandSpec) -> BoxFuture<'static, Result<SpawnedProcess, SandboxError>>;

    /// Stream of readiness notifications, at most one per started server.
    fn server_ready(&self) -> BoxStream<'static, ServerReady>;

    /// Releases the runtime session.
    fn teardown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::CommandSpec;

    #[test]
    fn parse_splits_program_and_args() {
        let command = CommandSpec::parse("  npm   run dev ").expect("command");
        assert_eq!(command, CommandSpec::new("npm", ["run", "dev"]));
        assert_eq!(command.to_string(), "npm run dev");
    }

    #[test]
    fn parse_rejects_blank_input() {
        assert_eq!(CommandSpec::parse("   "), None);
    }
}
