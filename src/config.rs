//! Environment configuration.

use std::env;
use std::time::Duration;

use workspace_protocol::CommandSpec;

use crate::core::selection::EmptyCommitPolicy;
use crate::runtime::gateway::RejoinPolicy;
use crate::runtime::sandbox::SandboxCommands;

pub const DEFAULT_ASSISTANT_ID: &str = "ai";
pub const DEFAULT_OUTPUT_HISTORY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// User id the assistant posts under, besides the literal `"assistant"` sender.
    pub assistant_id: String,
    pub commands: SandboxCommands,
    pub rejoin: RejoinPolicy,
    pub empty_commit: EmptyCommitPolicy,
    /// Number of sandbox output lines kept for diagnostics.
    pub output_history: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            commands: SandboxCommands::default(),
            rejoin: RejoinPolicy::default(),
            empty_commit: EmptyCommitPolicy::default(),
            output_history: DEFAULT_OUTPUT_HISTORY,
        }
    }
}

impl WorkspaceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            assistant_id: env_string_opt("COLLAB_ASSISTANT_ID").unwrap_or(defaults.assistant_id),
            commands: SandboxCommands {
                install: env_command("COLLAB_INSTALL_COMMAND").unwrap_or(defaults.commands.install),
                start: env_command("COLLAB_START_COMMAND").unwrap_or(defaults.commands.start),
            },
            rejoin: RejoinPolicy {
                max_attempts: env_parse("COLLAB_REJOIN_MAX_ATTEMPTS")
                    .unwrap_or(defaults.rejoin.max_attempts),
                base_delay: env_parse("COLLAB_REJOIN_BASE_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.rejoin.base_delay),
            },
            empty_commit: env_string_opt("COLLAB_EMPTY_COMMIT")
                .and_then(|value| parse_empty_commit(&value))
                .unwrap_or(defaults.empty_commit),
            output_history: env_parse("COLLAB_OUTPUT_HISTORY").unwrap_or(defaults.output_history),
        }
    }
}

fn parse_empty_commit(value: &str) -> Option<EmptyCommitPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "send" => Some(EmptyCommitPolicy::Send),
        "skip" => Some(EmptyCommitPolicy::Skip),
        other => {
            tracing::warn!(value = other, "unknown COLLAB_EMPTY_COMMIT value; using default");
            None
        }
    }
}

fn env_command(key: &str) -> Option<CommandSpec> {
    env_string_opt(key).and_then(|value| CommandSpec::parse(&value))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string_opt(key).and_then(|value| match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparseable environment value");
            None
        }
    })
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
