//! Line-oriented rendering of workspace state changes.

use collab_workspace::{
    EntryBody, GatewayStatus, SandboxState, TranscriptEntry, Workspace,
};

const STATUS_OUTPUT_LINES: usize = 10;

/// Tracks what has already been printed so each refresh only emits changes.
#[derive(Debug, Default)]
pub struct Printer {
    printed_entries: usize,
    gateway: Option<GatewayStatus>,
    sandbox: Option<(u64, SandboxState)>,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns lines describing everything that changed since the last call.
    pub fn updates(&mut self, workspace: &mut Workspace) -> Vec<String> {
        let mut lines = Vec::new();

        let status = workspace.gateway().status();
        if self.gateway != Some(status) {
            self.gateway = Some(status);
            lines.push(format!("* channel {}", gateway_label(status)));
        }

        for entry in workspace.transcript().iter().skip(self.printed_entries) {
            lines.push(format_entry(entry));
        }
        self.printed_entries = workspace.transcript().len();

        let sandbox = workspace.sandbox();
        let current = (sandbox.run_id(), sandbox.state());
        if self.sandbox != Some(current) && sandbox.run_id() > 0 {
            self.sandbox = Some(current);
            lines.push(match sandbox.state() {
                SandboxState::Ready => format!(
                    "* sandbox ready at {}",
                    sandbox
                        .preview_address()
                        .map(|url| url.as_str())
                        .unwrap_or("<unknown>")
                ),
                SandboxState::Failed => format!(
                    "* sandbox failed: {}",
                    sandbox.last_error().unwrap_or("unknown error")
                ),
                state => format!("* sandbox {}", state_label(state)),
            });
        }

        for alert in workspace.take_alerts() {
            lines.push(format!("! {alert}"));
        }

        lines
    }
}

pub fn format_entry(entry: &TranscriptEntry) -> String {
    let label = entry.author.label();
    match &entry.body {
        EntryBody::Text(text) => format!("[{label}] {text}"),
        EntryBody::Assistant {
            text,
            changed_paths,
        } if changed_paths.is_empty() => format!("[{label}] {text}"),
        EntryBody::Assistant {
            text,
            changed_paths,
        } => format!("[{label}] {text} (updated {})", changed_paths.join(", ")),
        EntryBody::Opaque { raw, error } => format!("[{label}] {raw} (unreadable: {error})"),
    }
}

pub fn status_lines(workspace: &Workspace) -> Vec<String> {
    let mut lines = Vec::new();
    let project = workspace
        .project()
        .map(|project| format!("{} ({})", project.name, project.id))
        .unwrap_or_else(|| format!("{} (loading)", workspace.session().project_id));
    lines.push(format!("project: {project}"));
    lines.push(format!(
        "channel: {}",
        gateway_label(workspace.gateway().status())
    ));

    let members: Vec<String> = workspace
        .members()
        .into_iter()
        .map(|member| {
            if member.email.is_empty() {
                member.id
            } else {
                member.email
            }
        })
        .collect();
    lines.push(format!("members: {}", members.join(", ")));

    let picked: Vec<&str> = workspace.selector().selected().collect();
    if !picked.is_empty() {
        lines.push(format!("picked: {}", picked.join(", ")));
    }

    let sandbox = workspace.sandbox();
    lines.push(format!("sandbox: {}", state_label(sandbox.state())));
    if let Some(url) = sandbox.preview_address() {
        lines.push(format!("preview: {url}"));
    }
    if let Some(error) = sandbox.last_error() {
        lines.push(format!("last error: {error}"));
    }

    let output: Vec<_> = sandbox.output().collect();
    let skip = output.len().saturating_sub(STATUS_OUTPUT_LINES);
    for line in &output[skip..] {
        lines.push(format!("  {} | {}", line.role.as_str(), line.text));
    }

    lines
}

pub fn file_lines(workspace: &Workspace) -> Vec<String> {
    let files = workspace.files();
    files
        .list_paths()
        .map(|path| {
            let marker = if files.current() == Some(path) {
                '>'
            } else if files.open_files().iter().any(|open| open == path) {
                '+'
            } else {
                ' '
            };
            format!("{marker} {path}")
        })
        .collect()
}

fn gateway_label(status: GatewayStatus) -> String {
    match status {
        GatewayStatus::Inactive => "inactive".to_string(),
        GatewayStatus::Joining => "joining".to_string(),
        GatewayStatus::Joined => "joined".to_string(),
        GatewayStatus::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
        GatewayStatus::Disconnected => "disconnected; /reconnect to retry".to_string(),
        GatewayStatus::Left => "left".to_string(),
    }
}

fn state_label(state: SandboxState) -> &'static str {
    match state {
        SandboxState::Idle => "idle",
        SandboxState::Mounting => "mounting",
        SandboxState::Installing => "installing",
        SandboxState::Starting => "starting",
        SandboxState::Running => "running",
        SandboxState::Ready => "ready",
        SandboxState::Failed => "failed",
        SandboxState::Restarting => "restarting",
    }
}
