use std::path::PathBuf;

use anyhow::Context;
use collab_workspace::{logging, SessionContext, UserCommand, Workspace, WorkspaceConfig, WorkspaceRuntime};
use tokio::io::{AsyncBufReadExt, BufReader};
use workspace_cli::backends::backends_from_env;
use workspace_cli::commands::{parse_input, Input, SlashCommand, HELP};
use workspace_cli::render::{file_lines, status_lines, Printer};
use workspace_protocol::UserRef;

const DEFAULT_PROJECT_ID: &str = "demo";
const DEFAULT_USER_ID: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_file = env_value("COLLAB_LOG_FILE").map(PathBuf::from);
    logging::init(log_file.as_deref()).context("failed to install logging")?;

    let project_id = env_value("COLLAB_PROJECT_ID").unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());
    let user_id = env_value("COLLAB_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string());
    let email = env_value("COLLAB_USER_EMAIL").unwrap_or_else(|| format!("{user_id}@localhost"));
    let user = UserRef::new(user_id, email);

    let config = WorkspaceConfig::from_env();
    let backends = backends_from_env(&project_id, &user, &config)
        .context("failed to configure backends")?;

    let session = SessionContext::new(project_id, user);
    tracing::info!(session_id = %session.session_id, project_id = %session.project_id, "starting workspace session");

    let mut runtime = WorkspaceRuntime::new(Workspace::new(session, &config), backends);
    runtime.start().context("failed to activate workspace")?;

    let mut printer = Printer::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    println!("type /help for commands");

    while !runtime.is_finished() {
        tokio::select! {
            line = stdin.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) => handle_line(&mut runtime, &line),
                    None => runtime.dispatch(UserCommand::Deactivate),
                }
            }
            result = runtime.step() => {
                if let Err(error) = result {
                    if error.is_blocking() {
                        runtime.shutdown();
                        return Err(error).context("workspace stopped");
                    }
                    println!("! {error}");
                }
            }
        }

        if runtime.take_render_request() {
            for line in printer.updates(runtime.workspace_mut()) {
                println!("{line}");
            }
        }
    }

    runtime.shutdown();
    Ok(())
}

fn handle_line(runtime: &mut WorkspaceRuntime, line: &str) {
    let command = match parse_input(line) {
        Input::Empty => return,
        Input::Message(text) => UserCommand::SendMessage(text),
        Input::Command(SlashCommand::Workspace(command)) => command,
        Input::Command(SlashCommand::Help) => return print_lines(HELP.lines()),
        Input::Command(SlashCommand::Files) => return print_lines(file_lines(runtime.workspace())),
        Input::Command(SlashCommand::Status) => {
            return print_lines(status_lines(runtime.workspace()))
        }
        Input::Command(SlashCommand::Show(path)) => {
            match runtime.workspace().files().get(&path) {
                Some(node) => println!("{}", node.contents),
                None => println!("! no such file: {path}"),
            }
            return;
        }
        Input::Command(SlashCommand::Usage(usage)) => return println!("usage: {usage}"),
        Input::Command(SlashCommand::Unknown(command)) => {
            return println!("! unknown command {command}; try /help")
        }
    };

    runtime.dispatch(command);
}

fn print_lines<I, S>(lines: I)
where
    I: IntoIterator<Item = S>,
    S: std::fmt::Display,
{
    for line in lines {
        println!("{line}");
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
