use collab_workspace::UserCommand;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Message(String),
    Command(SlashCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Files,
    Status,
    Show(String),
    Workspace(UserCommand),
    /// Known command with missing arguments; carries the usage line.
    Usage(&'static str),
    Unknown(String),
}

pub const HELP: &str = "\
/open <path>            open a file and make it current
/close <path>           close an open file
/show <path>            print a file's contents
/edit <path> <text>     replace a file's contents (\\n for newlines)
/rm <path>              delete a file
/files                  list project files
/run                    mount, install and start the project
/invite <user-id>       toggle a user in the collaborator picker
/commit                 add the picked collaborators
/cancel                 clear the collaborator picker
/reconnect              rejoin the project channel after giving up
/status                 show channel, sandbox and member state
/quit                   leave the workspace
anything else           send a chat message";

pub fn parse_input(line: &str) -> Input {
    if line.trim().is_empty() {
        return Input::Empty;
    }

    match parse_slash_command(line) {
        Some(command) => Input::Command(command),
        None => Input::Message(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };
    let argument = || (!rest.is_empty()).then(|| rest.to_string());

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/files" => SlashCommand::Files,
        "/status" => SlashCommand::Status,
        "/run" => SlashCommand::Workspace(UserCommand::Run),
        "/commit" => SlashCommand::Workspace(UserCommand::CommitCollaborators),
        "/cancel" => SlashCommand::Workspace(UserCommand::CancelCollaborators),
        "/reconnect" => SlashCommand::Workspace(UserCommand::Reconnect),
        "/quit" | "/exit" => SlashCommand::Workspace(UserCommand::Deactivate),
        "/show" => argument()
            .map(SlashCommand::Show)
            .unwrap_or(SlashCommand::Usage("/show <path>")),
        "/open" => argument()
            .map(|path| SlashCommand::Workspace(UserCommand::OpenFile(path)))
            .unwrap_or(SlashCommand::Usage("/open <path>")),
        "/close" => argument()
            .map(|path| SlashCommand::Workspace(UserCommand::CloseFile(path)))
            .unwrap_or(SlashCommand::Usage("/close <path>")),
        "/rm" => argument()
            .map(|path| SlashCommand::Workspace(UserCommand::RemoveFile(path)))
            .unwrap_or(SlashCommand::Usage("/rm <path>")),
        "/invite" => argument()
            .map(|user| SlashCommand::Workspace(UserCommand::ToggleCollaborator(user)))
            .unwrap_or(SlashCommand::Usage("/invite <user-id>")),
        "/edit" => parse_edit(rest),
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

fn parse_edit(rest: &str) -> SlashCommand {
    let Some((path, contents)) = rest.split_once(char::is_whitespace) else {
        return SlashCommand::Usage("/edit <path> <text>");
    };

    SlashCommand::Workspace(UserCommand::EditFile {
        path: path.to_string(),
        contents: unescape(contents.trim_start()),
    })
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
