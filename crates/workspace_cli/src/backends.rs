use std::sync::Arc;

use collab_workspace::{Backends, WorkspaceConfig};
use project_api::{ProjectApiClient, ProjectApiConfig, ProjectApiError};
use workspace_mock::{MockChannelHub, MockProjectStore, MockSandbox, ProcessScript};
use workspace_protocol::{FileNode, FileTree, ProjectMember, ProjectRecord, UserRef};

pub const API_BASE_URL_ENV: &str = "COLLAB_API_BASE_URL";
pub const API_TOKEN_ENV: &str = "COLLAB_API_TOKEN";

pub const DEMO_PORT: u16 = 3000;

/// Builds the backends for one workspace session.
///
/// The project store talks HTTP when `COLLAB_API_BASE_URL` is set and uses a
/// seeded in-memory store otherwise. The channel and sandbox are always the
/// local in-process implementations.
pub fn backends_from_env(
    project_id: &str,
    user: &UserRef,
    config: &WorkspaceConfig,
) -> Result<Backends, ProjectApiError> {
    let api = non_empty_env(API_BASE_URL_ENV).map(|base_url| {
        let mut api = ProjectApiConfig::new(base_url);
        if let Some(token) = non_empty_env(API_TOKEN_ENV) {
            api = api.with_token(token);
        }
        api
    });

    backends_for(api, project_id, user, config)
}

pub fn backends_for(
    api: Option<ProjectApiConfig>,
    project_id: &str,
    user: &UserRef,
    config: &WorkspaceConfig,
) -> Result<Backends, ProjectApiError> {
    let store: Arc<dyn workspace_protocol::ProjectStore> = match api {
        Some(api) => {
            tracing::info!(base_url = %api.base_url, "using project API");
            Arc::new(ProjectApiClient::new(api)?)
        }
        None => {
            tracing::info!(project_id, "no project API configured; using in-memory store");
            Arc::new(demo_store(project_id, user))
        }
    };

    Ok(Backends {
        channel: Arc::new(MockChannelHub::new().connect()),
        sandbox: Arc::new(local_sandbox(config)),
        store,
    })
}

/// Sandbox whose install step succeeds and whose start step serves on [`DEMO_PORT`].
pub fn local_sandbox(config: &WorkspaceConfig) -> MockSandbox {
    let sandbox = MockSandbox::new();
    sandbox.script(
        &config.commands.install.to_string(),
        ProcessScript::exits(["up to date, audited 1 package"], 0),
    );
    sandbox.script(
        &config.commands.start.to_string(),
        ProcessScript::serves([format!("server listening on port {DEMO_PORT}")], DEMO_PORT),
    );
    sandbox
}

pub fn demo_store(project_id: &str, user: &UserRef) -> MockProjectStore {
    let file_tree: FileTree = [
        (
            "package.json".to_string(),
            FileNode::new(r#"{ "name": "demo", "scripts": { "start": "node index.js" } }"#),
        ),
        (
            "index.js".to_string(),
            FileNode::new("require('http').createServer((_, res) => res.end('ok')).listen(3000);\n"),
        ),
    ]
    .into_iter()
    .collect();

    let store = MockProjectStore::new();
    store.insert_project(ProjectRecord {
        id: project_id.to_string(),
        name: "demo".to_string(),
        users: vec![ProjectMember::User(user.clone())],
        file_tree,
    });
    store.set_users(vec![user.clone()]);
    store
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
