use std::sync::Arc;
use std::time::Duration;

use collab_workspace::workspace_protocol::{
    FileNode, FileTree, ProjectMember, ProjectRecord, UserRef,
};
use collab_workspace::{
    Backends, EntryAuthor, GatewayStatus, RejoinPolicy, SandboxState, SessionContext, SyncState,
    UserCommand, Workspace, WorkspaceConfig, WorkspaceRuntime,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;
use workspace_mock::{
    ChannelCall, MockChannelHub, MockProjectStore, MockSandbox, ProcessScript, SandboxCall,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Fixture {
    hub: MockChannelHub,
    store: MockProjectStore,
}

impl Fixture {
    fn new() -> Self {
        let store = MockProjectStore::new();
        store.insert_project(ProjectRecord {
            id: "p1".to_string(),
            name: "demo".to_string(),
            users: vec![
                ProjectMember::Id("u1".to_string()),
                ProjectMember::Id("u2".to_string()),
            ],
            file_tree: [("index.js".to_string(), FileNode::new("listen(3000)"))]
                .into_iter()
                .collect::<FileTree>(),
        });
        store.set_users(vec![
            UserRef::new("u1", "alice@example.com"),
            UserRef::new("u2", "bob@example.com"),
        ]);

        Self {
            hub: MockChannelHub::new(),
            store,
        }
    }

    fn runtime(&self, user: UserRef, sandbox: &MockSandbox, config: WorkspaceConfig) -> WorkspaceRuntime {
        let workspace = Workspace::new(SessionContext::new("p1", user), &config);
        WorkspaceRuntime::new(
            workspace,
            Backends {
                channel: Arc::new(self.hub.connect()),
                sandbox: Arc::new(sandbox.clone()),
                store: Arc::new(self.store.clone()),
            },
        )
    }
}

async fn step_until(runtime: &mut WorkspaceRuntime, done: impl Fn(&Workspace) -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !done(runtime.workspace()) {
            let _ = runtime.step().await;
        }
    })
    .await
    .expect("condition should be reached before the timeout");
}

fn ready_to_collaborate(workspace: &Workspace) -> bool {
    workspace.gateway().status() == GatewayStatus::Joined && workspace.project().is_some()
}

#[tokio::test]
async fn messages_reach_peers_and_echo_locally_once() {
    let fixture = Fixture::new();
    let sandbox = MockSandbox::new();
    let mut alice = fixture.runtime(UserRef::new("u1", "alice@example.com"), &sandbox, WorkspaceConfig::default());
    let mut bob = fixture.runtime(UserRef::new("u2", "bob@example.com"), &sandbox, WorkspaceConfig::default());

    alice.start().expect("alice starts");
    bob.start().expect("bob starts");
    step_until(&mut alice, ready_to_collaborate).await;
    step_until(&mut bob, ready_to_collaborate).await;

    alice.dispatch(UserCommand::SendMessage("hi bob".to_string()));
    step_until(&mut alice, |workspace| workspace.transcript().len() == 1).await;
    step_until(&mut bob, |workspace| workspace.transcript().len() == 1).await;

    let received = bob.workspace().transcript().last().expect("entry");
    assert_eq!(
        received.author,
        EntryAuthor::Peer(UserRef::new("u1", "alice@example.com"))
    );
    assert_eq!(received.display_text(), "hi bob");

    tokio::task::yield_now().await;
    alice.drain_pending();
    assert_eq!(alice.workspace().transcript().len(), 1);
    assert_eq!(
        bob.workspace().members(),
        vec![
            UserRef::new("u1", "alice@example.com"),
            UserRef::new("u2", "bob@example.com"),
        ]
    );
}

#[tokio::test]
async fn assistant_patch_is_merged_and_persisted() {
    let fixture = Fixture::new();
    let sandbox = MockSandbox::new();
    let mut runtime = fixture.runtime(UserRef::new("u1", "alice@example.com"), &sandbox, WorkspaceConfig::default());
    runtime.start().expect("start");
    step_until(&mut runtime, ready_to_collaborate).await;

    let reached = fixture.hub.inject(
        "p1",
        "project-message",
        json!({
            "sender": "assistant",
            "message": r#"{"text":"created file","fileTree":{"a.js":{"file":{"contents":"x=1"}}}}"#
        }),
    );
    assert_eq!(reached, 1);

    step_until(&mut runtime, |workspace| {
        workspace.files().sync_state() == Some(&SyncState::Synced)
    })
    .await;

    assert_eq!(
        runtime.workspace().transcript().last().map(|entry| entry.display_text()),
        Some("created file")
    );
    let stored = fixture.store.project("p1").expect("project");
    let paths: Vec<&str> = stored.file_tree.paths().collect();
    assert_eq!(paths, vec!["index.js", "a.js"]);
}

#[tokio::test]
async fn rerun_kills_previous_server_before_starting_the_next() {
    let fixture = Fixture::new();
    let sandbox = MockSandbox::new();
    sandbox.script("npm install", ProcessScript::exits(["added 1 package"], 0));
    sandbox.script("npm start", ProcessScript::serves(["listening on 3000"], 3000));

    let mut runtime = fixture.runtime(UserRef::new("u1", "alice@example.com"), &sandbox, WorkspaceConfig::default());
    runtime.start().expect("start");
    step_until(&mut runtime, ready_to_collaborate).await;

    runtime.dispatch(UserCommand::Run);
    step_until(&mut runtime, |workspace| {
        workspace.sandbox().state() == SandboxState::Ready
    })
    .await;
    assert_eq!(
        runtime
            .workspace()
            .sandbox()
            .preview_address()
            .map(|url| url.as_str()),
        Some("http://localhost:3000/")
    );
    let first_run = runtime.workspace().sandbox().run_id();

    runtime.dispatch(UserCommand::Run);
    step_until(&mut runtime, |workspace| {
        workspace.sandbox().run_id() > first_run && workspace.sandbox().state() == SandboxState::Ready
    })
    .await;

    let calls = sandbox.calls();
    assert_eq!(
        calls,
        vec![
            SandboxCall::Mount {
                paths: vec!["index.js".to_string()]
            },
            SandboxCall::Spawn {
                command: "npm install".to_string(),
                process_id: 1
            },
            SandboxCall::Spawn {
                command: "npm start".to_string(),
                process_id: 2
            },
            SandboxCall::Kill { process_id: 2 },
            SandboxCall::Mount {
                paths: vec!["index.js".to_string()]
            },
            SandboxCall::Spawn {
                command: "npm install".to_string(),
                process_id: 3
            },
            SandboxCall::Spawn {
                command: "npm start".to_string(),
                process_id: 4
            },
        ]
    );
    assert_eq!(runtime.workspace().sandbox().live_process(), Some(4));
}

#[tokio::test]
async fn initial_join_failure_stops_the_runtime() {
    let fixture = Fixture::new();
    fixture.hub.fail_next_joins(1);
    let sandbox = MockSandbox::new();
    let mut runtime = fixture.runtime(UserRef::new("u1", "alice@example.com"), &sandbox, WorkspaceConfig::default());
    runtime.start().expect("start");

    let result = timeout(TEST_TIMEOUT, runtime.run_until_deactivated())
        .await
        .expect("runtime should stop before the timeout");

    assert!(result.is_err_and(|error| error.is_blocking()));
}

#[tokio::test]
async fn dropped_subscription_is_rejoined() {
    let fixture = Fixture::new();
    let sandbox = MockSandbox::new();
    let config = WorkspaceConfig {
        rejoin: RejoinPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        ..WorkspaceConfig::default()
    };
    let mut runtime = fixture.runtime(UserRef::new("u1", "alice@example.com"), &sandbox, config);
    runtime.start().expect("start");
    step_until(&mut runtime, ready_to_collaborate).await;

    fixture.hub.drop_subscriptions("p1");
    step_until(&mut runtime, |workspace| {
        workspace.gateway().epoch() == 2 && workspace.gateway().status() == GatewayStatus::Joined
    })
    .await;

    fixture.hub.inject(
        "p1",
        "project-message",
        json!({ "sender": { "_id": "u2", "email": "bob@example.com" }, "message": "back" }),
    );
    step_until(&mut runtime, |workspace| workspace.transcript().len() == 1).await;

    let joins = fixture
        .hub
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ChannelCall::Join { .. }))
        .count();
    assert_eq!(joins, 2);
}

#[tokio::test]
async fn deactivate_releases_channel_and_sandbox() {
    let fixture = Fixture::new();
    let sandbox = MockSandbox::new();
    let mut runtime = fixture.runtime(UserRef::new("u1", "alice@example.com"), &sandbox, WorkspaceConfig::default());
    runtime.start().expect("start");
    step_until(&mut runtime, ready_to_collaborate).await;

    runtime.handle().dispatch(UserCommand::Deactivate);
    timeout(TEST_TIMEOUT, runtime.run_until_deactivated())
        .await
        .expect("runtime should stop before the timeout")
        .expect("clean shutdown");

    assert!(fixture
        .hub
        .calls()
        .iter()
        .any(|call| matches!(call, ChannelCall::Leave { .. })));
    assert_eq!(sandbox.calls().last(), Some(&SandboxCall::Teardown));
    timeout(TEST_TIMEOUT, async {
        while fixture.hub.subscriber_count("p1") > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscription should be released");
}
