//! End-to-end pipeline runs against HTTP agents served by wiremock.

use async_trait::async_trait;
use haunted_core::agents::AgentRegistry;
use haunted_core::config::{AgentEndpointConfig, AgentsConfig};
use haunted_core::models::{FailureKind, LogLevel, RoomPhase, Stage};
use haunted_core::store::MemoryRoomStore;
use haunted_core::workflow::{Orchestrator, Sleeper};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

fn agents_config(server: &MockServer) -> AgentsConfig {
    let endpoint = |route: &str| AgentEndpointConfig {
        url: format!("{}/{}", server.uri(), route),
        timeout_secs: 5,
    };
    AgentsConfig {
        story: endpoint("story"),
        asset: endpoint("asset"),
        code: endpoint("code"),
        deploy: endpoint("deploy"),
    }
}

async fn mount_ok(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/{}", route)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_story(server: &MockServer) {
    mount_ok(
        server,
        "story",
        json!({ "text": "The lighthouse keeper never came back down the stairs." }),
    )
    .await;
}

async fn mount_asset(server: &MockServer) {
    mount_ok(
        server,
        "asset",
        json!({ "imageUrl": "https://images.example/lighthouse.png" }),
    )
    .await;
}

async fn mount_code(server: &MockServer) {
    mount_ok(
        server,
        "code",
        json!({ "code": "export const game = () => 'boo';", "tested": true }),
    )
    .await;
}

async fn mount_deploy(server: &MockServer) {
    mount_ok(
        server,
        "deploy",
        json!({ "deployedUrl": "https://lighthouse.example", "status": "live" }),
    )
    .await;
}

async fn calls_to(server: &MockServer, route: &str) -> usize {
    let route = format!("/{}", route);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

fn orchestrator(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> Orchestrator {
    let agents = AgentRegistry::from_config(&agents_config(server)).unwrap();
    Orchestrator::builder(Arc::new(MemoryRoomStore::new()), agents)
        .sleeper(sleeper)
        .build()
}

#[tokio::test]
async fn test_asset_agent_recovers_after_two_unavailable_responses() {
    let server = MockServer::start().await;
    mount_story(&server).await;
    Mock::given(method("POST"))
        .and(path("/asset"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_asset(&server).await;
    mount_code(&server).await;
    mount_deploy(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = orchestrator(&server, sleeper.clone());

    let room = orchestrator
        .create_room("0xghost", "A haunted lighthouse")
        .await
        .unwrap();
    let phase = orchestrator.run(room.id).await.unwrap();

    assert_eq!(phase, RoomPhase::Done);
    assert_eq!(calls_to(&server, "asset").await, 3);
    assert_eq!(
        *sleeper.delays.lock().unwrap(),
        vec![Duration::from_millis(2000), Duration::from_millis(4000)]
    );

    let snapshot = orchestrator.snapshot(room.id).await.unwrap();
    assert_eq!(snapshot.results.len(), 4);
    let asset = snapshot
        .results
        .iter()
        .find(|r| r.stage == Stage::Asset)
        .unwrap();
    assert!(asset.success);
    assert_eq!(asset.attempts, 3);

    let backlog = orchestrator.logs().backlog(room.id).await;
    let warnings = backlog
        .iter()
        .filter(|e| e.level == LogLevel::Warn)
        .count();
    assert_eq!(warnings, 2);
}

#[tokio::test]
async fn test_code_agent_bad_request_fails_room_without_retry() {
    let server = MockServer::start().await;
    mount_story(&server).await;
    mount_asset(&server).await;
    Mock::given(method("POST"))
        .and(path("/code"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "story too spooky" })),
        )
        .mount(&server)
        .await;
    mount_deploy(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = orchestrator(&server, sleeper.clone());

    let room = orchestrator
        .create_room("0xghost", "A haunted lighthouse")
        .await
        .unwrap();
    let phase = orchestrator.run(room.id).await.unwrap();

    assert_eq!(phase, RoomPhase::Failed);
    assert_eq!(calls_to(&server, "code").await, 1);
    assert_eq!(calls_to(&server, "deploy").await, 0);
    assert!(sleeper.delays.lock().unwrap().is_empty());

    let snapshot = orchestrator.snapshot(room.id).await.unwrap();
    assert_eq!(snapshot.results.len(), 3);
    let code = snapshot.results.last().unwrap();
    assert_eq!(code.stage, Stage::Code);
    assert!(!code.success);

    let failure = snapshot.room.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert_eq!(failure.stage, Some(Stage::Code));

    let last = orchestrator.logs().backlog(room.id).await.pop().unwrap();
    assert_eq!(last.level, LogLevel::Error);
}
