mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{harness, harness_with, Agents, Gate, ScriptedAgent};
use haunted_core::api::{router, AppState};
use haunted_core::config::RewardsConfig;
use haunted_core::models::{LogEvent, LogLevel, Room, RoomPhase, RoomSnapshot, Stage};
use haunted_core::rewards::{MemoryRewardLedger, RewardTrigger};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

mod room_routes {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));

        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], haunted_core::VERSION);
    }

    #[tokio::test]
    async fn test_create_and_get_room() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));

        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/rooms",
                json!({ "owner_id": "0xowner", "input": "A haunted lighthouse" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let room: Room = serde_json::from_slice(&body).unwrap();
        assert_eq!(room.owner_id, "0xowner");

        let (status, body) = send(app, get(&format!("/api/rooms/{}", room.id))).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: RoomSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.room.id, room.id);
        assert_eq!(snapshot.phase, RoomPhase::Idle);
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn test_create_room_rejects_empty_input() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));

        let (status, body) = send(
            app,
            post_json("/api/rooms", json!({ "owner_id": "0xowner", "input": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "E3004");
    }

    #[tokio::test]
    async fn test_unknown_room_is_404() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));
        let id = uuid::Uuid::new_v4();

        let (status, body) = send(app.clone(), get(&format!("/api/rooms/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "E3001");

        let (status, _) = send(app, post(&format!("/api/rooms/{}/start", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_returns_accepted_then_conflict() {
        let gate = Arc::new(Gate::default());
        let agents = Agents::new().with(ScriptedAgent::new(Stage::Story).gated(gate.clone()));
        let h = harness(agents);
        let app = router(AppState::new(h.orchestrator.clone()));
        let room = h
            .orchestrator
            .create_room("0xowner", "A haunted lighthouse")
            .await
            .unwrap();

        let (status, body) = send(app.clone(), post(&format!("/api/rooms/{}/start", room.id))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["room_id"], room.id.to_string());
        assert_eq!(body["status"], "running");

        let (status, body) = send(app.clone(), post(&format!("/api/rooms/{}/start", room.id))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "E3002");

        gate.wait_entered().await;
        let (status, body) =
            send(app.clone(), post(&format!("/api/rooms/{}/cancel", room.id))).await;
        assert_eq!(status, StatusCode::OK);
        let cancelled: Room = serde_json::from_slice(&body).unwrap();
        assert!(cancelled.is_cancelled());

        gate.release();
        h.orchestrator.settle().await;

        let (status, _) = send(app, post(&format!("/api/rooms/{}/cancel", room.id))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_list_owner_rooms() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));
        h.orchestrator.create_room("0xowner", "one").await.unwrap();
        h.orchestrator.create_room("0xowner", "two").await.unwrap();

        let (status, body) = send(app, get("/api/users/0xowner/rooms")).await;
        assert_eq!(status, StatusCode::OK);
        let rooms: Vec<Room> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].input_text, "two");
    }
}

mod stream_routes {
    use super::*;

    #[tokio::test]
    async fn test_logs_stream_as_server_sent_events() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));
        let room = h
            .orchestrator
            .create_room("0xowner", "A haunted lighthouse")
            .await
            .unwrap();
        h.orchestrator.run(room.id).await.unwrap();

        let response = app
            .oneshot(get(&format!("/api/rooms/{}/logs", room.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let events: Vec<LogEvent> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect();

        assert_eq!(events.len(), 9);
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[0].level, LogLevel::Info);
        assert!(text
            .lines()
            .filter_map(|line| line.strip_prefix("id:"))
            .any(|id| id.trim() == "9"));
    }

    #[tokio::test]
    async fn test_balance_route() {
        let ledger = Arc::new(MemoryRewardLedger::new());
        let trigger = RewardTrigger::new(ledger.clone(), &RewardsConfig::default());
        let h = harness_with(Agents::new(), |builder| builder.rewards(trigger));
        let app = router(AppState::new(h.orchestrator.clone()).with_ledger(ledger));
        let room = h
            .orchestrator
            .create_room("0xowner", "A haunted lighthouse")
            .await
            .unwrap();
        h.orchestrator.run(room.id).await.unwrap();
        h.orchestrator.settle().await;

        let (status, body) = send(app, get("/api/users/0xowner/balance")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["balance"], 120);
        assert_eq!(body["transaction_count"], 5);
    }

    #[tokio::test]
    async fn test_balance_without_ledger_is_zero() {
        let h = harness(Agents::new());
        let app = router(AppState::new(h.orchestrator.clone()));

        let (status, body) = send(app, get("/api/users/0xnobody/balance")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["balance"], 0);
        assert_eq!(body["user_id"], "0xnobody");
    }
}
