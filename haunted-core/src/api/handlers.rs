use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

use super::{ApiResult, AppState};
use crate::models::{RewardBalance, Room, RoomSnapshot};

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub owner_id: String,
    pub input: String,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let room = state
        .orchestrator
        .create_room(&body.owner_id, &body.input)
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RoomSnapshot>> {
    Ok(Json(state.orchestrator.snapshot(id).await?))
}

/// Accepts the start and returns immediately; the room keeps running in the background.
pub async fn start_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.orchestrator.start(id).await?;
    debug!(room_id = %handle.room_id(), "Room start accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "room_id": id, "status": "running" })),
    ))
}

pub async fn cancel_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.orchestrator.cancel(id).await?))
}

pub async fn room_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let subscription = state.orchestrator.subscribe_logs(id).await?;

    let stream = subscription.into_stream().map(|event| {
        SseEvent::default()
            .id(event.seq.to_string())
            .json_data(&event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<Vec<Room>>> {
    Ok(Json(state.orchestrator.list_rooms(&owner_id).await?))
}

pub async fn balance(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<RewardBalance>> {
    let balance = match &state.ledger {
        Some(ledger) => ledger.balance(&owner_id).await?,
        None => RewardBalance {
            user_id: owner_id,
            ..Default::default()
        },
    };
    Ok(Json(balance))
}
