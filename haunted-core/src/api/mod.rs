//! HTTP surface for rooms, their Log Events and reward balances.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};

use crate::error::{HauntedError, HauntedResult};
use crate::rewards::RewardLedger;
use crate::workflow::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
    ledger: Option<Arc<dyn RewardLedger>>,
    cors_permissive: bool,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            ledger: None,
            cors_permissive: true,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RewardLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/rooms", post(handlers::create_room))
        .route("/api/rooms/{id}", get(handlers::get_room))
        .route("/api/rooms/{id}/start", post(handlers::start_room))
        .route("/api/rooms/{id}/cancel", post(handlers::cancel_room))
        .route("/api/rooms/{id}/logs", get(handlers::room_logs))
        .route("/api/users/{owner_id}/rooms", get(handlers::list_rooms))
        .route("/api/users/{owner_id}/balance", get(handlers::balance))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        );

    if state.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

/// Serves the API on `addr` until `shutdown` is cancelled.
pub async fn serve(state: AppState, addr: SocketAddr, shutdown: CancellationToken) -> HauntedResult<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| HauntedError::Internal(format!("HTTP server failed: {}", e)))
}
