use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::stage::{Stage, StageResult};
use super::Asset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "room_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Idle,
    Running,
    Done,
    Error,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Idle => write!(f, "idle"),
            RoomStatus::Running => write!(f, "running"),
            RoomStatus::Done => write!(f, "done"),
            RoomStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "failure_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An agent kept failing with retryable errors until attempts ran out.
    Transient,
    /// An agent rejected the request or answered with garbage.
    Permanent,
    Cancelled,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFailure {
    pub kind: FailureKind,
    pub stage: Option<Stage>,
    pub message: String,
}

impl RoomFailure {
    pub fn new(kind: FailureKind, stage: Option<Stage>, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn cancelled(stage: Option<Stage>) -> Self {
        Self::new(FailureKind::Cancelled, stage, "Cancelled")
    }
}

/// Position of a room in the workflow state machine.
///
/// ```text
/// Idle --start--> Running(story) --> Running(asset) --> Running(code) --> Running(deploy) --> Done
///                       \________________\__________________\__________________\--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", content = "stage", rename_all = "snake_case")]
pub enum RoomPhase {
    Idle,
    Running(Stage),
    Done,
    Failed,
}

impl RoomPhase {
    pub fn status(&self) -> RoomStatus {
        match self {
            RoomPhase::Idle => RoomStatus::Idle,
            RoomPhase::Running(_) => RoomStatus::Running,
            RoomPhase::Done => RoomStatus::Done,
            RoomPhase::Failed => RoomStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomPhase::Done | RoomPhase::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RoomPhase::Running(_))
    }

    pub fn running_stage(&self) -> Option<Stage> {
        match self {
            RoomPhase::Running(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Legal edges of the state machine. Terminal phases have no outgoing edges
    /// and a running room only ever moves forward through the pipeline.
    pub fn can_transition_to(&self, next: &RoomPhase) -> bool {
        match (self, next) {
            (RoomPhase::Idle, RoomPhase::Running(_)) => true,
            (RoomPhase::Running(from), RoomPhase::Running(to)) => to.ordinal() > from.ordinal(),
            (RoomPhase::Running(_), RoomPhase::Done | RoomPhase::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomPhase::Idle => write!(f, "idle"),
            RoomPhase::Running(stage) => write!(f, "running_{}", stage),
            RoomPhase::Done => write!(f, "done"),
            RoomPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Room {
    pub id: Uuid,
    pub owner_id: String,
    pub input_text: String,
    pub status: RoomStatus,
    pub stage: Option<Stage>,
    pub failure_kind: Option<FailureKind>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(owner_id: impl Into<String>, input_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            input_text: input_text.into(),
            status: RoomStatus::Idle,
            stage: None,
            failure_kind: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        match (self.status, self.stage) {
            (RoomStatus::Idle, _) => RoomPhase::Idle,
            (RoomStatus::Running, Some(stage)) => RoomPhase::Running(stage),
            // stores never persist a running room without a stage
            (RoomStatus::Running, None) => RoomPhase::Idle,
            (RoomStatus::Done, _) => RoomPhase::Done,
            (RoomStatus::Error, _) => RoomPhase::Failed,
        }
    }

    /// Moves the room to `next`. A room keeps the stage it reached when it
    /// finishes or fails so callers can see how far the pipeline got.
    pub fn enter(&mut self, next: RoomPhase, failure: Option<&RoomFailure>) {
        self.status = next.status();
        match next {
            RoomPhase::Idle => self.stage = None,
            RoomPhase::Running(stage) => self.stage = Some(stage),
            RoomPhase::Done | RoomPhase::Failed => {}
        }
        if let Some(failure) = failure {
            self.failure_kind = Some(failure.kind);
            self.error_message = Some(failure.message.clone());
        }
        self.updated_at = Utc::now();
    }

    pub fn failure(&self) -> Option<RoomFailure> {
        self.failure_kind.map(|kind| RoomFailure {
            kind,
            stage: self.stage,
            message: self.error_message.clone().unwrap_or_default(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure_kind == Some(FailureKind::Cancelled)
    }
}

/// A room together with everything it has produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: Room,
    pub phase: RoomPhase,
    pub results: Vec<StageResult>,
    pub assets: Vec<Asset>,
}
