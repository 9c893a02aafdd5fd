use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of the content pipeline, each served by its own agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "room_stage", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Story,
    Asset,
    Code,
    Deploy,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Story, Stage::Asset, Stage::Code, Stage::Deploy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Story => "story",
            Stage::Asset => "asset",
            Stage::Code => "code",
            Stage::Deploy => "deploy",
        }
    }

    /// Position of the stage in the pipeline, used to reject backwards transitions.
    pub fn ordinal(&self) -> u8 {
        match self {
            Stage::Story => 0,
            Stage::Asset => 1,
            Stage::Code => 2,
            Stage::Deploy => 3,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "story" => Ok(Stage::Story),
            "asset" | "image" => Ok(Stage::Asset),
            "code" => Ok(Stage::Code),
            "deploy" => Ok(Stage::Deploy),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Typed payload handed to a stage's agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageInput {
    Story { prompt: String },
    Asset { story: String },
    Code { story: String, image_url: String },
    Deploy { code: String },
}

impl StageInput {
    pub fn stage(&self) -> Stage {
        match self {
            StageInput::Story { .. } => Stage::Story,
            StageInput::Asset { .. } => Stage::Asset,
            StageInput::Code { .. } => Stage::Code,
            StageInput::Deploy { .. } => Stage::Deploy,
        }
    }
}

/// Typed payload returned by a stage's agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Story {
        text: String,
        content_id: Option<String>,
    },
    Asset {
        image_url: String,
        content_id: Option<String>,
    },
    Code {
        code: String,
        content_id: Option<String>,
        tested: bool,
    },
    Deploy {
        deployed_url: String,
        status: String,
        #[serde(default)]
        content_id: Option<String>,
    },
}

/// The bytes that get pinned to content-addressed storage for an output.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: &'static str,
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Story { .. } => Stage::Story,
            StageOutput::Asset { .. } => Stage::Asset,
            StageOutput::Code { .. } => Stage::Code,
            StageOutput::Deploy { .. } => Stage::Deploy,
        }
    }

    pub fn content_id(&self) -> Option<&str> {
        match self {
            StageOutput::Story { content_id, .. }
            | StageOutput::Asset { content_id, .. }
            | StageOutput::Code { content_id, .. }
            | StageOutput::Deploy { content_id, .. } => content_id.as_deref(),
        }
    }

    pub fn set_content_id(&mut self, cid: Option<String>) {
        match self {
            StageOutput::Story { content_id, .. }
            | StageOutput::Asset { content_id, .. }
            | StageOutput::Code { content_id, .. }
            | StageOutput::Deploy { content_id, .. } => *content_id = cid,
        }
    }

    pub fn artifact(&self) -> Artifact {
        match self {
            StageOutput::Story { text, .. } => Artifact {
                bytes: text.as_bytes().to_vec(),
                filename: "story.txt".to_string(),
                mime_type: "text/plain",
            },
            StageOutput::Asset { image_url, .. } => Artifact {
                bytes: serde_json::json!({ "image_url": image_url })
                    .to_string()
                    .into_bytes(),
                filename: "image.json".to_string(),
                mime_type: "application/json",
            },
            StageOutput::Code { code, .. } => Artifact {
                bytes: code.as_bytes().to_vec(),
                filename: "game.js".to_string(),
                mime_type: "application/javascript",
            },
            StageOutput::Deploy {
                deployed_url,
                status,
                ..
            } => Artifact {
                bytes: serde_json::json!({ "deployed_url": deployed_url, "status": status })
                    .to_string()
                    .into_bytes(),
                filename: "deployment.json".to_string(),
                mime_type: "application/json",
            },
        }
    }
}

/// Durable record of one stage's outcome for a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub id: Uuid,
    pub room_id: Uuid,
    pub stage: Stage,
    pub success: bool,
    pub output: Option<StageOutput>,
    pub content_id: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl StageResult {
    pub fn success(
        room_id: Uuid,
        output: StageOutput,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            stage: output.stage(),
            success: true,
            content_id: output.content_id().map(str::to_string),
            output: Some(output),
            error: None,
            attempts,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(
        room_id: Uuid,
        stage: Stage,
        error: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            stage,
            success: false,
            output: None,
            content_id: None,
            error: Some(error.into()),
            attempts,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }
}
