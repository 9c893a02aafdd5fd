use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::stage::Stage;

/// Metadata for an artifact pinned to content-addressed storage.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: Uuid,
    pub room_id: Uuid,
    pub stage: Stage,
    pub content_id: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        room_id: Uuid,
        stage: Stage,
        content_id: String,
        size_bytes: i64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            stage,
            content_id,
            size_bytes,
            mime_type: mime_type.into(),
            created_at: Utc::now(),
        }
    }
}
