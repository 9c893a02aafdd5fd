use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{HauntedError, HauntedResult};
use crate::models::{Asset, Room, RoomPhase, Stage, StageOutput, StageResult};
use crate::store::{ensure_transition, RoomStateStore, StageUpdate};

const ROOM_COLUMNS: &str =
    "id, owner_id, input_text, status, stage, failure_kind, error_message, created_at, updated_at";

#[derive(Debug, FromRow)]
struct StageResultRow {
    id: Uuid,
    room_id: Uuid,
    stage: Stage,
    success: bool,
    output: Option<Json<StageOutput>>,
    content_id: Option<String>,
    error: Option<String>,
    attempts: i32,
    duration_ms: i64,
    recorded_at: DateTime<Utc>,
}

impl From<StageResultRow> for StageResult {
    fn from(row: StageResultRow) -> Self {
        StageResult {
            id: row.id,
            room_id: row.room_id,
            stage: row.stage,
            success: row.success,
            output: row.output.map(|json| json.0),
            content_id: row.content_id,
            error: row.error,
            attempts: row.attempts.max(0) as u32,
            duration_ms: row.duration_ms.max(0) as u64,
            recorded_at: row.recorded_at,
        }
    }
}

/// PostgreSQL-backed Room State Store.
pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, room_id: Uuid) -> HauntedResult<bool> {
        let found: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM rooms WHERE id = $1)")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found.0)
    }
}

#[async_trait]
impl RoomStateStore for PgRoomStore {
    async fn create(&self, room: Room) -> HauntedResult<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO rooms (id, owner_id, input_text, status, stage, failure_kind, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(room.id)
        .bind(&room.owner_id)
        .bind(&room.input_text)
        .bind(room.status)
        .bind(room.stage)
        .bind(room.failure_kind)
        .bind(&room.error_message)
        .bind(room.created_at)
        .bind(room.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, room_id: Uuid) -> HauntedResult<Room> {
        let query = format!("SELECT {} FROM rooms WHERE id = $1", ROOM_COLUMNS);
        sqlx::query_as::<_, Room>(&query)
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(HauntedError::RoomNotFound(room_id))
    }

    async fn compare_and_set_stage(
        &self,
        room_id: Uuid,
        expected: RoomPhase,
        next: RoomPhase,
        update: StageUpdate,
    ) -> HauntedResult<bool> {
        ensure_transition(expected, next)?;

        let failure_kind = update.failure.as_ref().map(|f| f.kind);
        let error_message = update.failure.as_ref().map(|f| f.message.clone());

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE rooms
            SET status = $1,
                stage = COALESCE($2, stage),
                failure_kind = COALESCE($3, failure_kind),
                error_message = COALESCE($4, error_message),
                updated_at = NOW()
            WHERE id = $5
              AND status = $6
              AND stage IS NOT DISTINCT FROM $7
            "#,
        )
        .bind(next.status())
        .bind(next.running_stage())
        .bind(failure_kind)
        .bind(error_message)
        .bind(room_id)
        .bind(expected.status())
        .bind(expected.running_stage())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            if !self.exists(room_id).await? {
                return Err(HauntedError::RoomNotFound(room_id));
            }
            debug!(room_id = %room_id, expected = %expected, "Compare-and-set lost");
            return Ok(false);
        }

        if let Some(result) = update.result {
            sqlx::query(
                r#"
                INSERT INTO stage_results (id, room_id, stage, success, output, content_id, error, attempts, duration_ms, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (room_id, stage) DO UPDATE
                SET id = EXCLUDED.id,
                    success = EXCLUDED.success,
                    output = EXCLUDED.output,
                    content_id = EXCLUDED.content_id,
                    error = EXCLUDED.error,
                    attempts = EXCLUDED.attempts,
                    duration_ms = EXCLUDED.duration_ms,
                    recorded_at = EXCLUDED.recorded_at
                "#,
            )
            .bind(result.id)
            .bind(result.room_id)
            .bind(result.stage)
            .bind(result.success)
            .bind(result.output.map(Json))
            .bind(result.content_id)
            .bind(result.error)
            .bind(result.attempts as i32)
            .bind(result.duration_ms as i64)
            .bind(result.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_by_owner(&self, owner_id: &str) -> HauntedResult<Vec<Room>> {
        let query = format!(
            "SELECT {} FROM rooms WHERE owner_id = $1 ORDER BY created_at DESC",
            ROOM_COLUMNS
        );
        let rooms = sqlx::query_as::<_, Room>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rooms)
    }

    async fn list_results(&self, room_id: Uuid) -> HauntedResult<Vec<StageResult>> {
        let rows = sqlx::query_as::<_, StageResultRow>(
            r#"
            SELECT id, room_id, stage, success, output, content_id, error, attempts, duration_ms, recorded_at
            FROM stage_results
            WHERE room_id = $1
            ORDER BY stage ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StageResult::from).collect())
    }

    async fn record_asset(&self, asset: Asset) -> HauntedResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, room_id, stage, content_id, size_bytes, mime_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(asset.id)
        .bind(asset.room_id)
        .bind(asset.stage)
        .bind(&asset.content_id)
        .bind(asset.size_bytes)
        .bind(&asset.mime_type)
        .bind(asset.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                HauntedError::RoomNotFound(asset.room_id)
            }
            _ => HauntedError::from(e),
        })?;

        Ok(())
    }

    async fn list_assets(&self, room_id: Uuid) -> HauntedResult<Vec<Asset>> {
        let assets = sqlx::query_as::<_, Asset>(
            r#"
            SELECT id, room_id, stage, content_id, size_bytes, mime_type, created_at
            FROM assets
            WHERE room_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }
}
