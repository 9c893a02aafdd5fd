use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{ensure_transition, RoomStateStore, StageUpdate};
use crate::error::{HauntedError, HauntedResult};
use crate::models::{Asset, Room, RoomPhase, Stage, StageResult};

struct RoomRecord {
    room: Room,
    /// Insertion order, breaks ties between rooms created in the same instant.
    order: u64,
    results: BTreeMap<Stage, StageResult>,
    assets: Vec<Asset>,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<Uuid, Arc<Mutex<RoomRecord>>>,
    next_order: u64,
}

/// Process-local store used by tests, `haunted run` and `serve --in-memory`.
///
/// The outer lock is only written on `create`; every other mutation locks the
/// one room it touches.
#[derive(Default)]
pub struct MemoryRoomStore {
    inner: RwLock<Inner>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    async fn record(&self, room_id: Uuid) -> HauntedResult<Arc<Mutex<RoomRecord>>> {
        self.inner
            .read()
            .await
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(HauntedError::RoomNotFound(room_id))
    }
}

#[async_trait]
impl RoomStateStore for MemoryRoomStore {
    async fn create(&self, room: Room) -> HauntedResult<Uuid> {
        let mut inner = self.inner.write().await;
        if inner.rooms.contains_key(&room.id) {
            return Err(HauntedError::InvalidInput(format!(
                "room {} already exists",
                room.id
            )));
        }

        let id = room.id;
        let order = inner.next_order;
        inner.next_order += 1;
        inner.rooms.insert(
            id,
            Arc::new(Mutex::new(RoomRecord {
                room,
                order,
                results: BTreeMap::new(),
                assets: Vec::new(),
            })),
        );
        Ok(id)
    }

    async fn get(&self, room_id: Uuid) -> HauntedResult<Room> {
        let record = self.record(room_id).await?;
        let record = record.lock().await;
        Ok(record.room.clone())
    }

    async fn compare_and_set_stage(
        &self,
        room_id: Uuid,
        expected: RoomPhase,
        next: RoomPhase,
        update: StageUpdate,
    ) -> HauntedResult<bool> {
        ensure_transition(expected, next)?;

        let record = self.record(room_id).await?;
        let mut record = record.lock().await;

        let current = record.room.phase();
        if current != expected {
            debug!(
                room_id = %room_id,
                expected = %expected,
                current = %current,
                "Compare-and-set lost"
            );
            return Ok(false);
        }

        record.room.enter(next, update.failure.as_ref());
        if let Some(result) = update.result {
            record.results.insert(result.stage, result);
        }
        Ok(true)
    }

    async fn list_by_owner(&self, owner_id: &str) -> HauntedResult<Vec<Room>> {
        let records: Vec<Arc<Mutex<RoomRecord>>> =
            self.inner.read().await.rooms.values().cloned().collect();

        let mut owned = Vec::new();
        for record in records {
            let record = record.lock().await;
            if record.room.owner_id == owner_id {
                owned.push((record.order, record.room.clone()));
            }
        }

        owned.sort_by(|(a_order, a), (b_order, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then(b_order.cmp(a_order))
        });
        Ok(owned.into_iter().map(|(_, room)| room).collect())
    }

    async fn list_results(&self, room_id: Uuid) -> HauntedResult<Vec<StageResult>> {
        let record = self.record(room_id).await?;
        let record = record.lock().await;
        Ok(record.results.values().cloned().collect())
    }

    async fn record_asset(&self, asset: Asset) -> HauntedResult<()> {
        let record = self.record(asset.room_id).await?;
        record.lock().await.assets.push(asset);
        Ok(())
    }

    async fn list_assets(&self, room_id: Uuid) -> HauntedResult<Vec<Asset>> {
        let record = self.record(room_id).await?;
        let record = record.lock().await;
        Ok(record.assets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, RoomFailure, RoomStatus, StageOutput};
    use std::time::Duration;

    fn story_result(room_id: Uuid) -> StageResult {
        StageResult::success(
            room_id,
            StageOutput::Story {
                text: "The keeper never came back".to_string(),
                content_id: None,
            },
            1,
            5,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryRoomStore::new();
        let room = Room::new("0xabc", "A haunted lighthouse");
        let id = store.create(room).await.unwrap();

        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.input_text, "A haunted lighthouse");
        assert_eq!(fetched.status, RoomStatus::Idle);
        assert_eq!(store.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_room() {
        let store = MemoryRoomStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cas_advances_and_records_result() {
        let store = MemoryRoomStore::new();
        let id = store.create(Room::new("0xabc", "prompt")).await.unwrap();

        assert!(store
            .compare_and_set_stage(
                id,
                RoomPhase::Idle,
                RoomPhase::Running(Stage::Story),
                StageUpdate::none()
            )
            .await
            .unwrap());
        assert!(store
            .compare_and_set_stage(
                id,
                RoomPhase::Running(Stage::Story),
                RoomPhase::Running(Stage::Asset),
                StageUpdate::with_result(story_result(id))
            )
            .await
            .unwrap());

        let room = store.get(id).await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Running(Stage::Asset));
        let results = store.list_results(id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].stage, Stage::Story);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_expectation() {
        let store = MemoryRoomStore::new();
        let id = store.create(Room::new("0xabc", "prompt")).await.unwrap();
        store
            .compare_and_set_stage(
                id,
                RoomPhase::Idle,
                RoomPhase::Running(Stage::Story),
                StageUpdate::none(),
            )
            .await
            .unwrap();

        let swapped = store
            .compare_and_set_stage(
                id,
                RoomPhase::Idle,
                RoomPhase::Running(Stage::Story),
                StageUpdate::none(),
            )
            .await
            .unwrap();
        assert!(!swapped);
    }

    #[tokio::test]
    async fn test_cas_rejects_illegal_edge() {
        let store = MemoryRoomStore::new();
        let id = store.create(Room::new("0xabc", "prompt")).await.unwrap();

        let err = store
            .compare_and_set_stage(id, RoomPhase::Idle, RoomPhase::Done, StageUpdate::none())
            .await
            .unwrap_err();
        assert!(err.is_state_error());
    }

    #[tokio::test]
    async fn test_terminal_room_is_immutable() {
        let store = MemoryRoomStore::new();
        let id = store.create(Room::new("0xabc", "prompt")).await.unwrap();
        store
            .compare_and_set_stage(
                id,
                RoomPhase::Idle,
                RoomPhase::Running(Stage::Story),
                StageUpdate::none(),
            )
            .await
            .unwrap();
        store
            .compare_and_set_stage(
                id,
                RoomPhase::Running(Stage::Story),
                RoomPhase::Failed,
                StageUpdate::failed(None, RoomFailure::cancelled(Some(Stage::Story))),
            )
            .await
            .unwrap();

        // A late story result arrives after cancellation.
        let swapped = store
            .compare_and_set_stage(
                id,
                RoomPhase::Running(Stage::Story),
                RoomPhase::Running(Stage::Asset),
                StageUpdate::with_result(story_result(id)),
            )
            .await
            .unwrap();

        assert!(!swapped);
        let room = store.get(id).await.unwrap();
        assert_eq!(room.failure_kind, Some(FailureKind::Cancelled));
        assert!(store.list_results(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_start_single_winner() {
        let store = Arc::new(MemoryRoomStore::new());
        let id = store.create(Room::new("0xabc", "prompt")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_set_stage(
                        id,
                        RoomPhase::Idle,
                        RoomPhase::Running(Stage::Story),
                        StageUpdate::none(),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first() {
        let store = MemoryRoomStore::new();
        let first = store.create(Room::new("0xabc", "first")).await.unwrap();
        let second = store.create(Room::new("0xabc", "second")).await.unwrap();
        store.create(Room::new("0xdef", "other")).await.unwrap();

        let rooms = store.list_by_owner("0xabc").await.unwrap();
        let ids: Vec<Uuid> = rooms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn test_assets() {
        let store = MemoryRoomStore::new();
        let id = store.create(Room::new("0xabc", "prompt")).await.unwrap();
        store
            .record_asset(Asset::new(
                id,
                Stage::Story,
                "bafytest".to_string(),
                42,
                "text/plain",
            ))
            .await
            .unwrap();

        let assets = store.list_assets(id).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].size_bytes, 42);

        let err = store
            .record_asset(Asset::new(
                Uuid::new_v4(),
                Stage::Story,
                "bafytest".to_string(),
                1,
                "text/plain",
            ))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_busy_room_does_not_block_other_rooms() {
        let store = MemoryRoomStore::new();
        let busy = store.create(Room::new("0xabc", "busy")).await.unwrap();
        let other = store.create(Room::new("0xdef", "other")).await.unwrap();

        let busy_record = store.record(busy).await.unwrap();
        let _held = busy_record.lock().await;

        let swapped = tokio::time::timeout(
            Duration::from_secs(1),
            store.compare_and_set_stage(
                other,
                RoomPhase::Idle,
                RoomPhase::Running(Stage::Story),
                StageUpdate::none(),
            ),
        )
        .await
        .expect("another room's lock must not block this room")
        .unwrap();
        assert!(swapped);

        tokio::time::timeout(
            Duration::from_secs(1),
            store.record_asset(Asset::new(
                other,
                Stage::Story,
                "bafytest".to_string(),
                7,
                "text/plain",
            )),
        )
        .await
        .expect("another room's lock must not block this room")
        .unwrap();
        assert_eq!(store.room_count().await, 2);
    }
}
