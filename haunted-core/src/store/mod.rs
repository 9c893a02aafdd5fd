//! Room State Store: the only shared mutable state across room workflows.
//!
//! [`RoomStateStore::compare_and_set_stage`] is the sole mutation path for a
//! room after creation. It only succeeds when the caller's view of the room's
//! phase is still current, so two writers racing on the same room can never
//! both advance it.

mod memory;

pub use memory::MemoryRoomStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{HauntedError, HauntedResult};
use crate::models::{Asset, Room, RoomFailure, RoomPhase, StageResult};

/// Data written together with a successful phase change.
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    /// Replaces any earlier result for the same stage.
    pub result: Option<StageResult>,
    pub failure: Option<RoomFailure>,
}

impl StageUpdate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_result(result: StageResult) -> Self {
        Self {
            result: Some(result),
            failure: None,
        }
    }

    pub fn failed(result: Option<StageResult>, failure: RoomFailure) -> Self {
        Self {
            result,
            failure: Some(failure),
        }
    }
}

#[async_trait]
pub trait RoomStateStore: Send + Sync {
    async fn create(&self, room: Room) -> HauntedResult<Uuid>;

    /// Fails with `RoomNotFound` for unknown ids.
    async fn get(&self, room_id: Uuid) -> HauntedResult<Room>;

    /// Atomically moves the room from `expected` to `next` and applies `update`.
    ///
    /// Returns `Ok(false)` without writing anything when the room is no longer
    /// in `expected`. Illegal edges fail with `InvalidTransition`.
    async fn compare_and_set_stage(
        &self,
        room_id: Uuid,
        expected: RoomPhase,
        next: RoomPhase,
        update: StageUpdate,
    ) -> HauntedResult<bool>;

    /// Rooms owned by `owner_id`, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> HauntedResult<Vec<Room>>;

    /// Stage results in workflow order.
    async fn list_results(&self, room_id: Uuid) -> HauntedResult<Vec<StageResult>>;

    async fn record_asset(&self, asset: Asset) -> HauntedResult<()>;

    async fn list_assets(&self, room_id: Uuid) -> HauntedResult<Vec<Asset>>;
}

/// Rejects phase changes that are not edges of the room state machine.
pub(crate) fn ensure_transition(expected: RoomPhase, next: RoomPhase) -> HauntedResult<()> {
    if expected.can_transition_to(&next) {
        Ok(())
    } else {
        Err(HauntedError::InvalidTransition {
            from: expected,
            to: next,
        })
    }
}
