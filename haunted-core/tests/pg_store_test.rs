//! Runs against a real PostgreSQL database when `HAUNTED_TEST_DATABASE_URL`
//! is set and is skipped otherwise.

use haunted_core::config::DatabaseConfig;
use haunted_core::db::init_database;
use haunted_core::models::{
    Asset, FailureKind, Room, RoomFailure, RoomPhase, Stage, StageOutput, StageResult,
};
use haunted_core::repo::{PgRewardLedger, PgRoomStore};
use haunted_core::rewards::RewardLedger;
use haunted_core::store::{RoomStateStore, StageUpdate};
use uuid::Uuid;

async fn pool() -> Option<sqlx::PgPool> {
    let url = std::env::var("HAUNTED_TEST_DATABASE_URL").ok()?;
    let config = DatabaseConfig {
        url,
        ..Default::default()
    };
    let db = init_database(&config).await.unwrap();
    Some(db.pool().clone())
}

fn story_output() -> StageOutput {
    StageOutput::Story {
        text: "The keeper vanished.".to_string(),
        content_id: None,
    }
}

#[tokio::test]
async fn test_pg_room_lifecycle() {
    let Some(pool) = pool().await else {
        return;
    };
    let store = PgRoomStore::new(pool);
    let owner = format!("0x{}", Uuid::new_v4().simple());

    let room = Room::new(&owner, "A haunted lighthouse");
    let id = store.create(room).await.unwrap();
    assert_eq!(store.get(id).await.unwrap().phase(), RoomPhase::Idle);

    assert!(store
        .compare_and_set_stage(id, RoomPhase::Idle, RoomPhase::Running(Stage::Story), StageUpdate::none())
        .await
        .unwrap());
    assert!(!store
        .compare_and_set_stage(id, RoomPhase::Idle, RoomPhase::Running(Stage::Story), StageUpdate::none())
        .await
        .unwrap());

    let result = StageResult::success(id, story_output(), 1, 40);
    assert!(store
        .compare_and_set_stage(
            id,
            RoomPhase::Running(Stage::Story),
            RoomPhase::Running(Stage::Asset),
            StageUpdate::with_result(result),
        )
        .await
        .unwrap());

    let failure = RoomFailure::new(FailureKind::Permanent, Some(Stage::Asset), "HTTP 400");
    let failed = StageResult::failure(id, Stage::Asset, "HTTP 400", 1, 10);
    assert!(store
        .compare_and_set_stage(
            id,
            RoomPhase::Running(Stage::Asset),
            RoomPhase::Failed,
            StageUpdate::failed(Some(failed), failure),
        )
        .await
        .unwrap());

    let room = store.get(id).await.unwrap();
    assert_eq!(room.phase(), RoomPhase::Failed);
    assert_eq!(room.failure().unwrap().kind, FailureKind::Permanent);
    assert_eq!(room.stage, Some(Stage::Asset));

    let results = store.list_results(id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].output, Some(story_output()));
    assert!(!results[1].success);

    let rooms = store.list_by_owner(&owner).await.unwrap();
    assert_eq!(rooms.len(), 1);
}

#[tokio::test]
async fn test_pg_rejects_unknown_room() {
    let Some(pool) = pool().await else {
        return;
    };
    let store = PgRoomStore::new(pool);
    let missing = Uuid::new_v4();

    assert!(store.get(missing).await.unwrap_err().is_not_found());
    let err = store
        .record_asset(Asset::new(
            missing,
            Stage::Story,
            "bafkreiabc".to_string(),
            3,
            "text/plain",
        ))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_pg_reward_ledger() {
    let Some(pool) = pool().await else {
        return;
    };
    let ledger = PgRewardLedger::new(pool);
    let user = format!("0x{}", Uuid::new_v4().simple());

    ledger.credit(&user, 10, "stage:story", Some("r:story".to_string())).await.unwrap();
    ledger.credit(&user, 15, "stage:asset", None).await.unwrap();

    let balance = ledger.balance(&user).await.unwrap();
    assert_eq!(balance.balance, 25);
    assert_eq!(balance.transaction_count, 2);
}
