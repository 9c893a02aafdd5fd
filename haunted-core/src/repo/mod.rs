pub mod reward_repo;
pub mod room_repo;

pub use reward_repo::PgRewardLedger;
pub use room_repo::PgRoomStore;
