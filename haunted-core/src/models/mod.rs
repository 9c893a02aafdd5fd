mod asset;
mod log_event;
mod reward;
mod room;
mod stage;

pub use asset::Asset;
pub use log_event::{LogEntry, LogEvent, LogLevel};
pub use reward::{RewardBalance, RewardTransaction};
pub use room::{FailureKind, Room, RoomFailure, RoomPhase, RoomSnapshot, RoomStatus};
pub use stage::{Artifact, Stage, StageInput, StageOutput, StageResult};
