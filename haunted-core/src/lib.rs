#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::derivable_impls,
    clippy::type_complexity
)]

pub mod agents;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logstream;
pub mod models;
pub mod repo;
pub mod rewards;
pub mod storage;
pub mod store;
pub mod workflow;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use agents::{
    classify_status, AgentClient, AgentEndpoint, AgentError, AgentRegistry, AssetAgentClient,
    CodeAgentClient, DeployAgentClient, StoryAgentClient,
};
pub use api::{router, serve, ApiError, AppState};
pub use config::{
    default_config_paths, ensure_config_dir, get_config_dir, AgentEndpointConfig, AgentsConfig,
    ConfigLoadError, DatabaseConfig, HauntedConfig, LogStreamConfig, LoggingConfig, RetryConfig,
    RewardAmounts, RewardsConfig, ServerConfig, StorageConfig,
};
pub use db::{init_database, Database, DatabaseError};
pub use error::{
    retry_async_with_policy, CliErrorDisplay, HauntedError, HauntedResult, RetryPolicy,
};
pub use logstream::{LogStream, LogSubscription};
pub use models::{
    Artifact, Asset, FailureKind, LogEntry, LogEvent, LogLevel, RewardBalance, RewardTransaction,
    Room, RoomFailure, RoomPhase, RoomSnapshot, RoomStatus, Stage, StageInput, StageOutput,
    StageResult,
};
pub use repo::{PgRewardLedger, PgRoomStore};
pub use rewards::{HttpRewardLedger, MemoryRewardLedger, RewardLedger, RewardTrigger};
pub use storage::{
    content_id_for, is_valid_content_id, ContentUploader, HttpContentUploader, MemoryUploader,
};
pub use store::{MemoryRoomStore, RoomStateStore, StageUpdate};
pub use workflow::{
    Orchestrator, OrchestratorBuilder, RunHandle, Sleeper, TokioSleeper, WorkflowDefinition,
    MAX_INPUT_CHARS,
};
