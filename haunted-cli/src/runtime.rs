use anyhow::Result;
use haunted_core::agents::AgentRegistry;
use haunted_core::config::HauntedConfig;
use haunted_core::db::{init_database, Database};
use haunted_core::logstream::LogStream;
use haunted_core::repo::{PgRewardLedger, PgRoomStore};
use haunted_core::rewards::{HttpRewardLedger, MemoryRewardLedger, RewardLedger, RewardTrigger};
use haunted_core::storage::{ContentUploader, HttpContentUploader, MemoryUploader};
use haunted_core::store::{MemoryRoomStore, RoomStateStore};
use haunted_core::workflow::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const REWARD_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Everything a running orchestrator needs, wired from configuration.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub ledger: Arc<dyn RewardLedger>,
    pub shutdown: CancellationToken,
    database: Option<Database>,
    sweeper: JoinHandle<()>,
}

impl Runtime {
    pub async fn build(config: &HauntedConfig, in_memory: bool) -> Result<Self> {
        let database = if in_memory {
            None
        } else {
            Some(init_database(&config.database).await?)
        };

        let store: Arc<dyn RoomStateStore> = match &database {
            Some(db) => Arc::new(PgRoomStore::new(db.pool().clone())),
            None => Arc::new(MemoryRoomStore::new()),
        };

        let ledger: Arc<dyn RewardLedger> = if !config.rewards.url.is_empty() {
            Arc::new(HttpRewardLedger::new(&config.rewards.url, REWARD_TIMEOUT)?)
        } else if let Some(db) = &database {
            Arc::new(PgRewardLedger::new(db.pool().clone()))
        } else {
            Arc::new(MemoryRewardLedger::new())
        };

        let uploader: Arc<dyn ContentUploader> = if config.storage.url.is_empty() {
            Arc::new(MemoryUploader::new())
        } else {
            Arc::new(HttpContentUploader::new(&config.storage)?)
        };

        let logs = LogStream::new(&config.log_stream);
        let orchestrator = Orchestrator::builder(store, AgentRegistry::from_config(&config.agents)?)
            .log_stream(logs.clone())
            .uploader(uploader)
            .rewards(RewardTrigger::new(ledger.clone(), &config.rewards))
            .retry_policy(config.retry_policy())
            .build();

        let shutdown = CancellationToken::new();
        let sweeper = logs.spawn_sweeper(
            Duration::from_secs(config.log_stream.sweep_interval_secs),
            shutdown.clone(),
        );

        info!(
            store = if database.is_some() { "postgres" } else { "memory" },
            rewards = config.rewards.enabled,
            "Orchestrator ready"
        );

        Ok(Self {
            orchestrator,
            ledger,
            shutdown,
            database,
            sweeper,
        })
    }

    /// Stops the sweeper, waits a bounded time for running rooms and reward
    /// credits, then closes the database pool.
    pub async fn close(self) {
        self.shutdown.cancel();
        let _ = self.sweeper.await;

        if tokio::time::timeout(SHUTDOWN_GRACE, self.orchestrator.settle())
            .await
            .is_err()
        {
            warn!("Rooms still running at shutdown");
        }

        if let Some(db) = self.database {
            db.close().await;
        }
    }
}
