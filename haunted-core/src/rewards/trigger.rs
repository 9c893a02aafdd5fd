use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::RewardLedger;
use crate::config::{RewardAmounts, RewardsConfig};
use crate::models::Stage;

/// Fire-and-forget reward crediting.
///
/// Every notification becomes its own tracked task. Ledger failures are logged
/// and dropped, so a broken ledger can never change a room's outcome.
#[derive(Clone)]
pub struct RewardTrigger {
    ledger: Option<Arc<dyn RewardLedger>>,
    amounts: RewardAmounts,
    completion_bonus: i64,
    tasks: TaskTracker,
}

impl RewardTrigger {
    pub fn new(ledger: Arc<dyn RewardLedger>, config: &RewardsConfig) -> Self {
        Self {
            ledger: config.enabled.then_some(ledger),
            amounts: config.amounts.clone(),
            completion_bonus: config.completion_bonus,
            tasks: TaskTracker::new(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            ledger: None,
            amounts: RewardAmounts::default(),
            completion_bonus: 0,
            tasks: TaskTracker::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ledger.is_some()
    }

    pub fn notify_stage_complete(&self, room_id: Uuid, user_id: &str, stage: Stage) {
        let amount = self.amounts.for_stage(stage);
        self.spawn_credit(
            room_id,
            user_id,
            amount,
            format!("stage:{}", stage),
            format!("{}:{}", room_id, stage),
        );
    }

    pub fn notify_room_complete(&self, room_id: Uuid, user_id: &str) {
        self.spawn_credit(
            room_id,
            user_id,
            self.completion_bonus,
            "room:complete".to_string(),
            format!("{}:complete", room_id),
        );
    }

    /// Waits for every credit spawned so far to finish.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    fn spawn_credit(
        &self,
        room_id: Uuid,
        user_id: &str,
        amount: i64,
        reason: String,
        tx_ref: String,
    ) {
        let Some(ledger) = self.ledger.clone() else {
            return;
        };
        if amount == 0 {
            return;
        }

        let user_id = user_id.to_string();
        self.tasks.spawn(async move {
            match ledger
                .credit(&user_id, amount, &reason, Some(tx_ref))
                .await
            {
                Ok(tx_id) => info!(
                    room_id = %room_id,
                    user_id = %user_id,
                    amount,
                    reason = %reason,
                    tx_id = %tx_id,
                    "Reward credited"
                ),
                Err(e) => warn!(
                    room_id = %room_id,
                    user_id = %user_id,
                    amount,
                    reason = %reason,
                    error_code = e.error_code(),
                    "Reward issuance failed, dropping: {}",
                    e
                ),
            }
        });
        debug!(room_id = %room_id, pending = self.tasks.len(), "Reward task spawned");
    }
}
