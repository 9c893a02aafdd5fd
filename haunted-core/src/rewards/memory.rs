use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::RewardLedger;
use crate::error::HauntedResult;
use crate::models::{RewardBalance, RewardTransaction};

#[derive(Default)]
pub struct MemoryRewardLedger {
    transactions: Mutex<Vec<RewardTransaction>>,
}

impl MemoryRewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transactions(&self, user_id: &str) -> Vec<RewardTransaction> {
        self.transactions
            .lock()
            .await
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RewardLedger for MemoryRewardLedger {
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        tx_ref: Option<String>,
    ) -> HauntedResult<Uuid> {
        let tx = RewardTransaction::new(user_id, amount, reason, tx_ref);
        let id = tx.id;
        self.transactions.lock().await.push(tx);
        Ok(id)
    }

    async fn balance(&self, user_id: &str) -> HauntedResult<RewardBalance> {
        let transactions = self.transactions.lock().await;
        let mut balance = RewardBalance {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        for tx in transactions.iter().filter(|tx| tx.user_id == user_id) {
            balance.balance += tx.amount;
            balance.transaction_count += 1;
        }
        Ok(balance)
    }
}
