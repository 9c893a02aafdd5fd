use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One entry in a user's token ledger. Debits carry a negative amount.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardTransaction {
    pub id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    pub tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RewardTransaction {
    pub fn new(
        user_id: impl Into<String>,
        amount: i64,
        reason: impl Into<String>,
        tx_ref: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            amount,
            reason: reason.into(),
            tx_ref,
            created_at: Utc::now(),
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardBalance {
    pub user_id: String,
    pub balance: i64,
    pub transaction_count: i64,
}
