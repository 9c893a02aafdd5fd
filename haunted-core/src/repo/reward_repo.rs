use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::HauntedResult;
use crate::models::{RewardBalance, RewardTransaction};
use crate::rewards::RewardLedger;

/// Ledger kept in the `reward_transactions` table.
pub struct PgRewardLedger {
    pool: PgPool,
}

impl PgRewardLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RewardLedger for PgRewardLedger {
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        tx_ref: Option<String>,
    ) -> HauntedResult<Uuid> {
        let tx = RewardTransaction::new(user_id, amount, reason, tx_ref);

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO reward_transactions (id, user_id, amount, reason, tx_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(tx.id)
        .bind(&tx.user_id)
        .bind(tx.amount)
        .bind(&tx.reason)
        .bind(&tx.tx_ref)
        .bind(tx.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn balance(&self, user_id: &str) -> HauntedResult<RewardBalance> {
        let (balance, transaction_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT, COUNT(*)
            FROM reward_transactions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RewardBalance {
            user_id: user_id.to_string(),
            balance,
            transaction_count,
        })
    }
}
