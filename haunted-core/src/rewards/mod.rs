//! Token rewards for completed stages.
//!
//! The [`RewardTrigger`] is the orchestrator's only view of rewards. It spawns
//! one tracked task per credit and never reports failures back to the caller.

mod http;
mod memory;
mod trigger;

pub use http::HttpRewardLedger;
pub use memory::MemoryRewardLedger;
pub use trigger::RewardTrigger;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::HauntedResult;
use crate::models::RewardBalance;

/// External ledger that credits tokens to a user.
#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Credits `amount` tokens (negative for a debit) and returns the transaction id.
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        tx_ref: Option<String>,
    ) -> HauntedResult<Uuid>;

    /// Running balance: the sum of every transaction for the user.
    async fn balance(&self, user_id: &str) -> HauntedResult<RewardBalance>;
}
