use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::RewardLedger;
use crate::error::{HauntedError, HauntedResult};
use crate::models::RewardBalance;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreditRequest<'a> {
    user_id: &'a str,
    amount: i64,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreditResponse {
    transaction_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    balance: i64,
    #[serde(default)]
    transaction_count: i64,
}

/// Ledger hosted by the external token service.
pub struct HttpRewardLedger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRewardLedger {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> HauntedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HauntedError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> HauntedResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(HauntedError::RewardFailed(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )))
    }
}

#[async_trait]
impl RewardLedger for HttpRewardLedger {
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        tx_ref: Option<String>,
    ) -> HauntedResult<Uuid> {
        let response = self
            .client
            .post(format!("{}/credit", self.base_url))
            .json(&CreditRequest {
                user_id,
                amount,
                reason,
                tx_ref,
            })
            .send()
            .await?;

        let body: CreditResponse = Self::check(response).await?.json().await?;
        Ok(body.transaction_id)
    }

    async fn balance(&self, user_id: &str) -> HauntedResult<RewardBalance> {
        let response = self
            .client
            .get(format!("{}/balance/{}", self.base_url, user_id))
            .send()
            .await?;

        let body: BalanceResponse = Self::check(response).await?.json().await?;
        Ok(RewardBalance {
            user_id: user_id.to_string(),
            balance: body.balance,
            transaction_count: body.transaction_count,
        })
    }
}
