use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::AgentError;
use crate::config::AgentEndpointConfig;
use crate::error::{HauntedError, HauntedResult};
use crate::models::Stage;

const MAX_ERROR_BODY: usize = 200;

/// A single agent service URL plus the HTTP client that talks to it.
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    stage: Stage,
    url: String,
    client: reqwest::Client,
}

impl AgentEndpoint {
    pub fn new(stage: Stage, config: &AgentEndpointConfig) -> HauntedResult<Self> {
        if config.url.is_empty() {
            return Err(HauntedError::InvalidConfigValue {
                key: format!("agents.{}.url", stage),
                message: "Agent URL is not configured".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| HauntedError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            stage,
            url: config.url.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs `body` as JSON and decodes a successful response into `Resp`.
    pub async fn call<Req, Resp>(&self, body: &Req) -> Result<Resp, AgentError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!(stage = %self.stage, url = %self.url, "Calling agent");

        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            AgentError::Permanent(format!("malformed {} agent response: {}", self.stage, e))
        })
    }
}

fn classify_transport(err: reqwest::Error) -> AgentError {
    if err.is_decode() {
        AgentError::Permanent(err.to_string())
    } else if err.is_timeout() {
        AgentError::Transient(format!("request timed out: {}", err))
    } else {
        AgentError::Transient(err.to_string())
    }
}

/// Classifies a non-success HTTP status: 5xx, 408 and 429 are transient,
/// every other status is permanent.
pub fn classify_status(status: StatusCode, body: &str) -> AgentError {
    let detail = error_detail(body);
    let message = if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), detail)
    };

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        AgentError::Transient(message)
    } else {
        AgentError::Permanent(message)
    }
}

/// Pulls `error` or `message` out of a JSON error body, else the raw text.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        });

    from_json
        .unwrap_or_else(|| body.trim().to_string())
        .chars()
        .take(MAX_ERROR_BODY)
        .collect()
}
