use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AgentClient, AgentEndpoint, AgentError};
use crate::config::AgentEndpointConfig;
use crate::error::HauntedResult;
use crate::models::{Stage, StageInput, StageOutput};

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployResponse {
    deployed_url: String,
    #[serde(default = "default_status")]
    status: String,
}

fn default_status() -> String {
    "deployed".to_string()
}

/// Publishes the generated game and reports where it lives.
pub struct DeployAgentClient {
    endpoint: AgentEndpoint,
}

impl DeployAgentClient {
    pub fn new(config: &AgentEndpointConfig) -> HauntedResult<Self> {
        Ok(Self {
            endpoint: AgentEndpoint::new(Stage::Deploy, config)?,
        })
    }
}

#[async_trait]
impl AgentClient for DeployAgentClient {
    fn stage(&self) -> Stage {
        Stage::Deploy
    }

    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentError> {
        let StageInput::Deploy { code } = input else {
            return Err(AgentError::unexpected_input(Stage::Deploy, input));
        };

        let response: DeployResponse = self.endpoint.call(&DeployRequest { code }).await?;
        if response.deployed_url.is_empty() {
            return Err(AgentError::Permanent(
                "deploy agent returned no url".to_string(),
            ));
        }

        Ok(StageOutput::Deploy {
            deployed_url: response.deployed_url,
            status: response.status,
            content_id: None,
        })
    }
}
