use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AgentClient, AgentEndpoint, AgentError};
use crate::config::AgentEndpointConfig;
use crate::error::HauntedResult;
use crate::models::{Stage, StageInput, StageOutput};

#[derive(Debug, Serialize)]
struct AssetRequest<'a> {
    story: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponse {
    image_url: String,
    #[serde(default)]
    content_id: Option<String>,
}

/// Renders an image for the generated story.
pub struct AssetAgentClient {
    endpoint: AgentEndpoint,
}

impl AssetAgentClient {
    pub fn new(config: &AgentEndpointConfig) -> HauntedResult<Self> {
        Ok(Self {
            endpoint: AgentEndpoint::new(Stage::Asset, config)?,
        })
    }
}

#[async_trait]
impl AgentClient for AssetAgentClient {
    fn stage(&self) -> Stage {
        Stage::Asset
    }

    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentError> {
        let StageInput::Asset { story } = input else {
            return Err(AgentError::unexpected_input(Stage::Asset, input));
        };

        let response: AssetResponse = self.endpoint.call(&AssetRequest { story }).await?;
        if response.image_url.is_empty() {
            return Err(AgentError::Permanent(
                "asset agent returned no image url".to_string(),
            ));
        }

        Ok(StageOutput::Asset {
            image_url: response.image_url,
            content_id: response.content_id,
        })
    }
}
