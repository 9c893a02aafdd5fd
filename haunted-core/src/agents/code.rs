use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AgentClient, AgentEndpoint, AgentError};
use crate::config::AgentEndpointConfig;
use crate::error::HauntedResult;
use crate::models::{Stage, StageInput, StageOutput};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeRequest<'a> {
    story: &'a str,
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeResponse {
    code: String,
    #[serde(default)]
    content_id: Option<String>,
    #[serde(default)]
    tested: bool,
}

/// Generates a playable mini-game from the story and image.
pub struct CodeAgentClient {
    endpoint: AgentEndpoint,
}

impl CodeAgentClient {
    pub fn new(config: &AgentEndpointConfig) -> HauntedResult<Self> {
        Ok(Self {
            endpoint: AgentEndpoint::new(Stage::Code, config)?,
        })
    }
}

#[async_trait]
impl AgentClient for CodeAgentClient {
    fn stage(&self) -> Stage {
        Stage::Code
    }

    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentError> {
        let StageInput::Code { story, image_url } = input else {
            return Err(AgentError::unexpected_input(Stage::Code, input));
        };

        let response: CodeResponse = self
            .endpoint
            .call(&CodeRequest { story, image_url })
            .await?;
        if response.code.trim().is_empty() {
            return Err(AgentError::Permanent(
                "code agent returned no code".to_string(),
            ));
        }

        Ok(StageOutput::Code {
            code: response.code,
            content_id: response.content_id,
            tested: response.tested,
        })
    }
}
