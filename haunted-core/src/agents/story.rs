use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AgentClient, AgentEndpoint, AgentError};
use crate::config::AgentEndpointConfig;
use crate::error::HauntedResult;
use crate::models::{Stage, StageInput, StageOutput};

#[derive(Debug, Serialize)]
struct StoryRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryResponse {
    text: String,
    #[serde(default)]
    content_id: Option<String>,
}

/// Turns the room's prompt into a short horror story.
pub struct StoryAgentClient {
    endpoint: AgentEndpoint,
}

impl StoryAgentClient {
    pub fn new(config: &AgentEndpointConfig) -> HauntedResult<Self> {
        Ok(Self {
            endpoint: AgentEndpoint::new(Stage::Story, config)?,
        })
    }
}

#[async_trait]
impl AgentClient for StoryAgentClient {
    fn stage(&self) -> Stage {
        Stage::Story
    }

    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentError> {
        let StageInput::Story { prompt } = input else {
            return Err(AgentError::unexpected_input(Stage::Story, input));
        };

        let response: StoryResponse = self.endpoint.call(&StoryRequest { prompt }).await?;
        if response.text.trim().is_empty() {
            return Err(AgentError::Permanent(
                "story agent returned an empty story".to_string(),
            ));
        }

        Ok(StageOutput::Story {
            text: response.text,
            content_id: response.content_id,
        })
    }
}
