//! Clients for the four stage agent services.
//!
//! Each stage has its own [`AgentClient`] implementation with its own request
//! and response shapes. Clients make exactly one call per `invoke` and classify
//! the outcome; retrying is the orchestrator's job.

mod asset;
mod code;
mod deploy;
mod endpoint;
mod story;

pub use asset::AssetAgentClient;
pub use code::CodeAgentClient;
pub use deploy::DeployAgentClient;
pub use endpoint::{classify_status, AgentEndpoint};
pub use story::StoryAgentClient;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AgentsConfig;
use crate::error::{HauntedError, HauntedResult};
use crate::models::{FailureKind, Stage, StageInput, StageOutput};

/// Classified outcome of a failed agent call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Timeout, connection failure, 5xx or 429. Worth another attempt.
    #[error("transient: {0}")]
    Transient(String),

    /// Validation error or malformed response. Retrying cannot help.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            AgentError::Transient(message) | AgentError::Permanent(message) => message,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AgentError::Transient(_) => FailureKind::Transient,
            AgentError::Permanent(_) => FailureKind::Permanent,
        }
    }

    pub fn unexpected_input(stage: Stage, input: &StageInput) -> Self {
        AgentError::Permanent(format!(
            "{} agent cannot handle {} input",
            stage,
            input.stage()
        ))
    }

    pub fn into_error(self, stage: Stage) -> HauntedError {
        match self {
            AgentError::Transient(message) => HauntedError::AgentTransient { stage, message },
            AgentError::Permanent(message) => HauntedError::AgentPermanent { stage, message },
        }
    }
}

/// Errors raised while finishing a stage attempt (artifact pinning) keep their
/// retry classification.
impl From<HauntedError> for AgentError {
    fn from(err: HauntedError) -> Self {
        if err.is_transient() {
            AgentError::Transient(err.to_string())
        } else {
            AgentError::Permanent(err.to_string())
        }
    }
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    /// The pipeline stage this client serves.
    fn stage(&self) -> Stage;

    /// One call to the agent service.
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentError>;
}

#[derive(Clone)]
struct RegisteredAgent {
    client: Arc<dyn AgentClient>,
    timeout: Duration,
}

/// Stage to client lookup used by the orchestrator.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<Stage, RegisteredAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP clients for every stage, using the configured endpoints and timeouts.
    pub fn from_config(config: &AgentsConfig) -> HauntedResult<Self> {
        let registry = Self::new()
            .with_agent(
                Arc::new(StoryAgentClient::new(&config.story)?),
                config.story.timeout(),
            )
            .with_agent(
                Arc::new(AssetAgentClient::new(&config.asset)?),
                config.asset.timeout(),
            )
            .with_agent(
                Arc::new(CodeAgentClient::new(&config.code)?),
                config.code.timeout(),
            )
            .with_agent(
                Arc::new(DeployAgentClient::new(&config.deploy)?),
                config.deploy.timeout(),
            );
        Ok(registry)
    }

    /// Registers `client` for its stage, replacing any earlier client.
    pub fn register(&mut self, client: Arc<dyn AgentClient>, timeout: Duration) {
        self.agents
            .insert(client.stage(), RegisteredAgent { client, timeout });
    }

    pub fn with_agent(mut self, client: Arc<dyn AgentClient>, timeout: Duration) -> Self {
        self.register(client, timeout);
        self
    }

    pub fn get(&self, stage: Stage) -> HauntedResult<(Arc<dyn AgentClient>, Duration)> {
        self.agents
            .get(&stage)
            .map(|agent| (agent.client.clone(), agent.timeout))
            .ok_or(HauntedError::AgentNotRegistered(stage))
    }

    /// Stages in `stages` without a registered client.
    pub fn missing(&self, stages: &[Stage]) -> Vec<Stage> {
        stages
            .iter()
            .copied()
            .filter(|stage| !self.agents.contains_key(stage))
            .collect()
    }
}
