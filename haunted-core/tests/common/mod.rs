#![allow(dead_code)]

use async_trait::async_trait;
use haunted_core::agents::{AgentClient, AgentError, AgentRegistry};
use haunted_core::models::{Stage, StageInput, StageOutput};
use haunted_core::store::MemoryRoomStore;
use haunted_core::workflow::{Orchestrator, OrchestratorBuilder, Sleeper};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// In-process agent that plays back a scripted sequence of outcomes, then
/// keeps succeeding with its default output.
pub struct ScriptedAgent {
    stage: Stage,
    script: Mutex<VecDeque<Result<StageOutput, AgentError>>>,
    calls: AtomicU32,
    inputs: Mutex<Vec<StageInput>>,
    gate: Option<Arc<Gate>>,
}

/// Holds an agent call open until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl ScriptedAgent {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            inputs: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn then(self, outcome: Result<StageOutput, AgentError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn then_transient(self, message: &str) -> Self {
        self.then(Err(AgentError::Transient(message.to_string())))
    }

    pub fn then_permanent(self, message: &str) -> Self {
        self.then(Err(AgentError::Permanent(message.to_string())))
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<StageInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(default_output(self.stage)))
    }
}

pub fn default_output(stage: Stage) -> StageOutput {
    match stage {
        Stage::Story => StageOutput::Story {
            text: "The lighthouse keeper never came back down the stairs.".to_string(),
            content_id: None,
        },
        Stage::Asset => StageOutput::Asset {
            image_url: "https://images.example/lighthouse.png".to_string(),
            content_id: None,
        },
        Stage::Code => StageOutput::Code {
            code: "export const game = () => 'boo';".to_string(),
            content_id: None,
            tested: true,
        },
        Stage::Deploy => StageOutput::Deploy {
            deployed_url: "https://lighthouse.example".to_string(),
            status: "deployed".to_string(),
            content_id: None,
        },
    }
}

/// Records backoff delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Records the backoff delay, then blocks until the gate is released.
#[derive(Default)]
pub struct GatedSleeper {
    pub gate: Gate,
    delays: Mutex<Vec<Duration>>,
}

impl GatedSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for GatedSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        self.gate.entered.notify_one();
        self.gate.release.notified().await;
    }
}

/// One scripted agent per stage, indexed in workflow order.
pub struct Agents {
    pub story: Arc<ScriptedAgent>,
    pub asset: Arc<ScriptedAgent>,
    pub code: Arc<ScriptedAgent>,
    pub deploy: Arc<ScriptedAgent>,
    timeout: Duration,
}

impl Agents {
    pub fn new() -> Self {
        Self {
            story: Arc::new(ScriptedAgent::new(Stage::Story)),
            asset: Arc::new(ScriptedAgent::new(Stage::Asset)),
            code: Arc::new(ScriptedAgent::new(Stage::Code)),
            deploy: Arc::new(ScriptedAgent::new(Stage::Deploy)),
            timeout: Duration::from_secs(30),
        }
    }

    /// Per-call timeout the orchestrator applies to every agent.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with(mut self, agent: ScriptedAgent) -> Self {
        let agent = Arc::new(agent);
        match agent.stage {
            Stage::Story => self.story = agent,
            Stage::Asset => self.asset = agent,
            Stage::Code => self.code = agent,
            Stage::Deploy => self.deploy = agent,
        }
        self
    }

    pub fn registry(&self) -> AgentRegistry {
        let timeout = self.timeout;
        AgentRegistry::new()
            .with_agent(self.story.clone(), timeout)
            .with_agent(self.asset.clone(), timeout)
            .with_agent(self.code.clone(), timeout)
            .with_agent(self.deploy.clone(), timeout)
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryRoomStore>,
    pub sleeper: Arc<RecordingSleeper>,
    pub agents: Agents,
}

pub fn harness(agents: Agents) -> Harness {
    harness_with(agents, |builder| builder)
}

pub fn harness_with(
    agents: Agents,
    configure: impl FnOnce(OrchestratorBuilder) -> OrchestratorBuilder,
) -> Harness {
    let store = Arc::new(MemoryRoomStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let builder = Orchestrator::builder(store.clone(), agents.registry()).sleeper(sleeper.clone());
    let orchestrator = configure(builder).build();

    Harness {
        orchestrator,
        store,
        sleeper,
        agents,
    }
}
