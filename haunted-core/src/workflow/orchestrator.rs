use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::definition::WorkflowDefinition;
use super::sleeper::{Sleeper, TokioSleeper};
use crate::agents::{AgentClient, AgentError, AgentRegistry};
use crate::error::{HauntedError, HauntedResult, RetryPolicy};
use crate::logstream::{LogStream, LogSubscription};
use crate::models::{
    Asset, FailureKind, LogEntry, Room, RoomFailure, RoomPhase, RoomSnapshot, Stage, StageInput,
    StageOutput, StageResult,
};
use crate::rewards::RewardTrigger;
use crate::storage::{is_valid_content_id, ContentUploader};
use crate::store::{RoomStateStore, StageUpdate};

/// Longest accepted room prompt, in characters.
pub const MAX_INPUT_CHARS: usize = 4000;

const ORCHESTRATOR: &str = "orchestrator";

/// Drives rooms through the workflow.
///
/// Each started room runs as its own task. All room mutations go through
/// [`RoomStateStore::compare_and_set_stage`], so a room can only be advanced by
/// whoever still holds the current phase.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn RoomStateStore>,
    agents: AgentRegistry,
    logs: LogStream,
    uploader: Option<Arc<dyn ContentUploader>>,
    rewards: RewardTrigger,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    workflow: WorkflowDefinition,
    active: Mutex<HashMap<Uuid, CancellationToken>>,
    tasks: TaskTracker,
}

pub struct OrchestratorBuilder {
    store: Arc<dyn RoomStateStore>,
    agents: AgentRegistry,
    logs: Option<LogStream>,
    uploader: Option<Arc<dyn ContentUploader>>,
    rewards: Option<RewardTrigger>,
    retry: Option<RetryPolicy>,
    sleeper: Option<Arc<dyn Sleeper>>,
    workflow: Option<WorkflowDefinition>,
}

impl OrchestratorBuilder {
    pub fn log_stream(mut self, logs: LogStream) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn ContentUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn rewards(mut self, rewards: RewardTrigger) -> Self {
        self.rewards = Some(rewards);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            inner: Arc::new(Inner {
                store: self.store,
                agents: self.agents,
                logs: self.logs.unwrap_or_default(),
                uploader: self.uploader,
                rewards: self.rewards.unwrap_or_else(RewardTrigger::disabled),
                retry: self.retry.unwrap_or_default(),
                sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
                workflow: self.workflow.unwrap_or_default(),
                active: Mutex::new(HashMap::new()),
                tasks: TaskTracker::new(),
            }),
        }
    }
}

/// A started room. Dropping the handle does not stop the room.
#[derive(Debug)]
pub struct RunHandle {
    room_id: Uuid,
    handle: JoinHandle<RoomPhase>,
}

impl RunHandle {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Waits for the room to reach a terminal phase.
    pub async fn wait(self) -> HauntedResult<RoomPhase> {
        self.handle
            .await
            .map_err(|e| HauntedError::Internal(format!("room task failed: {}", e)))
    }
}

enum StageOutcome {
    Succeeded {
        output: StageOutput,
        asset: Option<Asset>,
        attempts: u32,
        duration_ms: u64,
    },
    Failed {
        error: AgentError,
        attempts: u32,
        duration_ms: u64,
    },
    Cancelled,
}

impl Orchestrator {
    pub fn builder(store: Arc<dyn RoomStateStore>, agents: AgentRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store,
            agents,
            logs: None,
            uploader: None,
            rewards: None,
            retry: None,
            sleeper: None,
            workflow: None,
        }
    }

    pub fn logs(&self) -> &LogStream {
        &self.inner.logs
    }

    pub fn rewards(&self) -> &RewardTrigger {
        &self.inner.rewards
    }

    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.inner.workflow
    }

    /// Stores a new idle room for `owner_id`.
    pub async fn create_room(&self, owner_id: &str, input: &str) -> HauntedResult<Room> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(HauntedError::InvalidInput(
                "owner id must not be empty".to_string(),
            ));
        }

        let input = input.trim();
        if input.is_empty() {
            return Err(HauntedError::InvalidInput(
                "input text must not be empty".to_string(),
            ));
        }
        let chars = input.chars().count();
        if chars > MAX_INPUT_CHARS {
            return Err(HauntedError::InvalidInput(format!(
                "input text is {} characters, the limit is {}",
                chars, MAX_INPUT_CHARS
            )));
        }

        let room = Room::new(owner_id, input);
        self.inner.store.create(room.clone()).await?;
        info!(room_id = %room.id, owner_id = %room.owner_id, "Room created");
        Ok(room)
    }

    /// Moves an idle room to its first stage and spawns the room task.
    ///
    /// Concurrent calls for the same room are safe: exactly one wins the
    /// compare-and-set, every other caller gets `InvalidState`.
    pub async fn start(&self, room_id: Uuid) -> HauntedResult<RunHandle> {
        let room = self.inner.store.get(room_id).await?;

        let phase = room.phase();
        if phase != RoomPhase::Idle {
            return Err(HauntedError::invalid_state(room_id, "idle", phase));
        }

        let missing = self.inner.agents.missing(self.inner.workflow.stages());
        if let Some(stage) = missing.first() {
            return Err(HauntedError::AgentNotRegistered(*stage));
        }

        let token = CancellationToken::new();
        {
            let mut active = self.inner.active.lock().await;
            if active.contains_key(&room_id) {
                return Err(HauntedError::invalid_state(room_id, "idle", phase));
            }
            active.insert(room_id, token.clone());
        }

        let first = self.inner.workflow.first();
        let swapped = self
            .inner
            .store
            .compare_and_set_stage(
                room_id,
                RoomPhase::Idle,
                RoomPhase::Running(first),
                StageUpdate::none(),
            )
            .await;

        match swapped {
            Ok(true) => {}
            Ok(false) => {
                self.inner.active.lock().await.remove(&room_id);
                let current = self.inner.store.get(room_id).await?.phase();
                return Err(HauntedError::invalid_state(room_id, "idle", current));
            }
            Err(e) => {
                self.inner.active.lock().await.remove(&room_id);
                return Err(e);
            }
        }

        info!(room_id = %room_id, stage = %first, "Room started");

        let orchestrator = self.clone();
        let mut running = room;
        running.enter(RoomPhase::Running(first), None);
        let handle = self.inner.tasks.spawn(async move {
            let phase = orchestrator.drive(running, token).await;
            orchestrator.inner.active.lock().await.remove(&room_id);
            phase
        });

        Ok(RunHandle { room_id, handle })
    }

    /// Starts the room and waits for it to finish.
    pub async fn run(&self, room_id: Uuid) -> HauntedResult<RoomPhase> {
        self.start(room_id).await?.wait().await
    }

    /// Fails a running room with reason `Cancelled` and abandons its in-flight work.
    ///
    /// Any agent response that arrives afterwards is discarded.
    pub async fn cancel(&self, room_id: Uuid) -> HauntedResult<Room> {
        loop {
            let room = self.inner.store.get(room_id).await?;
            let phase = room.phase();
            let RoomPhase::Running(stage) = phase else {
                return Err(HauntedError::invalid_state(room_id, "running", phase));
            };

            let swapped = self
                .inner
                .store
                .compare_and_set_stage(
                    room_id,
                    phase,
                    RoomPhase::Failed,
                    StageUpdate::failed(None, RoomFailure::cancelled(Some(stage))),
                )
                .await?;
            if swapped {
                info!(room_id = %room_id, stage = %stage, "Room cancelled");
                break;
            }
            debug!(room_id = %room_id, "Room advanced while cancelling, retrying");
        }

        let token = self.inner.active.lock().await.get(&room_id).cloned();
        match token {
            Some(token) => token.cancel(),
            None => {
                // No task is driving this room, so nobody else will report it.
                self.inner
                    .logs
                    .append(room_id, LogEntry::error(ORCHESTRATOR, "Room cancelled"))
                    .await;
                self.inner.logs.close(room_id).await;
            }
        }

        self.inner.store.get(room_id).await
    }

    /// The room with its stage results in workflow order and pinned assets.
    pub async fn snapshot(&self, room_id: Uuid) -> HauntedResult<RoomSnapshot> {
        let room = self.inner.store.get(room_id).await?;
        let results = self.inner.store.list_results(room_id).await?;
        let assets = self.inner.store.list_assets(room_id).await?;
        Ok(RoomSnapshot {
            phase: room.phase(),
            room,
            results,
            assets,
        })
    }

    pub async fn get_room(&self, room_id: Uuid) -> HauntedResult<Room> {
        self.inner.store.get(room_id).await
    }

    /// Rooms for `owner_id`, newest first.
    pub async fn list_rooms(&self, owner_id: &str) -> HauntedResult<Vec<Room>> {
        self.inner.store.list_by_owner(owner_id).await
    }

    /// Subscribes to a room's Log Events: the buffered backlog, then live events.
    pub async fn subscribe_logs(&self, room_id: Uuid) -> HauntedResult<LogSubscription> {
        let room = self.inner.store.get(room_id).await?;
        let subscription = self.inner.logs.subscribe(room_id).await;

        // Finished rooms whose log was swept (or never opened here) still end the stream.
        if room.phase().is_terminal() && !self.inner.active.lock().await.contains_key(&room_id) {
            self.inner.logs.close(room_id).await;
        }

        Ok(subscription)
    }

    /// Waits for every room task and reward credit spawned so far.
    pub async fn settle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
        self.inner.rewards.settle().await;
    }

    pub async fn active_rooms(&self) -> usize {
        self.inner.active.lock().await.len()
    }

    async fn drive(&self, room: Room, token: CancellationToken) -> RoomPhase {
        let room_id = room.id;
        let mut results: Vec<StageResult> = Vec::new();

        for &stage in self.inner.workflow.stages() {
            if token.is_cancelled() {
                return self.report_cancelled(room_id, stage).await;
            }

            let input = match self.inner.workflow.build_input(stage, &room, &results) {
                Ok(input) => input,
                Err(e) => {
                    return self
                        .fail(
                            room_id,
                            stage,
                            RoomFailure::new(FailureKind::Internal, Some(stage), e.to_string()),
                            None,
                        )
                        .await;
                }
            };

            self.log(room_id, LogEntry::info(stage.as_str(), format!("Starting {} stage", stage)))
                .await;

            match self.run_stage(room_id, stage, &input, &token).await {
                StageOutcome::Succeeded {
                    output,
                    asset,
                    attempts,
                    duration_ms,
                } => {
                    let result = StageResult::success(room_id, output, attempts, duration_ms);
                    let next = self
                        .inner
                        .workflow
                        .next_after(stage)
                        .map(RoomPhase::Running)
                        .unwrap_or(RoomPhase::Done);

                    let swapped = self
                        .inner
                        .store
                        .compare_and_set_stage(
                            room_id,
                            RoomPhase::Running(stage),
                            next,
                            StageUpdate::with_result(result.clone()),
                        )
                        .await;

                    match swapped {
                        Ok(true) => {}
                        Ok(false) => return self.lost(room_id, stage, &token).await,
                        Err(e) => {
                            e.log();
                            return self
                                .fail(
                                    room_id,
                                    stage,
                                    RoomFailure::new(
                                        FailureKind::Internal,
                                        Some(stage),
                                        e.to_string(),
                                    ),
                                    None,
                                )
                                .await;
                        }
                    }

                    if let Some(asset) = asset {
                        if let Err(e) = self.inner.store.record_asset(asset).await {
                            warn!(room_id = %room_id, stage = %stage, "Failed to record asset: {}", e);
                        }
                    }

                    self.log(
                        room_id,
                        LogEntry::success(stage.as_str(), completion_message(&result)),
                    )
                    .await;
                    self.inner
                        .rewards
                        .notify_stage_complete(room_id, &room.owner_id, stage);

                    results.push(result);
                }
                StageOutcome::Failed {
                    error,
                    attempts,
                    duration_ms,
                } => {
                    let result = StageResult::failure(
                        room_id,
                        stage,
                        error.message(),
                        attempts,
                        duration_ms,
                    );
                    let failure =
                        RoomFailure::new(error.failure_kind(), Some(stage), error.message());
                    return self.fail(room_id, stage, failure, Some(result)).await;
                }
                StageOutcome::Cancelled => {
                    return self.report_cancelled(room_id, stage).await;
                }
            }
        }

        self.log(
            room_id,
            LogEntry::success(ORCHESTRATOR, "All stages complete"),
        )
        .await;
        self.inner.rewards.notify_room_complete(room_id, &room.owner_id);
        self.inner.logs.close(room_id).await;
        info!(room_id = %room_id, "Room done");
        RoomPhase::Done
    }

    /// Calls the stage's agent, retrying transient failures with backoff.
    async fn run_stage(
        &self,
        room_id: Uuid,
        stage: Stage,
        input: &StageInput,
        token: &CancellationToken,
    ) -> StageOutcome {
        let started = Instant::now();
        let (client, timeout) = match self.inner.agents.get(stage) {
            Ok(agent) => agent,
            Err(e) => {
                return StageOutcome::Failed {
                    error: AgentError::Permanent(e.to_string()),
                    attempts: 0,
                    duration_ms: 0,
                }
            }
        };

        let retry = &self.inner.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if token.is_cancelled() {
                return StageOutcome::Cancelled;
            }

            debug!(room_id = %room_id, stage = %stage, attempt, "Invoking agent");
            // In-flight calls run to completion; whatever they return after a
            // cancel is dropped here.
            let outcome = self.attempt(room_id, client.as_ref(), timeout, input).await;
            if token.is_cancelled() {
                debug!(room_id = %room_id, stage = %stage, "Discarding late agent result");
                return StageOutcome::Cancelled;
            }

            match outcome {
                Ok((output, asset)) => {
                    return StageOutcome::Succeeded {
                        output,
                        asset,
                        attempts: attempt,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Err(error) if error.is_transient() && retry.should_retry(attempt) => {
                    let delay = retry.delay_for_attempt(attempt - 1);
                    warn!(
                        room_id = %room_id,
                        stage = %stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient agent failure: {}",
                        error.message()
                    );
                    self.log(
                        room_id,
                        LogEntry::warn(
                            stage.as_str(),
                            format!(
                                "Attempt {}/{} failed: {}. Retrying in {}ms",
                                attempt,
                                retry.max_attempts,
                                error.message(),
                                delay.as_millis()
                            ),
                        ),
                    )
                    .await;

                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return StageOutcome::Cancelled,
                        _ = self.inner.sleeper.sleep(delay) => {}
                    }
                }
                Err(error) => {
                    return StageOutcome::Failed {
                        error,
                        attempts: attempt,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
            }
        }
    }

    /// One attempt: the agent call under its timeout, then artifact pinning.
    async fn attempt(
        &self,
        room_id: Uuid,
        client: &dyn AgentClient,
        timeout: Duration,
        input: &StageInput,
    ) -> Result<(StageOutput, Option<Asset>), AgentError> {
        let stage = client.stage();
        let output = match tokio::time::timeout(timeout, client.invoke(input)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AgentError::Transient(format!(
                    "{} agent timed out after {}s",
                    stage,
                    timeout.as_secs()
                )))
            }
        };

        if output.stage() != stage {
            return Err(AgentError::Permanent(format!(
                "{} agent returned {} output",
                stage,
                output.stage()
            )));
        }

        self.pin(room_id, output).await
    }

    /// Makes sure the output carries a valid content identifier and describes
    /// the artifact it points at.
    async fn pin(
        &self,
        room_id: Uuid,
        mut output: StageOutput,
    ) -> Result<(StageOutput, Option<Asset>), AgentError> {
        let stage = output.stage();
        let artifact = output.artifact();
        let size_bytes = artifact.bytes.len() as i64;

        let existing = output
            .content_id()
            .filter(|cid| is_valid_content_id(cid))
            .map(str::to_string);

        let cid = match existing {
            Some(cid) => cid,
            None => match &self.inner.uploader {
                Some(uploader) => {
                    let cid = uploader
                        .upload(artifact.bytes, &artifact.filename, artifact.mime_type)
                        .await?;
                    if !is_valid_content_id(&cid) {
                        return Err(HauntedError::InvalidContentId(cid).into());
                    }
                    cid
                }
                None => {
                    if output.content_id().is_some() {
                        debug!(room_id = %room_id, stage = %stage, "Dropping invalid content id");
                        output.set_content_id(None);
                    }
                    return Ok((output, None));
                }
            },
        };

        output.set_content_id(Some(cid.clone()));
        let asset = Asset::new(room_id, stage, cid, size_bytes, artifact.mime_type);
        Ok((output, Some(asset)))
    }

    /// Moves a running room to `Failed`, reporting the cause.
    async fn fail(
        &self,
        room_id: Uuid,
        stage: Stage,
        failure: RoomFailure,
        result: Option<StageResult>,
    ) -> RoomPhase {
        let message = failure.message.clone();
        let kind = failure.kind;
        let attempts = result.as_ref().map(|r| r.attempts).unwrap_or(0);

        let swapped = self
            .inner
            .store
            .compare_and_set_stage(
                room_id,
                RoomPhase::Running(stage),
                RoomPhase::Failed,
                StageUpdate::failed(result, failure),
            )
            .await;

        match swapped {
            Ok(true) => {
                error!(
                    room_id = %room_id,
                    stage = %stage,
                    failure_kind = %kind,
                    attempts,
                    "Room failed: {}",
                    message
                );
                let text = if attempts > 1 {
                    format!(
                        "{} stage failed after {} attempts: {}",
                        stage, attempts, message
                    )
                } else {
                    format!("{} stage failed: {}", stage, message)
                };
                self.log(room_id, LogEntry::error(stage.as_str(), text)).await;
                self.inner.logs.close(room_id).await;
                RoomPhase::Failed
            }
            Ok(false) => self.lost_without_token(room_id, stage).await,
            Err(e) => {
                e.log();
                self.log(
                    room_id,
                    LogEntry::error(
                        ORCHESTRATOR,
                        format!("{} stage failed and the room could not be updated: {}", stage, e),
                    ),
                )
                .await;
                self.inner.logs.close(room_id).await;
                RoomPhase::Failed
            }
        }
    }

    /// The room left `Running(stage)` underneath us. Only cancellation does that.
    async fn lost(&self, room_id: Uuid, stage: Stage, token: &CancellationToken) -> RoomPhase {
        if token.is_cancelled() {
            debug!(room_id = %room_id, stage = %stage, "Discarding late agent result");
            return self.report_cancelled(room_id, stage).await;
        }
        self.lost_without_token(room_id, stage).await
    }

    async fn lost_without_token(&self, room_id: Uuid, stage: Stage) -> RoomPhase {
        let (phase, cancelled) = match self.inner.store.get(room_id).await {
            Ok(room) => (room.phase(), room.is_cancelled()),
            Err(_) => (RoomPhase::Failed, false),
        };

        if cancelled {
            return self.report_cancelled(room_id, stage).await;
        }

        warn!(room_id = %room_id, stage = %stage, phase = %phase, "Room changed underneath its task");
        self.log(
            room_id,
            LogEntry::error(
                ORCHESTRATOR,
                format!("Room moved to {} while the {} stage was running", phase, stage),
            ),
        )
        .await;
        self.inner.logs.close(room_id).await;
        phase
    }

    async fn report_cancelled(&self, room_id: Uuid, stage: Stage) -> RoomPhase {
        info!(room_id = %room_id, stage = %stage, "Room task stopped after cancellation");
        self.log(
            room_id,
            LogEntry::error(
                ORCHESTRATOR,
                format!("Room cancelled during the {} stage", stage),
            ),
        )
        .await;
        self.inner.logs.close(room_id).await;
        RoomPhase::Failed
    }

    async fn log(&self, room_id: Uuid, entry: LogEntry) {
        self.inner.logs.append(room_id, entry).await;
    }
}

fn completion_message(result: &StageResult) -> String {
    let detail = match &result.output {
        Some(StageOutput::Story { text, .. }) => {
            format!("{} characters", text.chars().count())
        }
        Some(StageOutput::Asset { image_url, .. }) => image_url.clone(),
        Some(StageOutput::Code { tested, .. }) => {
            if *tested {
                "tested".to_string()
            } else {
                "untested".to_string()
            }
        }
        Some(StageOutput::Deploy { deployed_url, .. }) => deployed_url.clone(),
        None => String::new(),
    };

    let mut message = format!("{} stage complete", result.stage);
    if !detail.is_empty() {
        message.push_str(&format!(" ({})", detail));
    }
    if result.attempts > 1 {
        message.push_str(&format!(" after {} attempts", result.attempts));
    }
    if let Some(cid) = &result.content_id {
        message.push_str(&format!(", pinned as {}", cid));
    }
    message
}
