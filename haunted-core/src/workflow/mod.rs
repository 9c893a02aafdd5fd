//! Room workflow: the stage list, backoff sleeps and the orchestrator that
//! drives rooms from `Idle` to `Done` or `Failed`.

mod definition;
mod orchestrator;
mod sleeper;

pub use definition::WorkflowDefinition;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunHandle, MAX_INPUT_CHARS};
pub use sleeper::{Sleeper, TokioSleeper};
