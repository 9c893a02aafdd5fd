use crate::error::{HauntedError, HauntedResult};
use crate::models::{Room, Stage, StageInput, StageOutput, StageResult};

/// Ordered list of stages a room runs through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    stages: Vec<Stage>,
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.to_vec(),
        }
    }
}

impl WorkflowDefinition {
    /// A pipeline over `stages`, which must be non-empty and strictly follow
    /// pipeline order.
    pub fn new(stages: Vec<Stage>) -> HauntedResult<Self> {
        if stages.is_empty() {
            return Err(HauntedError::ValidationError(
                "workflow needs at least one stage".to_string(),
            ));
        }
        if stages.windows(2).any(|w| w[0].ordinal() >= w[1].ordinal()) {
            return Err(HauntedError::ValidationError(
                "workflow stages must follow story, asset, code, deploy order".to_string(),
            ));
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn first(&self) -> Stage {
        self.stages[0]
    }

    pub fn next_after(&self, stage: Stage) -> Option<Stage> {
        let index = self.stages.iter().position(|s| *s == stage)?;
        self.stages.get(index + 1).copied()
    }

    /// Builds the agent input for `stage` from the room and earlier results.
    pub fn build_input(
        &self,
        stage: Stage,
        room: &Room,
        results: &[StageResult],
    ) -> HauntedResult<StageInput> {
        let output_of = |wanted: Stage| {
            results
                .iter()
                .filter(|r| r.success)
                .find_map(|r| r.output.as_ref().filter(|o| o.stage() == wanted))
                .ok_or_else(|| {
                    HauntedError::Internal(format!(
                        "room {} has no {} output to feed the {} stage",
                        room.id, wanted, stage
                    ))
                })
        };

        match stage {
            Stage::Story => Ok(StageInput::Story {
                prompt: room.input_text.clone(),
            }),
            Stage::Asset => match output_of(Stage::Story)? {
                StageOutput::Story { text, .. } => Ok(StageInput::Asset {
                    story: text.clone(),
                }),
                other => Err(mismatched(other)),
            },
            Stage::Code => {
                let story = match output_of(Stage::Story)? {
                    StageOutput::Story { text, .. } => text.clone(),
                    other => return Err(mismatched(other)),
                };
                let image_url = match output_of(Stage::Asset)? {
                    StageOutput::Asset { image_url, .. } => image_url.clone(),
                    other => return Err(mismatched(other)),
                };
                Ok(StageInput::Code { story, image_url })
            }
            Stage::Deploy => match output_of(Stage::Code)? {
                StageOutput::Code { code, .. } => Ok(StageInput::Deploy { code: code.clone() }),
                other => Err(mismatched(other)),
            },
        }
    }
}

fn mismatched(output: &StageOutput) -> HauntedError {
    HauntedError::Internal(format!("unexpected {} output", output.stage()))
}
