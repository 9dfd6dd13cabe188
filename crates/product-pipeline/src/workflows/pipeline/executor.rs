use serde::Serialize;
use serde_json::Value;

use super::domain::{CandidateId, StageCode};
use super::payload::StageInput;

/// Remote stage collaborator: executes stage computations and composes
/// dependent inputs. Each call is a single blocking request-response.
pub trait StageExecutor: Send + Sync {
    /// Asynchronous submission; the stage output is recorded later by the collaborator.
    fn queue_stage(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
        request: &StageInput,
    ) -> Result<(), ExecutorError>;

    /// Synchronous execution returning the recorded output.
    fn run_stage(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
        input: &StageInput,
        scenario: Option<&Value>,
    ) -> Result<StageRunOutcome, ExecutorError>;

    /// Derives `stage`'s input from the latest outputs of its dependencies.
    fn compose_stage_input(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
    ) -> Result<ComposedInput, ExecutorError>;
}

/// Result of a synchronous stage run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageRunOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Composer response; `input` is absent when nothing usable could be derived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposedInput {
    pub input: Option<StageInput>,
    pub scenario: Option<Value>,
}

/// Failure reported by the stage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("stage {stage} output is required first")]
    MissingPrerequisite { stage: StageCode },
    #[error("collaborator refused: cooldown_active")]
    CooldownActive,
    #[error("collaborator rejected request: {code}")]
    Rejected { code: String },
    #[error("stage transport failed: {0}")]
    Transport(String),
}
