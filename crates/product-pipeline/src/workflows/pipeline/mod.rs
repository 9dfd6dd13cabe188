//! Product-candidate stage pipeline: gating, cooldown enforcement, full-evaluation
//! orchestration and the decision scorecard.
//!
//! Stage computations themselves live behind [`StageExecutor`]; candidate and
//! stage-run records behind [`CandidateStore`]. Everything in this module is
//! derived on read from the append-only stage-run history.

pub mod cooldown;
pub mod domain;
pub mod executor;
pub mod gate;
pub mod history;
pub mod orchestrator;
pub mod payload;
pub(crate) mod requests;
pub mod router;
pub mod scorecard;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use cooldown::{CooldownActive, CooldownGuard};
pub use domain::{
    Candidate, CandidateId, Cooldown, CooldownSeverity, DecisionChoice, LeadSnapshot, StageCode,
    StageRun, StageRunId, StageRunStatus, StageStatuses, UnknownStage,
};
pub use executor::{ComposedInput, ExecutorError, StageExecutor, StageRunOutcome};
pub use gate::{
    resolve_gate, resolve_stage_t_gate, resolve_stage_ts_gate, FullEvalGate, GateCode,
    GateContext,
};
pub use history::{StageHistory, REQUIRED_STAGES};
pub use orchestrator::{
    FullEvalStatus, FullEvaluationOrchestrator, FullEvaluationRequest, OrchestratorConfig,
    StageOutcome,
};
pub use payload::{
    Cashflow, Cents, PayloadError, StageAInput, StageBInput, StageCInput, StageInput,
    StageKInput, StageMRequest, StageSummary, SummaryRecord,
};
pub use requests::DefaultStageInputs;
pub use router::pipeline_router;
pub use scorecard::{
    score_confidence, ConfidenceBand, KeyMetrics, Recommendation, ScoreReason, Scorecard,
    ScorecardConfig, ScorecardEngine,
};
pub use service::{BulkRunSummary, PipelineService, PipelineServiceError};
pub use store::{CandidateStore, StoreError};
