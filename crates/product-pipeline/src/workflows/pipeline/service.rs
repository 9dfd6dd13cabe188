use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::cooldown::{CooldownActive, CooldownGuard};
use super::domain::{Candidate, CandidateId, DecisionChoice, StageCode};
use super::executor::{ExecutorError, StageExecutor, StageRunOutcome};
use super::gate::{resolve_gate, GateCode, GateContext};
use super::history::StageHistory;
use super::orchestrator::{
    FullEvalStatus, FullEvaluationOrchestrator, FullEvaluationRequest, OrchestratorConfig,
};
use super::payload::{scenario_of, PayloadError, StageInput};
use super::requests::stage_m_request_for;
use super::scorecard::{Scorecard, ScorecardConfig, ScorecardEngine};
use super::store::{CandidateStore, StoreError};

/// Service composing the candidate store, stage executor, orchestrator and scorer.
pub struct PipelineService<S, E> {
    store: Arc<S>,
    executor: Arc<E>,
    orchestrator: Arc<FullEvaluationOrchestrator<E>>,
    scorer: Arc<ScorecardEngine>,
}

/// Counts from one bulk stage-K pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl<S, E> PipelineService<S, E>
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    pub fn new(
        store: Arc<S>,
        executor: Arc<E>,
        orchestrator: OrchestratorConfig,
        scorecard: ScorecardConfig,
    ) -> Self {
        let orchestrator = Arc::new(FullEvaluationOrchestrator::new(
            Arc::clone(&executor),
            orchestrator,
        ));
        Self {
            store,
            executor,
            orchestrator,
            scorer: Arc::new(ScorecardEngine::new(scorecard)),
        }
    }

    fn load(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<(Candidate, StageHistory), PipelineServiceError> {
        let candidate = self
            .store
            .fetch_candidate(candidate_id)?
            .ok_or(PipelineServiceError::NotFound)?;
        let history = StageHistory::new(self.store.stage_runs(candidate_id)?);
        Ok((candidate, history))
    }

    /// Run one orchestration pass against the candidate's stored history.
    pub fn full_evaluation(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<FullEvalStatus, PipelineServiceError> {
        let (candidate, history) = self.load(candidate_id)?;
        let request = FullEvaluationRequest {
            candidate_id: candidate.id.clone(),
            lead: candidate.lead.clone(),
            statuses: history.statuses(),
            gate_context: GateContext::from_history(&history),
            cooldown: candidate.cooldown.clone(),
        };
        Ok(self.orchestrator.run_full_evaluation(&request))
    }

    pub fn scorecard(&self, candidate_id: &CandidateId) -> Result<Scorecard, PipelineServiceError> {
        let (candidate, history) = self.load(candidate_id)?;
        Ok(self.scorer.score(&history, &candidate))
    }

    pub fn gate(&self, candidate_id: &CandidateId) -> Result<Option<GateCode>, PipelineServiceError> {
        let (_, history) = self.load(candidate_id)?;
        Ok(resolve_gate(&history))
    }

    /// Guarded single-stage run. Without an explicit input, stage K is composed
    /// from its dependencies and stage M is derived from the lead.
    pub fn run_stage(
        &self,
        candidate_id: &CandidateId,
        stage: StageCode,
        input: Option<&Value>,
        scenario: Option<Value>,
    ) -> Result<StageRunOutcome, PipelineServiceError> {
        let (candidate, history) = self.load(candidate_id)?;
        CooldownGuard::ensure_clear(&candidate)?;

        if stage.is_gated() {
            if let Some(gate) = resolve_gate(&history) {
                return Err(PipelineServiceError::Gated { stage, gate });
            }
        }

        let (input, scenario) = match input {
            Some(payload) => {
                let scenario = scenario.or_else(|| scenario_of(payload).cloned());
                (StageInput::from_payload(stage, payload)?, scenario)
            }
            None => self.derive_input(&candidate, &history, stage, scenario)?,
        };

        let outcome = self
            .executor
            .run_stage(stage, candidate_id, &input, scenario.as_ref())?;
        info!(%candidate_id, stage = %stage, "stage run recorded");
        Ok(outcome)
    }

    fn derive_input(
        &self,
        candidate: &Candidate,
        history: &StageHistory,
        stage: StageCode,
        scenario: Option<Value>,
    ) -> Result<(StageInput, Option<Value>), PipelineServiceError> {
        if let Some(dependency) = stage
            .dependencies()
            .iter()
            .copied()
            .find(|dependency| !history.is_complete(*dependency))
        {
            return Err(ExecutorError::MissingPrerequisite { stage: dependency }.into());
        }

        match stage {
            StageCode::K => {
                let composed = self.executor.compose_stage_input(stage, &candidate.id)?;
                let input = composed
                    .input
                    .ok_or(PipelineServiceError::MissingInput { stage })?;
                Ok((input, scenario.or(composed.scenario)))
            }
            StageCode::M => {
                let config = self.orchestrator.config();
                let lead = candidate.lead.clone().unwrap_or_default();
                let request = stage_m_request_for(
                    &lead,
                    &config.default_marketplace,
                    config.stage_m_max_results,
                )
                .ok_or(PipelineServiceError::MissingInput { stage })?;
                Ok((StageInput::M(request), scenario))
            }
            _ => Err(PipelineServiceError::MissingInput { stage }),
        }
    }

    /// Compose and run stage K for each candidate in order; every error counts
    /// as one failure.
    pub fn run_stage_k_bulk(&self, candidate_ids: &[CandidateId]) -> BulkRunSummary {
        let mut summary = BulkRunSummary::default();
        for candidate_id in candidate_ids {
            match self.run_stage(candidate_id, StageCode::K, None, None) {
                Ok(_) => summary.succeeded += 1,
                Err(err) => {
                    warn!(%candidate_id, error = %err, "bulk stage K run failed");
                    summary.failed += 1;
                }
            }
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "bulk stage K pass complete"
        );
        summary
    }

    /// Persist a human decision, accepting legacy synonyms.
    pub fn record_decision(
        &self,
        candidate_id: &CandidateId,
        decision: &str,
        reason: Option<&str>,
    ) -> Result<DecisionChoice, PipelineServiceError> {
        let choice = DecisionChoice::normalize(decision)
            .ok_or_else(|| PipelineServiceError::UnknownDecision(decision.trim().to_string()))?;
        self.store
            .fetch_candidate(candidate_id)?
            .ok_or(PipelineServiceError::NotFound)?;

        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string);
        self.store
            .update_decision(candidate_id, Some(choice.serialized().to_string()), reason)?;
        info!(%candidate_id, decision = choice.label(), "human decision recorded");
        Ok(choice)
    }
}

/// Error raised by the pipeline service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineServiceError {
    #[error("candidate not found")]
    NotFound,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    CooldownActive(#[from] CooldownActive),
    #[error("stage {stage} is withheld by gate {}", .gate.label())]
    Gated { stage: StageCode, gate: GateCode },
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("stage {stage} needs an input payload")]
    MissingInput { stage: StageCode },
    #[error("unknown decision '{0}'")]
    UnknownDecision(String),
}

impl From<StoreError> for PipelineServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => PipelineServiceError::NotFound,
            other => PipelineServiceError::Store(other),
        }
    }
}
