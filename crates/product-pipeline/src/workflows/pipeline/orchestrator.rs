use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cooldown::CooldownGuard;
use super::domain::{CandidateId, Cooldown, LeadSnapshot, StageCode, StageRunStatus, StageStatuses};
use super::executor::StageExecutor;
use super::gate::{FullEvalGate, GateContext};
use super::payload::StageInput;
use super::requests::{stage_m_request_for, DefaultStageInputs};

/// Settings for the inputs a full evaluation derives on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub default_marketplace: String,
    pub stage_m_max_results: Option<u32>,
    pub default_inputs: DefaultStageInputs,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_marketplace: "de".to_string(),
            stage_m_max_results: Some(20),
            default_inputs: DefaultStageInputs::default(),
        }
    }
}

/// Everything one orchestration pass reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullEvaluationRequest {
    pub candidate_id: CandidateId,
    #[serde(default)]
    pub lead: Option<LeadSnapshot>,
    #[serde(default)]
    pub statuses: StageStatuses,
    #[serde(default)]
    pub gate_context: GateContext,
    #[serde(default)]
    pub cooldown: Option<Cooldown>,
}

/// Bucket a stage landed in during one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ran,
    Queued,
    Skipped,
    Missing,
}

/// Report of one orchestration pass. Each attempted stage appears in exactly
/// one list, in the order it was decided.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullEvalStatus {
    pub ran: Vec<StageCode>,
    pub queued: Vec<StageCode>,
    pub skipped: Vec<StageCode>,
    pub missing: Vec<StageCode>,
}

impl FullEvalStatus {
    fn record(&mut self, stage: StageCode, outcome: StageOutcome) {
        debug!(stage = %stage, ?outcome, "full evaluation stage decided");
        let bucket = match outcome {
            StageOutcome::Ran => &mut self.ran,
            StageOutcome::Queued => &mut self.queued,
            StageOutcome::Skipped => &mut self.skipped,
            StageOutcome::Missing => &mut self.missing,
        };
        bucket.push(stage);
    }

    pub fn outcome_of(&self, stage: StageCode) -> Option<StageOutcome> {
        [
            (&self.ran, StageOutcome::Ran),
            (&self.queued, StageOutcome::Queued),
            (&self.skipped, StageOutcome::Skipped),
            (&self.missing, StageOutcome::Missing),
        ]
        .into_iter()
        .find(|(bucket, _)| bucket.contains(&stage))
        .map(|(_, outcome)| outcome)
    }
}

/// Drives stages M, A, B, C and K for one candidate.
pub struct FullEvaluationOrchestrator<E> {
    executor: Arc<E>,
    config: OrchestratorConfig,
}

impl<E> FullEvaluationOrchestrator<E>
where
    E: StageExecutor + 'static,
{
    pub fn new(executor: Arc<E>, config: OrchestratorConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs one pass. Never fails: every stage ends in one of the report lists.
    pub fn run_full_evaluation(&self, request: &FullEvaluationRequest) -> FullEvalStatus {
        let mut status = FullEvalStatus::default();
        let candidate_id = &request.candidate_id;

        if CooldownGuard::is_cooldown_active(request.cooldown.as_ref()) {
            info!(%candidate_id, "cooldown active; full evaluation withheld");
            for stage in [
                StageCode::M,
                StageCode::A,
                StageCode::B,
                StageCode::C,
                StageCode::K,
            ] {
                status.record(stage, StageOutcome::Skipped);
            }
            return status;
        }

        let gate = request.gate_context.resolve();
        if let Some(gate) = gate {
            info!(%candidate_id, ?gate, "gate active; gated stages withheld");
        }

        self.stage_m(request, &mut status);
        self.stage_a(request, &mut status);
        let b_done = self.costing_stage(request, gate, StageCode::B, &mut status);
        let c_done = self.costing_stage(request, gate, StageCode::C, &mut status);
        self.stage_k(request, gate, b_done && c_done, &mut status);

        info!(
            %candidate_id,
            ran = status.ran.len(),
            queued = status.queued.len(),
            skipped = status.skipped.len(),
            missing = status.missing.len(),
            "full evaluation pass complete"
        );
        status
    }

    fn stage_m(&self, request: &FullEvaluationRequest, status: &mut FullEvalStatus) {
        let stage = StageCode::M;
        if let Some(current) = request.statuses.get(stage) {
            if current == StageRunStatus::Succeeded || current.is_in_flight() {
                status.record(stage, StageOutcome::Skipped);
                return;
            }
        }

        let lead = request.lead.clone().unwrap_or_default();
        let Some(market_request) = stage_m_request_for(
            &lead,
            &self.config.default_marketplace,
            self.config.stage_m_max_results,
        ) else {
            debug!(candidate_id = %request.candidate_id, "no stage M request derivable from lead");
            status.record(stage, StageOutcome::Missing);
            return;
        };

        let input = StageInput::M(market_request);
        match self
            .executor
            .queue_stage(stage, &request.candidate_id, &input)
        {
            Ok(()) => status.record(stage, StageOutcome::Queued),
            Err(err) => {
                warn!(candidate_id = %request.candidate_id, stage = %stage, error = %err, "stage queue failed");
                status.record(stage, StageOutcome::Missing);
            }
        }
    }

    fn stage_a(&self, request: &FullEvaluationRequest, status: &mut FullEvalStatus) {
        let stage = StageCode::A;
        if request.statuses.is_succeeded(stage) {
            status.record(stage, StageOutcome::Skipped);
            return;
        }

        let input = StageInput::A(self.config.default_inputs.stage_a.clone());
        let succeeded = self.run(request, stage, &input, None);
        let outcome = if succeeded {
            StageOutcome::Ran
        } else {
            StageOutcome::Missing
        };
        status.record(stage, outcome);
    }

    /// B and C share one shape; returns whether the stage is usable for K.
    fn costing_stage(
        &self,
        request: &FullEvaluationRequest,
        gate: Option<FullEvalGate>,
        stage: StageCode,
        status: &mut FullEvalStatus,
    ) -> bool {
        if request.statuses.is_succeeded(stage) {
            status.record(stage, StageOutcome::Skipped);
            return true;
        }
        if gate.is_some() {
            status.record(stage, StageOutcome::Skipped);
            return false;
        }

        let defaults = &self.config.default_inputs;
        let input = match stage {
            StageCode::B => StageInput::B(defaults.stage_b.clone()),
            _ => StageInput::C(defaults.stage_c.clone()),
        };
        if self.run(request, stage, &input, None) {
            status.record(stage, StageOutcome::Ran);
            true
        } else {
            status.record(stage, StageOutcome::Missing);
            false
        }
    }

    fn stage_k(
        &self,
        request: &FullEvaluationRequest,
        gate: Option<FullEvalGate>,
        dependencies_ready: bool,
        status: &mut FullEvalStatus,
    ) {
        let stage = StageCode::K;
        if request.statuses.is_succeeded(stage) || gate.is_some() || !dependencies_ready {
            status.record(stage, StageOutcome::Skipped);
            return;
        }

        let composed = match self
            .executor
            .compose_stage_input(stage, &request.candidate_id)
        {
            Ok(composed) => composed,
            Err(err) => {
                warn!(candidate_id = %request.candidate_id, stage = %stage, error = %err, "stage input composition failed");
                status.record(stage, StageOutcome::Missing);
                return;
            }
        };

        let Some(input) = composed.input else {
            warn!(candidate_id = %request.candidate_id, stage = %stage, "composer returned no input");
            status.record(stage, StageOutcome::Missing);
            return;
        };

        let outcome = if self.run(request, stage, &input, composed.scenario.as_ref()) {
            StageOutcome::Ran
        } else {
            StageOutcome::Missing
        };
        status.record(stage, outcome);
    }

    fn run(
        &self,
        request: &FullEvaluationRequest,
        stage: StageCode,
        input: &StageInput,
        scenario: Option<&serde_json::Value>,
    ) -> bool {
        match self
            .executor
            .run_stage(stage, &request.candidate_id, input, scenario)
        {
            Ok(_) => true,
            Err(err) => {
                warn!(candidate_id = %request.candidate_id, stage = %stage, error = %err, "stage run failed");
                false
            }
        }
    }
}
