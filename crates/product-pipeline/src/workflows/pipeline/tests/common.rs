use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::workflows::pipeline::domain::{
    Candidate, CandidateId, Cooldown, CooldownSeverity, LeadSnapshot, StageCode, StageRun,
    StageRunId, StageRunStatus,
};
use crate::workflows::pipeline::executor::{
    ComposedInput, ExecutorError, StageExecutor, StageRunOutcome,
};
use crate::workflows::pipeline::payload::{Cashflow, StageInput, StageKInput};
use crate::workflows::pipeline::store::{CandidateStore, StoreError};
use crate::workflows::pipeline::{
    pipeline_router, OrchestratorConfig, PipelineService, ScorecardConfig,
};

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
}

pub(super) fn candidate_id(value: &str) -> CandidateId {
    CandidateId(value.to_string())
}

pub(super) fn lead(title: Option<&str>, url: Option<&str>) -> LeadSnapshot {
    LeadSnapshot {
        id: Some("lead-77".to_string()),
        title: title.map(str::to_string),
        source: Some("sourcing_sheet".to_string()),
        url: url.map(str::to_string),
    }
}

pub(super) fn candidate(id: &str) -> Candidate {
    let mut candidate = Candidate::new(id);
    candidate.lead = Some(lead(Some("Bamboo desk organizer"), None));
    candidate.fingerprint = Some(format!("fp-{id}"));
    candidate
}

pub(super) fn active_cooldown() -> Cooldown {
    Cooldown {
        id: Some("cd-9".to_string()),
        fingerprint: Some("fp-cooldown".to_string()),
        reason_code: "margin_too_thin".to_string(),
        severity: CooldownSeverity::ShortCooldown,
        recheck_after: Some(base_time() + Duration::days(14)),
        what_would_change: Some("Supplier price below 5 EUR".to_string()),
        created_at: Some(base_time()),
        active: true,
    }
}

pub(super) fn cooled_candidate(id: &str) -> Candidate {
    let mut candidate = candidate(id);
    candidate.cooldown = Some(active_cooldown());
    candidate
}

pub(super) fn run(
    candidate: &str,
    stage: StageCode,
    status: StageRunStatus,
    minute: i64,
    output: Value,
) -> StageRun {
    StageRun {
        id: StageRunId(format!("{candidate}-{stage}-{minute}")),
        candidate_id: candidate_id(candidate),
        stage,
        status,
        input_version: Some("v1".to_string()),
        input: Value::Null,
        output: Some(output),
        error: None,
        created_at: base_time() + Duration::minutes(minute),
        started_at: None,
        finished_at: None,
    }
}

pub(super) fn succeeded(candidate: &str, stage: StageCode, minute: i64, summary: Value) -> StageRun {
    run(
        candidate,
        stage,
        StageRunStatus::Succeeded,
        minute,
        json!({ "summary": summary }),
    )
}

pub(super) fn eligibility(candidate: &str, minute: i64, decision: &str) -> StageRun {
    succeeded(candidate, StageCode::T, minute, json!({ "decision": decision }))
}

pub(super) fn compliance(candidate: &str, minute: i64, risk: &str, action: &str) -> StageRun {
    succeeded(
        candidate,
        StageCode::S,
        minute,
        json!({ "overallRisk": risk, "action": action }),
    )
}

/// Every required stage succeeded with clean screening and full money figures.
pub(super) fn complete_history(candidate: &str) -> Vec<StageRun> {
    vec![
        succeeded(candidate, StageCode::M, 0, json!({ "listingCount": 18 })),
        eligibility(candidate, 1, "allowed"),
        compliance(candidate, 2, "low", "ALLOW"),
        succeeded(
            candidate,
            StageCode::B,
            3,
            json!({ "landedCostPerUnitCents": 880, "totalLandedCostCents": 440000 }),
        ),
        succeeded(
            candidate,
            StageCode::C,
            4,
            json!({ "contributionPerUnitCents": "640", "contributionMarginPct": 0.26 }),
        ),
        succeeded(
            candidate,
            StageCode::K,
            5,
            json!({ "peakCashOutlayCents": 452000, "paybackDay": 63 }),
        ),
        succeeded(
            candidate,
            StageCode::R,
            6,
            json!({ "riskBand": "low", "effortBand": "medium" }),
        ),
    ]
}

pub(super) fn stage_k_input() -> StageInput {
    StageInput::K(StageKInput {
        horizon_days: 180,
        cashflows: vec![
            Cashflow {
                day: 0,
                amount_cents: -452_000,
            },
            Cashflow {
                day: 63,
                amount_cents: 480_000,
            },
        ],
        units_planned: Some(500),
        units_sold_by_day: None,
        sell_through_target_pct: None,
        salvage_value_cents: None,
    })
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    candidates: Arc<Mutex<HashMap<CandidateId, Candidate>>>,
    runs: Arc<Mutex<Vec<StageRun>>>,
}

impl MemoryStore {
    pub(super) fn with_candidate(candidate: Candidate, runs: Vec<StageRun>) -> Self {
        let store = Self::default();
        store.insert(candidate, runs);
        store
    }

    pub(super) fn insert(&self, candidate: Candidate, runs: Vec<StageRun>) {
        self.candidates
            .lock()
            .expect("store mutex poisoned")
            .insert(candidate.id.clone(), candidate);
        self.runs.lock().expect("store mutex poisoned").extend(runs);
    }

    pub(super) fn candidate(&self, id: &str) -> Option<Candidate> {
        self.candidates
            .lock()
            .expect("store mutex poisoned")
            .get(&candidate_id(id))
            .cloned()
    }
}

impl CandidateStore for MemoryStore {
    fn fetch_candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        let guard = self.candidates.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn stage_runs(&self, id: &CandidateId) -> Result<Vec<StageRun>, StoreError> {
        let guard = self.runs.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|run| &run.candidate_id == id)
            .cloned()
            .collect())
    }

    fn update_decision(
        &self,
        id: &CandidateId,
        decision: Option<String>,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        let mut guard = self.candidates.lock().expect("store mutex poisoned");
        let candidate = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        candidate.decision = decision;
        candidate.decision_reason = reason;
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl CandidateStore for UnavailableStore {
    fn fetch_candidate(&self, _id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn stage_runs(&self, _id: &CandidateId) -> Result<Vec<StageRun>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn update_decision(
        &self,
        _id: &CandidateId,
        _decision: Option<String>,
        _reason: Option<String>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ExecutorOp {
    Queue,
    Run,
    Compose,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct ExecutorCall {
    pub(super) op: ExecutorOp,
    pub(super) stage: StageCode,
    pub(super) input: Option<StageInput>,
    pub(super) scenario: Option<Value>,
}

/// Executor double that records every call and fails where told to.
#[derive(Clone)]
pub(super) struct ScriptedExecutor {
    calls: Arc<Mutex<Vec<ExecutorCall>>>,
    failing_runs: HashSet<StageCode>,
    fail_queue: bool,
    composed: Result<ComposedInput, ExecutorError>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            failing_runs: HashSet::new(),
            fail_queue: false,
            composed: Ok(ComposedInput {
                input: Some(stage_k_input()),
                scenario: Some(json!({ "name": "base" })),
            }),
        }
    }
}

impl ScriptedExecutor {
    pub(super) fn failing_run(mut self, stage: StageCode) -> Self {
        self.failing_runs.insert(stage);
        self
    }

    pub(super) fn failing_queue(mut self) -> Self {
        self.fail_queue = true;
        self
    }

    pub(super) fn composing(mut self, composed: Result<ComposedInput, ExecutorError>) -> Self {
        self.composed = composed;
        self
    }

    pub(super) fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().expect("executor mutex poisoned").clone()
    }

    pub(super) fn ops(&self) -> Vec<(ExecutorOp, StageCode)> {
        self.calls()
            .into_iter()
            .map(|call| (call.op, call.stage))
            .collect()
    }

    fn record(
        &self,
        op: ExecutorOp,
        stage: StageCode,
        input: Option<&StageInput>,
        scenario: Option<&Value>,
    ) {
        self.calls
            .lock()
            .expect("executor mutex poisoned")
            .push(ExecutorCall {
                op,
                stage,
                input: input.cloned(),
                scenario: scenario.cloned(),
            });
    }
}

impl StageExecutor for ScriptedExecutor {
    fn queue_stage(
        &self,
        stage: StageCode,
        _candidate_id: &CandidateId,
        request: &StageInput,
    ) -> Result<(), ExecutorError> {
        self.record(ExecutorOp::Queue, stage, Some(request), None);
        if self.fail_queue {
            return Err(ExecutorError::Transport("queue offline".to_string()));
        }
        Ok(())
    }

    fn run_stage(
        &self,
        stage: StageCode,
        _candidate_id: &CandidateId,
        input: &StageInput,
        scenario: Option<&Value>,
    ) -> Result<StageRunOutcome, ExecutorError> {
        self.record(ExecutorOp::Run, stage, Some(input), scenario);
        if self.failing_runs.contains(&stage) {
            return Err(ExecutorError::Rejected {
                code: "stage_failed".to_string(),
            });
        }
        Ok(StageRunOutcome {
            output: Some(json!({ "summary": { "stage": stage.code() } })),
        })
    }

    fn compose_stage_input(
        &self,
        stage: StageCode,
        _candidate_id: &CandidateId,
    ) -> Result<ComposedInput, ExecutorError> {
        self.record(ExecutorOp::Compose, stage, None, None);
        self.composed.clone()
    }
}

pub(super) fn build_service(
    store: MemoryStore,
    executor: ScriptedExecutor,
) -> (
    PipelineService<MemoryStore, ScriptedExecutor>,
    Arc<MemoryStore>,
    Arc<ScriptedExecutor>,
) {
    let store = Arc::new(store);
    let executor = Arc::new(executor);
    let service = PipelineService::new(
        store.clone(),
        executor.clone(),
        OrchestratorConfig::default(),
        ScorecardConfig::default(),
    );
    (service, store, executor)
}

pub(super) fn pipeline_router_with_service(
    service: PipelineService<MemoryStore, ScriptedExecutor>,
) -> axum::Router {
    pipeline_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
