use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use product_pipeline::workflows::pipeline::{
    Candidate, CandidateId, CandidateStore, Cashflow, ComposedInput, ExecutorError, StageAInput,
    StageBInput, StageCInput, StageCode, StageExecutor, StageHistory, StageInput, StageKInput,
    StageRun, StageRunId, StageRunOutcome, StageRunStatus, StoreError,
};
use product_pipeline::workflows::pipeline::payload::{StageBSummary, StageCSummary};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

static STAGE_RUN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_stage_run_id() -> StageRunId {
    let id = STAGE_RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    StageRunId(format!("run-{id:06}"))
}

/// Candidate records plus an append-only stage-run log.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCandidateStore {
    candidates: Arc<Mutex<HashMap<CandidateId, Candidate>>>,
    runs: Arc<Mutex<Vec<StageRun>>>,
}

impl InMemoryCandidateStore {
    pub(crate) fn insert_candidate(&self, candidate: Candidate) {
        let mut guard = self.candidates.lock().expect("candidate mutex poisoned");
        guard.insert(candidate.id.clone(), candidate);
    }

    pub(crate) fn append_run(&self, run: StageRun) {
        let mut guard = self.runs.lock().expect("stage run mutex poisoned");
        guard.push(run);
    }

    pub(crate) fn history(&self, id: &CandidateId) -> StageHistory {
        let guard = self.runs.lock().expect("stage run mutex poisoned");
        StageHistory::new(
            guard
                .iter()
                .filter(|run| &run.candidate_id == id)
                .cloned()
                .collect(),
        )
    }
}

impl CandidateStore for InMemoryCandidateStore {
    /// Cooldown `active` flags are refreshed on read against the wall clock.
    fn fetch_candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError> {
        let guard = self.candidates.lock().expect("candidate mutex poisoned");
        let now = Utc::now();
        Ok(guard.get(id).cloned().map(|mut candidate| {
            if let Some(cooldown) = candidate.cooldown.as_mut() {
                cooldown.active = cooldown.is_active_at(now);
            }
            candidate
        }))
    }

    fn stage_runs(&self, id: &CandidateId) -> Result<Vec<StageRun>, StoreError> {
        Ok(self.history(id).runs().to_vec())
    }

    fn update_decision(
        &self,
        id: &CandidateId,
        decision: Option<String>,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        let mut guard = self.candidates.lock().expect("candidate mutex poisoned");
        let candidate = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        candidate.decision = decision;
        candidate.decision_reason = reason;
        candidate.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// Executes stages in-process and records each attempt in the store.
#[derive(Clone)]
pub(crate) struct LoopbackStageExecutor {
    store: Arc<InMemoryCandidateStore>,
}

impl LoopbackStageExecutor {
    pub(crate) fn new(store: Arc<InMemoryCandidateStore>) -> Self {
        Self { store }
    }

    fn record(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
        status: StageRunStatus,
        input: &StageInput,
        output: Option<Value>,
        now: DateTime<Utc>,
    ) {
        let finished = (status == StageRunStatus::Succeeded).then_some(now);
        self.store.append_run(StageRun {
            id: next_stage_run_id(),
            candidate_id: candidate_id.clone(),
            stage,
            status,
            input_version: Some("loopback-v1".to_string()),
            input: input.to_payload(),
            output,
            error: None,
            created_at: now,
            started_at: finished,
            finished_at: finished,
        });
    }
}

impl StageExecutor for LoopbackStageExecutor {
    fn queue_stage(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
        request: &StageInput,
    ) -> Result<(), ExecutorError> {
        self.record(
            stage,
            candidate_id,
            StageRunStatus::Queued,
            request,
            None,
            Utc::now(),
        );
        Ok(())
    }

    fn run_stage(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
        input: &StageInput,
        scenario: Option<&Value>,
    ) -> Result<StageRunOutcome, ExecutorError> {
        if input.stage() != stage {
            return Err(ExecutorError::Rejected {
                code: "stage_input_mismatch".to_string(),
            });
        }

        let summary = summarize(input)?;
        let mut output = json!({ "summary": summary });
        if let Some(scenario) = scenario {
            output["scenario"] = scenario.clone();
        }
        self.record(
            stage,
            candidate_id,
            StageRunStatus::Succeeded,
            input,
            Some(output.clone()),
            Utc::now(),
        );
        Ok(StageRunOutcome {
            output: Some(output),
        })
    }

    fn compose_stage_input(
        &self,
        stage: StageCode,
        candidate_id: &CandidateId,
    ) -> Result<ComposedInput, ExecutorError> {
        if stage != StageCode::K {
            return Ok(ComposedInput::default());
        }

        let history = self.store.history(candidate_id);
        let logistics = history
            .latest_summary::<StageBSummary>()
            .and_then(|summary| summary.total_landed_cost_cents)
            .ok_or(ExecutorError::MissingPrerequisite {
                stage: StageCode::B,
            })?;
        let units = history
            .latest_succeeded(StageCode::B)
            .and_then(|run| run.input.get("unitsPlanned"))
            .and_then(Value::as_u64)
            .and_then(|units| u32::try_from(units).ok())
            .unwrap_or(1)
            .max(1);
        let contribution = history
            .latest_summary::<StageCSummary>()
            .and_then(|summary| summary.contribution_per_unit_cents)
            .ok_or(ExecutorError::MissingPrerequisite {
                stage: StageCode::C,
            })?;

        Ok(ComposedInput {
            input: Some(StageInput::K(capital_plan(logistics, contribution, units)?)),
            scenario: Some(json!({ "name": "base", "source": "B+C" })),
        })
    }
}

fn amount_overflow() -> ExecutorError {
    ExecutorError::Rejected {
        code: "amount_overflow".to_string(),
    }
}

/// Outlay on day 0, then revenue spread over four monthly settlements.
fn capital_plan(
    landed_total: i64,
    contribution_per_unit: i64,
    units: u32,
) -> Result<StageKInput, ExecutorError> {
    let settlement = contribution_per_unit
        .checked_mul(i64::from(units))
        .and_then(|contribution| contribution.checked_add(landed_total))
        .ok_or_else(amount_overflow)?
        / 4;
    let outlay = landed_total.checked_neg().ok_or_else(amount_overflow)?;
    let mut cashflows = vec![Cashflow {
        day: 0,
        amount_cents: outlay,
    }];
    cashflows.extend((1..=4).map(|month| Cashflow {
        day: 30 * month,
        amount_cents: settlement,
    }));
    Ok(StageKInput {
        horizon_days: 180,
        cashflows,
        units_planned: Some(units),
        units_sold_by_day: None,
        sell_through_target_pct: None,
        salvage_value_cents: None,
    })
}

fn summarize(input: &StageInput) -> Result<Value, ExecutorError> {
    match input {
        StageInput::A(input) => margin_summary(input),
        StageInput::B(input) => logistics_summary(input),
        StageInput::C(input) => contribution_summary(input),
        StageInput::K(input) => capital_summary(input),
        StageInput::M(request) => Ok(json!({ "requestKind": request.kind() })),
        StageInput::Opaque { payload, .. } => Ok(payload
            .get("summary")
            .cloned()
            .unwrap_or_else(|| json!({}))),
    }
}

fn pct_of(cents: i64, pct: f64) -> i64 {
    (cents as f64 * pct).round() as i64
}

/// `from` minus every deduction, failing instead of wrapping.
fn net_of(from: i64, deductions: &[i64]) -> Result<i64, ExecutorError> {
    deductions
        .iter()
        .try_fold(from, |net, deduction| net.checked_sub(*deduction))
        .ok_or_else(amount_overflow)
}

fn margin_summary(input: &StageAInput) -> Result<Value, ExecutorError> {
    let fees = pct_of(input.sale_price_cents, input.marketplace_fee_pct);
    let margin = net_of(
        input.sale_price_cents,
        &[input.unit_cost_cents, input.shipping_cost_cents, fees],
    )?;
    let margin_pct = if input.sale_price_cents > 0 {
        margin as f64 / input.sale_price_cents as f64
    } else {
        0.0
    };
    let action = if margin_pct >= 0.3 { "PROCEED" } else { "REVIEW" };
    Ok(json!({ "action": action, "marginPct": margin_pct }))
}

fn logistics_summary(input: &StageBInput) -> Result<Value, ExecutorError> {
    let units = i64::from(input.units_planned.max(1));
    let freight_per_unit = input.freight_cost_cents / units;
    let duty = pct_of(freight_per_unit, input.duty_rate_pct);
    let landed = freight_per_unit
        .checked_add(duty)
        .ok_or_else(amount_overflow)?;
    let total = landed.checked_mul(units).ok_or_else(amount_overflow)?;
    Ok(json!({
        "landedCostPerUnitCents": landed,
        "totalLandedCostCents": total,
    }))
}

fn contribution_summary(input: &StageCInput) -> Result<Value, ExecutorError> {
    let sale = input.sale_price_cents;
    let contribution = net_of(
        sale,
        &[
            input.landed_cost_per_unit_cents,
            pct_of(sale, input.marketplace_fee_pct),
            input.fulfillment_fee_cents,
            input.ads_per_unit_cents,
            pct_of(sale, input.returns_rate_pct),
        ],
    )?;
    let margin_pct = if sale > 0 {
        contribution as f64 / sale as f64
    } else {
        0.0
    };
    Ok(json!({
        "contributionPerUnitCents": contribution,
        "contributionMarginPct": margin_pct,
    }))
}

fn capital_summary(input: &StageKInput) -> Result<Value, ExecutorError> {
    let mut flows = input.cashflows.clone();
    flows.sort_by_key(|flow| flow.day);

    let mut cumulative = 0_i64;
    let mut peak_outlay = 0_i64;
    let mut payback_day = None;
    for flow in &flows {
        cumulative = cumulative
            .checked_add(flow.amount_cents)
            .ok_or_else(amount_overflow)?;
        peak_outlay = peak_outlay.min(cumulative);
        if payback_day.is_none() && peak_outlay < 0 && cumulative >= 0 {
            payback_day = Some(flow.day);
        }
    }
    let peak_outlay = peak_outlay.checked_neg().ok_or_else(amount_overflow)?;
    Ok(json!({
        "peakCashOutlayCents": peak_outlay,
        "paybackDay": payback_day,
        "returnBand": if payback_day.is_some() { "ok" } else { "slow" },
    }))
}
