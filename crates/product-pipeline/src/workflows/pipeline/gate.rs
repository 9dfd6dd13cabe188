use serde::{Deserialize, Serialize};

use super::history::StageHistory;
use super::payload::{StageSSummary, StageTSummary};

/// Reason eligibility or compliance screening is holding the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCode {
    StageTBlocked,
    StageTNeedsReview,
    StageSBlocked,
}

impl GateCode {
    pub const fn label(self) -> &'static str {
        match self {
            GateCode::StageTBlocked => "stage_t_blocked",
            GateCode::StageTNeedsReview => "stage_t_needs_review",
            GateCode::StageSBlocked => "stage_s_blocked",
        }
    }

    pub const fn is_blocked(self) -> bool {
        matches!(self, GateCode::StageTBlocked | GateCode::StageSBlocked)
    }

    pub const fn is_review(self) -> bool {
        matches!(self, GateCode::StageTNeedsReview)
    }

    pub const fn explanation(self) -> &'static str {
        match self {
            GateCode::StageTBlocked => "Eligibility screening blocked this candidate.",
            GateCode::StageTNeedsReview => "Eligibility screening requires manual review.",
            GateCode::StageSBlocked => "Compliance screening flagged a blocking risk.",
        }
    }
}

fn eq_ignore_case(value: Option<&str>, expected: &str) -> bool {
    value
        .map(|value| value.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

/// Eligibility gate from the latest succeeded T run.
pub fn resolve_stage_t_gate(history: &StageHistory) -> Option<GateCode> {
    let summary = history.latest_summary::<StageTSummary>()?;
    let decision = summary.decision.as_deref();
    if eq_ignore_case(decision, "blocked") {
        Some(GateCode::StageTBlocked)
    } else if eq_ignore_case(decision, "needs_review") {
        Some(GateCode::StageTNeedsReview)
    } else {
        None
    }
}

/// Combined gate; an eligibility result short-circuits the compliance check.
pub fn resolve_stage_ts_gate(history: &StageHistory) -> Option<GateCode> {
    if let Some(gate) = resolve_stage_t_gate(history) {
        return Some(gate);
    }

    let summary = history.latest_summary::<StageSSummary>()?;
    if eq_ignore_case(summary.overall_risk.as_deref(), "high")
        || eq_ignore_case(summary.action.as_deref(), "block")
    {
        Some(GateCode::StageSBlocked)
    } else {
        None
    }
}

pub fn resolve_gate(history: &StageHistory) -> Option<GateCode> {
    resolve_stage_ts_gate(history)
}

/// Gate inputs handed to a full-evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateContext {
    #[serde(default)]
    pub eligibility_decision: Option<String>,
    #[serde(default)]
    pub compliance_risk: Option<String>,
    #[serde(default)]
    pub compliance_action: Option<String>,
}

/// Coarse gate state used for orchestration decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullEvalGate {
    Blocked,
    Review,
}

impl GateContext {
    pub fn from_history(history: &StageHistory) -> Self {
        let eligibility = history.latest_summary::<StageTSummary>();
        let compliance = history.latest_summary::<StageSSummary>();
        Self {
            eligibility_decision: eligibility.and_then(|summary| summary.decision),
            compliance_risk: compliance
                .as_ref()
                .and_then(|summary| summary.overall_risk.clone()),
            compliance_action: compliance.and_then(|summary| summary.action),
        }
    }

    pub fn resolve(&self) -> Option<FullEvalGate> {
        let eligibility = self.eligibility_decision.as_deref();
        if eq_ignore_case(eligibility, "blocked") {
            return Some(FullEvalGate::Blocked);
        }
        if eq_ignore_case(eligibility, "needs_review") {
            return Some(FullEvalGate::Review);
        }
        if eq_ignore_case(self.compliance_risk.as_deref(), "high")
            || eq_ignore_case(self.compliance_action.as_deref(), "block")
        {
            return Some(FullEvalGate::Blocked);
        }
        None
    }
}
