mod config;
mod policy;
mod rules;

pub use config::ScorecardConfig;
pub use policy::{Recommendation, ScoreReason};

use serde::{Deserialize, Serialize};

use super::domain::{Candidate, CandidateId, DecisionChoice, StageCode};
use super::gate::GateCode;
use super::history::StageHistory;
use super::payload::Cents;
use policy::{collect_reasons, decide_recommendation};
use rules::{collect_signals, score_confidence_value};

/// Stateless scorer turning stage-run history into a decision scorecard.
pub struct ScorecardEngine {
    config: ScorecardConfig,
}

impl ScorecardEngine {
    pub fn new(config: ScorecardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorecardConfig {
        &self.config
    }

    pub fn score(&self, history: &StageHistory, candidate: &Candidate) -> Scorecard {
        score_confidence(history, candidate, &self.config)
    }
}

/// Coarse reading of the confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub const fn from_confidence(confidence: u8) -> Self {
        if confidence >= 70 {
            ConfidenceBand::High
        } else if confidence >= 40 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        }
    }
}

/// Money figures surfaced next to the recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub contribution_per_unit_cents: Option<Cents>,
    pub contribution_margin_pct: Option<f64>,
    pub peak_cash_outlay_cents: Option<Cents>,
    pub payback_day: Option<i64>,
}

/// Read-only decision view for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub candidate_id: CandidateId,
    pub confidence: u8,
    pub confidence_band: ConfidenceBand,
    pub recommendation: Recommendation,
    pub reasons: Vec<ScoreReason>,
    pub gate: Option<GateCode>,
    pub missing_stages: Vec<StageCode>,
    pub next_stage: Option<StageCode>,
    pub risk_band: Option<String>,
    pub effort_band: Option<String>,
    pub key_metrics: KeyMetrics,
    pub human_decision: Option<DecisionChoice>,
    pub decision_reason: Option<String>,
}

impl Scorecard {
    pub fn reason_messages(&self) -> Vec<String> {
        self.reasons.iter().map(ScoreReason::message).collect()
    }
}

/// Scores a candidate purely from its history, cooldown and decision fields.
pub fn score_confidence(
    history: &StageHistory,
    candidate: &Candidate,
    config: &ScorecardConfig,
) -> Scorecard {
    let signals = collect_signals(history, candidate);
    let confidence = score_confidence_value(&signals, config);
    let recommendation = decide_recommendation(&signals);
    let reasons = collect_reasons(&signals);

    Scorecard {
        candidate_id: candidate.id.clone(),
        confidence,
        confidence_band: ConfidenceBand::from_confidence(confidence),
        recommendation,
        reasons,
        gate: signals.gate,
        missing_stages: signals.missing_stages,
        next_stage: history.next_incomplete(),
        risk_band: signals.risk_band,
        effort_band: signals.effort_band,
        key_metrics: signals.key_metrics,
        human_decision: candidate
            .decision
            .as_deref()
            .and_then(DecisionChoice::normalize),
        decision_reason: candidate
            .decision_reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string),
    }
}
