use serde::{Deserialize, Serialize};

use super::super::gate::GateCode;
use super::rules::ScoreSignals;

/// Computed pipeline recommendation; independent of the human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Advance,
    Review,
    Reject,
    Pause,
}

impl Recommendation {
    pub const fn label(self) -> &'static str {
        match self {
            Recommendation::Advance => "advance",
            Recommendation::Review => "review",
            Recommendation::Reject => "reject",
            Recommendation::Pause => "pause",
        }
    }
}

/// Explanation attached to a scorecard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ScoreReason {
    CooldownActive { reason_code: String },
    EligibilityBlocked,
    EligibilityReview,
    ComplianceBlocked,
    MissingProfit,
    MissingCash,
    MissingPayback,
}

impl ScoreReason {
    pub fn message(&self) -> String {
        match self {
            ScoreReason::CooldownActive { reason_code } => {
                format!("Cooldown active ({reason_code}).")
            }
            ScoreReason::EligibilityBlocked => GateCode::StageTBlocked.explanation().to_string(),
            ScoreReason::EligibilityReview => {
                GateCode::StageTNeedsReview.explanation().to_string()
            }
            ScoreReason::ComplianceBlocked => GateCode::StageSBlocked.explanation().to_string(),
            ScoreReason::MissingProfit => "Contribution per unit is not available yet.".to_string(),
            ScoreReason::MissingCash => "Peak cash outlay is not available yet.".to_string(),
            ScoreReason::MissingPayback => "Payback day is not available yet.".to_string(),
        }
    }
}

impl From<GateCode> for ScoreReason {
    fn from(gate: GateCode) -> Self {
        match gate {
            GateCode::StageTBlocked => ScoreReason::EligibilityBlocked,
            GateCode::StageTNeedsReview => ScoreReason::EligibilityReview,
            GateCode::StageSBlocked => ScoreReason::ComplianceBlocked,
        }
    }
}

pub(crate) fn decide_recommendation(signals: &ScoreSignals) -> Recommendation {
    if signals.cooldown_active() {
        return Recommendation::Pause;
    }

    if let Some(gate) = signals.gate {
        if gate.is_blocked() {
            return Recommendation::Reject;
        }
        if gate.is_review() {
            return Recommendation::Review;
        }
    }

    if signals.high_risk() {
        return Recommendation::Review;
    }

    let metrics = &signals.key_metrics;
    if metrics.contribution_per_unit_cents.is_none() || metrics.peak_cash_outlay_cents.is_none() {
        return Recommendation::Review;
    }

    Recommendation::Advance
}

pub(crate) fn collect_reasons(signals: &ScoreSignals) -> Vec<ScoreReason> {
    let mut reasons = Vec::new();
    if let Some(reason_code) = &signals.cooldown_reason {
        reasons.push(ScoreReason::CooldownActive {
            reason_code: reason_code.clone(),
        });
    }
    if let Some(gate) = signals.gate {
        reasons.push(ScoreReason::from(gate));
    }

    let metrics = &signals.key_metrics;
    if metrics.contribution_per_unit_cents.is_none() {
        reasons.push(ScoreReason::MissingProfit);
    }
    if metrics.peak_cash_outlay_cents.is_none() {
        reasons.push(ScoreReason::MissingCash);
    }
    if metrics.payback_day.is_none() {
        reasons.push(ScoreReason::MissingPayback);
    }
    reasons
}
