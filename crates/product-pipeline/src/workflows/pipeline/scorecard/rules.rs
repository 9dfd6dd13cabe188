use super::super::cooldown::CooldownGuard;
use super::super::domain::{Candidate, StageCode};
use super::super::gate::{resolve_gate, GateCode};
use super::super::history::{StageHistory, REQUIRED_STAGES};
use super::super::payload::{StageCSummary, StageKSummary, StageRSummary, StageSSummary};
use super::config::ScorecardConfig;
use super::KeyMetrics;

/// Facts the recommendation policy reads, extracted once from history.
pub(crate) struct ScoreSignals {
    pub missing_stages: Vec<StageCode>,
    pub gate: Option<GateCode>,
    pub cooldown_reason: Option<String>,
    pub risk_band: Option<String>,
    pub effort_band: Option<String>,
    pub key_metrics: KeyMetrics,
}

impl ScoreSignals {
    pub fn cooldown_active(&self) -> bool {
        self.cooldown_reason.is_some()
    }

    pub fn high_risk(&self) -> bool {
        self.risk_band
            .as_deref()
            .map(|band| band.trim().eq_ignore_ascii_case("high"))
            .unwrap_or(false)
    }
}

pub(crate) fn collect_signals(history: &StageHistory, candidate: &Candidate) -> ScoreSignals {
    let contribution = history.latest_summary::<StageCSummary>().unwrap_or_default();
    let capital = history.latest_summary::<StageKSummary>().unwrap_or_default();
    let scoring = history.latest_summary::<StageRSummary>().unwrap_or_default();

    let risk_band = scoring.risk_band.clone().or_else(|| {
        history
            .latest_summary::<StageSSummary>()
            .and_then(|summary| summary.overall_risk)
    });

    let cooldown_reason = candidate
        .cooldown
        .as_ref()
        .filter(|_| CooldownGuard::is_active(candidate))
        .map(|cooldown| cooldown.reason_code.clone());

    ScoreSignals {
        missing_stages: history.missing(&REQUIRED_STAGES),
        gate: resolve_gate(history),
        cooldown_reason,
        risk_band,
        effort_band: scoring.effort_band,
        key_metrics: KeyMetrics {
            contribution_per_unit_cents: contribution.contribution_per_unit_cents,
            contribution_margin_pct: contribution.contribution_margin_pct,
            peak_cash_outlay_cents: capital.peak_cash_outlay_cents,
            payback_day: capital.payback_day,
        },
    }
}

pub(crate) fn score_confidence_value(signals: &ScoreSignals, config: &ScorecardConfig) -> u8 {
    let missing = u32::try_from(signals.missing_stages.len()).unwrap_or(u32::MAX);
    let mut deduction = config.stage_penalty.saturating_mul(missing);
    if signals.gate.is_some() {
        deduction = deduction.saturating_add(config.gate_penalty);
    }
    if signals.cooldown_active() {
        deduction = deduction.saturating_add(config.cooldown_penalty);
    }
    let confidence = 100_u32.saturating_sub(deduction).min(100);
    u8::try_from(confidence).unwrap_or(100)
}
