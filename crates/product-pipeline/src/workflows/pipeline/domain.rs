use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for evaluated product candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for a single stage-run record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageRunId(pub String);

/// Named steps of the candidate evaluation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageCode {
    M,
    A,
    T,
    S,
    N,
    D,
    B,
    C,
    K,
    R,
}

impl StageCode {
    /// Every stage in pipeline order.
    pub const PIPELINE_ORDER: [StageCode; 10] = [
        StageCode::M,
        StageCode::A,
        StageCode::T,
        StageCode::S,
        StageCode::N,
        StageCode::D,
        StageCode::B,
        StageCode::C,
        StageCode::K,
        StageCode::R,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            StageCode::M => "M",
            StageCode::A => "A",
            StageCode::T => "T",
            StageCode::S => "S",
            StageCode::N => "N",
            StageCode::D => "D",
            StageCode::B => "B",
            StageCode::C => "C",
            StageCode::K => "K",
            StageCode::R => "R",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            StageCode::M => "Market research",
            StageCode::A => "Margin pre-check",
            StageCode::T => "Eligibility screening",
            StageCode::S => "Compliance screening",
            StageCode::N => "Supplier negotiation",
            StageCode::D => "Launch asset readiness",
            StageCode::B => "Logistics costing",
            StageCode::C => "Contribution-margin costing",
            StageCode::K => "Capital-return modeling",
            StageCode::R => "Risk & effort scoring",
        }
    }

    /// Stages whose latest output must be usable before this one can be composed.
    pub const fn dependencies(self) -> &'static [StageCode] {
        match self {
            StageCode::K => &[StageCode::B, StageCode::C],
            _ => &[],
        }
    }

    /// Whether an eligibility/compliance gate withholds this stage.
    pub const fn is_gated(self) -> bool {
        matches!(
            self,
            StageCode::N
                | StageCode::D
                | StageCode::B
                | StageCode::C
                | StageCode::K
                | StageCode::R
        )
    }
}

impl fmt::Display for StageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage code '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for StageCode {
    type Err = UnknownStage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        StageCode::PIPELINE_ORDER
            .into_iter()
            .find(|stage| stage.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStage(trimmed.to_string()))
    }
}

/// Lifecycle of a single stage execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl StageRunStatus {
    pub const fn label(self) -> &'static str {
        match self {
            StageRunStatus::Queued => "queued",
            StageRunStatus::Running => "running",
            StageRunStatus::Succeeded => "succeeded",
            StageRunStatus::Failed => "failed",
        }
    }

    pub const fn is_in_flight(self) -> bool {
        matches!(self, StageRunStatus::Queued | StageRunStatus::Running)
    }
}

/// One timestamped execution attempt of one stage for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRun {
    pub id: StageRunId,
    pub candidate_id: CandidateId,
    pub stage: StageCode,
    pub status: StageRunStatus,
    #[serde(default)]
    pub input_version: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Originating lead as captured at intake; read-only input to stage M.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Cooldown lengths issued against a candidate fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CooldownSeverity {
    ShortCooldown,
    LongCooldown,
    Permanent,
    Other(String),
}

impl CooldownSeverity {
    pub fn label(&self) -> &str {
        match self {
            CooldownSeverity::ShortCooldown => "short_cooldown",
            CooldownSeverity::LongCooldown => "long_cooldown",
            CooldownSeverity::Permanent => "permanent",
            CooldownSeverity::Other(value) => value,
        }
    }
}

impl From<String> for CooldownSeverity {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "short_cooldown" => CooldownSeverity::ShortCooldown,
            "long_cooldown" => CooldownSeverity::LongCooldown,
            "permanent" => CooldownSeverity::Permanent,
            _ => CooldownSeverity::Other(value),
        }
    }
}

impl From<CooldownSeverity> for String {
    fn from(value: CooldownSeverity) -> Self {
        value.label().to_string()
    }
}

/// Suspension tied to a candidate's identity fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cooldown {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub reason_code: String,
    pub severity: CooldownSeverity,
    #[serde(default)]
    pub recheck_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub what_would_change: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Cooldown {
    /// Issuer rule for `active`: permanent cooldowns never lapse, others lapse
    /// once `recheck_after` has passed.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.severity == CooldownSeverity::Permanent {
            return true;
        }
        match self.recheck_after {
            Some(recheck_after) => now < recheck_after,
            None => true,
        }
    }
}

/// The unit being evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub stage_status: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub decision_reason: Option<String>,
    #[serde(default)]
    pub cooldown: Option<Cooldown>,
    #[serde(default)]
    pub lead: Option<LeadSnapshot>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: CandidateId(id.into()),
            lead_id: None,
            fingerprint: None,
            stage_status: None,
            decision: None,
            decision_reason: None,
            cooldown: None,
            lead: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Latest status per stage; stages never run are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageStatuses(BTreeMap<StageCode, StageRunStatus>);

impl StageStatuses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: StageCode) -> Option<StageRunStatus> {
        self.0.get(&stage).copied()
    }

    pub fn set(&mut self, stage: StageCode, status: StageRunStatus) {
        self.0.insert(stage, status);
    }

    pub fn with(mut self, stage: StageCode, status: StageRunStatus) -> Self {
        self.set(stage, status);
        self
    }

    pub fn is_succeeded(&self, stage: StageCode) -> bool {
        self.get(stage) == Some(StageRunStatus::Succeeded)
    }
}

/// Human decision choices accepted from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionChoice {
    Advance,
    Review,
    Reject,
    Pause,
}

impl DecisionChoice {
    /// Maps free-text decisions, including legacy synonyms, onto a choice.
    pub fn normalize(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "advance" | "approved" => Some(DecisionChoice::Advance),
            "review" | "needs_review" => Some(DecisionChoice::Review),
            "reject" | "rejected" | "kill" => Some(DecisionChoice::Reject),
            "pause" | "paused" | "cooldown" | "hold" => Some(DecisionChoice::Pause),
            _ => None,
        }
    }

    /// Value persisted on the candidate record.
    pub const fn serialized(self) -> &'static str {
        match self {
            DecisionChoice::Advance => "advance",
            DecisionChoice::Review => "review",
            DecisionChoice::Reject => "rejected",
            DecisionChoice::Pause => "paused",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DecisionChoice::Advance => "advance",
            DecisionChoice::Review => "review",
            DecisionChoice::Reject => "reject",
            DecisionChoice::Pause => "pause",
        }
    }
}
