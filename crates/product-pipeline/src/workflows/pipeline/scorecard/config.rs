use serde::{Deserialize, Serialize};

/// Confidence deductions applied by the scorecard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorecardConfig {
    /// Per required stage whose latest run has not succeeded.
    pub stage_penalty: u32,
    pub gate_penalty: u32,
    pub cooldown_penalty: u32,
}

impl Default for ScorecardConfig {
    fn default() -> Self {
        Self {
            stage_penalty: 10,
            gate_penalty: 15,
            cooldown_penalty: 20,
        }
    }
}
