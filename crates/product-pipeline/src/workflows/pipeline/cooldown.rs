use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Candidate, Cooldown, CooldownSeverity};

/// Refusal raised when a cooldown suspends all stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("cooldown_active: {reason_code} ({})", .severity.label())]
pub struct CooldownActive {
    pub fingerprint: Option<String>,
    pub reason_code: String,
    pub severity: CooldownSeverity,
    pub recheck_after: Option<DateTime<Utc>>,
    pub what_would_change: Option<String>,
}

impl From<&Cooldown> for CooldownActive {
    fn from(cooldown: &Cooldown) -> Self {
        Self {
            fingerprint: cooldown.fingerprint.clone(),
            reason_code: cooldown.reason_code.clone(),
            severity: cooldown.severity.clone(),
            recheck_after: cooldown.recheck_after,
            what_would_change: cooldown.what_would_change.clone(),
        }
    }
}

/// Checked before any queue or run request is issued for a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooldownGuard;

impl CooldownGuard {
    pub fn is_active(candidate: &Candidate) -> bool {
        Self::is_cooldown_active(candidate.cooldown.as_ref())
    }

    pub fn is_cooldown_active(cooldown: Option<&Cooldown>) -> bool {
        cooldown.map(|cooldown| cooldown.active).unwrap_or(false)
    }

    pub fn ensure_clear(candidate: &Candidate) -> Result<(), CooldownActive> {
        match candidate.cooldown.as_ref() {
            Some(cooldown) if cooldown.active => Err(CooldownActive::from(cooldown)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_with(active: bool) -> Candidate {
        let mut candidate = Candidate::new("cand-cooldown");
        candidate.cooldown = Some(Cooldown {
            id: Some("cd-1".to_string()),
            fingerprint: Some("fp-abc".to_string()),
            reason_code: "supplier_blacklisted".to_string(),
            severity: CooldownSeverity::LongCooldown,
            recheck_after: None,
            what_would_change: Some("New supplier quote".to_string()),
            created_at: None,
            active,
        });
        candidate
    }

    #[test]
    fn absent_cooldown_is_inactive() {
        let candidate = Candidate::new("cand-free");
        assert!(!CooldownGuard::is_active(&candidate));
        assert!(CooldownGuard::ensure_clear(&candidate).is_ok());
    }

    #[test]
    fn guard_reads_the_issuer_flag_only() {
        let inactive = candidate_with(false);
        assert!(!CooldownGuard::is_active(&inactive));

        let active = candidate_with(true);
        let refusal = CooldownGuard::ensure_clear(&active).expect_err("cooldown refuses");
        assert_eq!(refusal.reason_code, "supplier_blacklisted");
        assert_eq!(refusal.severity, CooldownSeverity::LongCooldown);
        assert!(refusal.to_string().starts_with("cooldown_active"));
    }
}
