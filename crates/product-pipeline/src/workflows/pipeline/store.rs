use super::domain::{Candidate, CandidateId, StageRun};

/// Storage abstraction owning candidate and stage-run records.
pub trait CandidateStore: Send + Sync {
    fn fetch_candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, StoreError>;
    /// Full append-only history for the candidate, in any order.
    fn stage_runs(&self, id: &CandidateId) -> Result<Vec<StageRun>, StoreError>;
    fn update_decision(
        &self,
        id: &CandidateId,
        decision: Option<String>,
        reason: Option<String>,
    ) -> Result<(), StoreError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
