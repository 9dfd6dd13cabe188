use super::domain::{StageCode, StageRun, StageRunStatus, StageStatuses};
use super::payload::SummaryRecord;

/// Stages required by the decision scorecard before a candidate can advance.
pub const REQUIRED_STAGES: [StageCode; 7] = [
    StageCode::M,
    StageCode::T,
    StageCode::S,
    StageCode::B,
    StageCode::C,
    StageCode::K,
    StageCode::R,
];

/// Append-ordered stage-run history for one candidate.
///
/// Only the most recent run of a stage counts. Runs are ordered by
/// `created_at`; runs sharing a timestamp keep their append order, so the one
/// appended last wins.
#[derive(Debug, Clone, Default)]
pub struct StageHistory {
    runs: Vec<StageRun>,
}

impl StageHistory {
    pub fn new(mut runs: Vec<StageRun>) -> Self {
        runs.sort_by_key(|run| run.created_at);
        Self { runs }
    }

    pub fn runs(&self) -> &[StageRun] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn latest(&self, stage: StageCode) -> Option<&StageRun> {
        self.runs.iter().rev().find(|run| run.stage == stage)
    }

    pub fn latest_succeeded(&self, stage: StageCode) -> Option<&StageRun> {
        self.runs
            .iter()
            .rev()
            .find(|run| run.stage == stage && run.status == StageRunStatus::Succeeded)
    }

    /// Summary of the latest succeeded run for the record's stage.
    pub fn latest_summary<T: SummaryRecord>(&self) -> Option<T> {
        self.latest_succeeded(T::STAGE)
            .and_then(|run| run.output.as_ref())
            .and_then(T::from_output)
    }

    pub fn status(&self, stage: StageCode) -> Option<StageRunStatus> {
        self.latest(stage).map(|run| run.status)
    }

    pub fn is_complete(&self, stage: StageCode) -> bool {
        self.status(stage) == Some(StageRunStatus::Succeeded)
    }

    pub fn statuses(&self) -> StageStatuses {
        StageCode::PIPELINE_ORDER
            .into_iter()
            .filter_map(|stage| self.status(stage).map(|status| (stage, status)))
            .fold(StageStatuses::new(), |statuses, (stage, status)| {
                statuses.with(stage, status)
            })
    }

    /// Stages from `stages` whose latest run has not succeeded, in the order given.
    pub fn missing(&self, stages: &[StageCode]) -> Vec<StageCode> {
        stages
            .iter()
            .copied()
            .filter(|stage| !self.is_complete(*stage))
            .collect()
    }

    /// First stage in pipeline order that is not complete.
    pub fn next_incomplete(&self) -> Option<StageCode> {
        StageCode::PIPELINE_ORDER
            .into_iter()
            .find(|stage| !self.is_complete(*stage))
    }
}

impl From<Vec<StageRun>> for StageHistory {
    fn from(runs: Vec<StageRun>) -> Self {
        Self::new(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pipeline::domain::{CandidateId, StageRunId};
    use crate::workflows::pipeline::payload::StageTSummary;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};

    fn run(stage: StageCode, status: StageRunStatus, minutes: i64, output: Value) -> StageRun {
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        StageRun {
            id: StageRunId(format!("{stage}-{minutes}")),
            candidate_id: CandidateId("cand-1".to_string()),
            stage,
            status,
            input_version: None,
            input: Value::Null,
            output: Some(output),
            error: None,
            created_at: base + Duration::minutes(minutes),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn latest_run_wins_over_earlier_success() {
        let history = StageHistory::new(vec![
            run(StageCode::B, StageRunStatus::Succeeded, 0, json!({})),
            run(StageCode::B, StageRunStatus::Failed, 5, json!({})),
        ]);

        assert_eq!(history.status(StageCode::B), Some(StageRunStatus::Failed));
        assert!(!history.is_complete(StageCode::B));
        assert!(history.latest_succeeded(StageCode::B).is_some());
    }

    #[test]
    fn history_is_ordered_by_creation_time() {
        let history = StageHistory::new(vec![
            run(StageCode::M, StageRunStatus::Succeeded, 10, json!({})),
            run(StageCode::M, StageRunStatus::Queued, 0, json!({})),
        ]);
        assert_eq!(history.status(StageCode::M), Some(StageRunStatus::Succeeded));
    }

    #[test]
    fn summaries_come_from_latest_success() {
        let history = StageHistory::new(vec![
            run(
                StageCode::T,
                StageRunStatus::Succeeded,
                0,
                json!({ "summary": { "decision": "blocked" } }),
            ),
            run(
                StageCode::T,
                StageRunStatus::Succeeded,
                1,
                json!({ "summary": { "decision": "allowed" } }),
            ),
        ]);
        let summary: StageTSummary = history.latest_summary().expect("summary present");
        assert_eq!(summary.decision.as_deref(), Some("allowed"));
    }

    #[test]
    fn next_incomplete_follows_pipeline_order() {
        let history = StageHistory::new(vec![
            run(StageCode::M, StageRunStatus::Succeeded, 0, json!({})),
            run(StageCode::A, StageRunStatus::Succeeded, 1, json!({})),
            run(StageCode::S, StageRunStatus::Succeeded, 2, json!({})),
        ]);
        assert_eq!(history.next_incomplete(), Some(StageCode::T));
        assert_eq!(
            history.missing(&REQUIRED_STAGES),
            vec![
                StageCode::T,
                StageCode::B,
                StageCode::C,
                StageCode::K,
                StageCode::R
            ]
        );
        assert!(StageHistory::default().statuses() == StageStatuses::new());
    }
}
