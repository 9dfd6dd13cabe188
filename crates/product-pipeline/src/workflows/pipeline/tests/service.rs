use super::common::*;
use crate::workflows::pipeline::domain::{StageCode, StageRunStatus};
use crate::workflows::pipeline::executor::ExecutorError;
use crate::workflows::pipeline::gate::GateCode;
use crate::workflows::pipeline::payload::{PayloadError, StageInput, StageMRequest};
use crate::workflows::pipeline::scorecard::Recommendation;
use crate::workflows::pipeline::store::StoreError;
use crate::workflows::pipeline::{
    DecisionChoice, OrchestratorConfig, PipelineService, PipelineServiceError, ScorecardConfig,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn full_evaluation_reads_gate_from_stored_history() {
    let store = MemoryStore::with_candidate(
        candidate("cand-1"),
        vec![eligibility("cand-1", 0, "blocked")],
    );
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    let status = service
        .full_evaluation(&candidate_id("cand-1"))
        .expect("evaluation runs");

    assert_eq!(status.skipped, vec![StageCode::B, StageCode::C, StageCode::K]);
    assert_eq!(status.queued, vec![StageCode::M]);
    assert_eq!(
        executor.ops(),
        vec![
            (ExecutorOp::Queue, StageCode::M),
            (ExecutorOp::Run, StageCode::A)
        ]
    );
}

#[test]
fn full_evaluation_respects_latest_stored_statuses() {
    let store = MemoryStore::with_candidate(
        candidate("cand-2"),
        vec![
            run("cand-2", StageCode::M, StageRunStatus::Succeeded, 0, json!({})),
            run("cand-2", StageCode::M, StageRunStatus::Failed, 5, json!({})),
            run("cand-2", StageCode::A, StageRunStatus::Succeeded, 1, json!({})),
        ],
    );
    let (service, _, _) = build_service(store, ScriptedExecutor::default());

    let status = service
        .full_evaluation(&candidate_id("cand-2"))
        .expect("evaluation runs");
    assert_eq!(status.queued, vec![StageCode::M]);
    assert_eq!(status.skipped, vec![StageCode::A]);
}

#[test]
fn full_evaluation_is_withheld_for_cooled_candidates() {
    let store = MemoryStore::with_candidate(cooled_candidate("cand-3"), Vec::new());
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    let status = service
        .full_evaluation(&candidate_id("cand-3"))
        .expect("evaluation runs");
    assert_eq!(status.skipped.len(), 5);
    assert!(executor.calls().is_empty());
}

#[test]
fn unknown_candidates_are_not_found() {
    let (service, _, _) = build_service(MemoryStore::default(), ScriptedExecutor::default());
    assert!(matches!(
        service.full_evaluation(&candidate_id("ghost")),
        Err(PipelineServiceError::NotFound)
    ));
    assert!(matches!(
        service.scorecard(&candidate_id("ghost")),
        Err(PipelineServiceError::NotFound)
    ));
}

#[test]
fn store_failures_propagate() {
    let service = PipelineService::new(
        Arc::new(UnavailableStore),
        Arc::new(ScriptedExecutor::default()),
        OrchestratorConfig::default(),
        ScorecardConfig::default(),
    );
    assert!(matches!(
        service.gate(&candidate_id("cand-x")),
        Err(PipelineServiceError::Store(StoreError::Unavailable(_)))
    ));
}

#[test]
fn scorecard_and_gate_are_derived_on_read() {
    let mut runs = complete_history("cand-4");
    runs.push(compliance("cand-4", 20, "high", "ALLOW"));
    let store = MemoryStore::with_candidate(candidate("cand-4"), runs);
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    let id = candidate_id("cand-4");
    assert_eq!(
        service.gate(&id).expect("gate resolves"),
        Some(GateCode::StageSBlocked)
    );
    let card = service.scorecard(&id).expect("scorecard");
    assert_eq!(card.recommendation, Recommendation::Reject);
    assert!(executor.calls().is_empty());
}

#[test]
fn run_stage_refuses_any_stage_during_cooldown() {
    let store = MemoryStore::with_candidate(cooled_candidate("cand-5"), Vec::new());
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    let payload = json!({
        "salePriceCents": 2499,
        "unitCostCents": 650,
        "shippingCostCents": 250,
        "marketplaceFeePct": 0.15
    });
    match service.run_stage(&candidate_id("cand-5"), StageCode::A, Some(&payload), None) {
        Err(PipelineServiceError::CooldownActive(cooldown)) => {
            assert_eq!(cooldown.reason_code, "margin_too_thin");
            assert_eq!(cooldown.fingerprint.as_deref(), Some("fp-cooldown"));
        }
        other => panic!("expected cooldown refusal, got {other:?}"),
    }
    assert!(executor.calls().is_empty());
}

#[test]
fn run_stage_withholds_gated_stages_only() {
    let store = MemoryStore::with_candidate(
        candidate("cand-6"),
        vec![eligibility("cand-6", 0, "needs_review")],
    );
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());
    let id = candidate_id("cand-6");

    let costing = json!({
        "unitsPlanned": 400,
        "unitWeightGrams": 300,
        "freightCostCents": "72000",
        "dutyRatePct": 0.04,
        "incoterm": "FOB",
        "leadTimeDays": 30
    });
    assert!(matches!(
        service.run_stage(&id, StageCode::B, Some(&costing), None),
        Err(PipelineServiceError::Gated {
            stage: StageCode::B,
            gate: GateCode::StageTNeedsReview
        })
    ));

    let margin = json!({
        "input": {
            "salePriceCents": 1999,
            "unitCostCents": 500,
            "shippingCostCents": 200,
            "marketplaceFeePct": 0.15
        },
        "scenario": { "name": "promo" }
    });
    service
        .run_stage(&id, StageCode::A, Some(&margin), None)
        .expect("ungated stage runs");

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].stage, StageCode::A);
    assert_eq!(calls[0].scenario, Some(json!({ "name": "promo" })));
}

#[test]
fn run_stage_composes_capital_modeling_input() {
    let runs = complete_history("cand-7")
        .into_iter()
        .filter(|run| run.stage != StageCode::K)
        .collect();
    let store = MemoryStore::with_candidate(candidate("cand-7"), runs);
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    service
        .run_stage(&candidate_id("cand-7"), StageCode::K, None, None)
        .expect("stage K runs");
    assert_eq!(
        executor.ops(),
        vec![
            (ExecutorOp::Compose, StageCode::K),
            (ExecutorOp::Run, StageCode::K)
        ]
    );
    assert_eq!(executor.calls()[1].input, Some(stage_k_input()));
}

#[test]
fn run_stage_reports_missing_costing_prerequisite() {
    let store = MemoryStore::with_candidate(
        candidate("cand-8"),
        vec![succeeded("cand-8", StageCode::C, 0, json!({}))],
    );
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    assert!(matches!(
        service.run_stage(&candidate_id("cand-8"), StageCode::K, None, None),
        Err(PipelineServiceError::Executor(ExecutorError::MissingPrerequisite {
            stage: StageCode::B
        }))
    ));
    assert!(executor.calls().is_empty());
}

#[test]
fn run_stage_rejects_malformed_money() {
    let store = MemoryStore::with_candidate(candidate("cand-9"), Vec::new());
    let (service, _, _) = build_service(store, ScriptedExecutor::default());

    let payload = json!({
        "horizonDays": 90,
        "cashflows": [{ "day": 0, "amountCents": "12.5" }]
    });
    assert!(matches!(
        service.run_stage(&candidate_id("cand-9"), StageCode::K, Some(&payload), None),
        Err(PipelineServiceError::Payload(PayloadError::InvalidMoney {
            stage: StageCode::K
        }))
    ));
}

#[test]
fn run_stage_derives_market_research_from_lead() {
    let mut lead_candidate = candidate("cand-10");
    lead_candidate.lead = Some(lead(None, Some("https://detail.tmall.com/item.htm?id=7")));
    let store = MemoryStore::with_candidate(lead_candidate, Vec::new());
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    service
        .run_stage(&candidate_id("cand-10"), StageCode::M, None, None)
        .expect("stage M runs");
    assert_eq!(
        executor.calls()[0].input,
        Some(StageInput::M(StageMRequest::TaobaoListing {
            url: "https://detail.tmall.com/item.htm?id=7".to_string()
        }))
    );

    assert!(matches!(
        service.run_stage(&candidate_id("cand-10"), StageCode::C, None, None),
        Err(PipelineServiceError::MissingInput {
            stage: StageCode::C
        })
    ));
}

#[test]
fn bulk_capital_modeling_counts_each_candidate() {
    let store = MemoryStore::default();
    let ready = |id: &str| {
        vec![
            succeeded(id, StageCode::B, 0, json!({})),
            succeeded(id, StageCode::C, 1, json!({})),
        ]
    };
    store.insert(candidate("bulk-1"), ready("bulk-1"));
    store.insert(candidate("bulk-2"), ready("bulk-2"));
    store.insert(cooled_candidate("bulk-3"), ready("bulk-3"));
    store.insert(candidate("bulk-4"), Vec::new());
    let (service, _, executor) = build_service(store, ScriptedExecutor::default());

    let ids: Vec<_> = ["bulk-1", "bulk-2", "bulk-3", "bulk-4", "ghost"]
        .into_iter()
        .map(candidate_id)
        .collect();
    let summary = service.run_stage_k_bulk(&ids);

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 3);
    assert_eq!(
        executor
            .ops()
            .iter()
            .filter(|(op, _)| *op == ExecutorOp::Run)
            .count(),
        2
    );
}

#[test]
fn bulk_run_counts_remote_failures() {
    let store = MemoryStore::with_candidate(
        candidate("bulk-5"),
        vec![
            succeeded("bulk-5", StageCode::B, 0, json!({})),
            succeeded("bulk-5", StageCode::C, 1, json!({})),
        ],
    );
    let (service, _, _) =
        build_service(store, ScriptedExecutor::default().failing_run(StageCode::K));

    let summary = service.run_stage_k_bulk(&[candidate_id("bulk-5")]);
    assert_eq!((summary.succeeded, summary.failed), (0, 1));
}

#[test]
fn record_decision_persists_normalized_choice() {
    let store = MemoryStore::with_candidate(candidate("cand-11"), Vec::new());
    let (service, store, _) = build_service(store, ScriptedExecutor::default());

    let choice = service
        .record_decision(&candidate_id("cand-11"), " Kill ", Some("  supplier ghosted  "))
        .expect("decision stored");
    assert_eq!(choice, DecisionChoice::Reject);

    let stored = store.candidate("cand-11").expect("candidate present");
    assert_eq!(stored.decision.as_deref(), Some("rejected"));
    assert_eq!(stored.decision_reason.as_deref(), Some("supplier ghosted"));

    service
        .record_decision(&candidate_id("cand-11"), "hold", Some("   "))
        .expect("decision stored");
    let stored = store.candidate("cand-11").expect("candidate present");
    assert_eq!(stored.decision.as_deref(), Some("paused"));
    assert_eq!(stored.decision_reason, None);
}

#[test]
fn record_decision_rejects_unknown_choices_and_candidates() {
    let store = MemoryStore::with_candidate(candidate("cand-12"), Vec::new());
    let (service, _, _) = build_service(store, ScriptedExecutor::default());

    assert!(matches!(
        service.record_decision(&candidate_id("cand-12"), "maybe", None),
        Err(PipelineServiceError::UnknownDecision(value)) if value == "maybe"
    ));
    assert!(matches!(
        service.record_decision(&candidate_id("ghost"), "advance", None),
        Err(PipelineServiceError::NotFound)
    ));
}
