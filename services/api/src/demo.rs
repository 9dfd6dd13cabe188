use crate::infra::{InMemoryCandidateStore, LoopbackStageExecutor};
use chrono::{Duration, Utc};
use clap::Args;
use product_pipeline::config::AppConfig;
use product_pipeline::error::AppError;
use product_pipeline::workflows::pipeline::{
    score_confidence, Candidate, CandidateId, Cooldown, CooldownSeverity, FullEvalStatus,
    LeadSnapshot, PipelineService, Scorecard, StageCode, StageHistory, StageRun, StageRunId,
    StageRunStatus,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print scorecards as JSON instead of the text summary
    #[arg(long)]
    pub(crate) json: bool,
    /// Skip the full-evaluation pass and only score the seeded history
    #[arg(long)]
    pub(crate) skip_evaluation: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScorecardArgs {
    /// JSON file holding `candidate` and `stage_runs`
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Print the scorecard as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Deserialize)]
struct CandidateSnapshot {
    candidate: Candidate,
    #[serde(default)]
    stage_runs: Vec<StageRun>,
}

pub(crate) fn run_scorecard(args: ScorecardArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let raw = std::fs::read_to_string(&args.snapshot)?;
    let snapshot: CandidateSnapshot = serde_json::from_str(&raw)?;

    let history = StageHistory::new(snapshot.stage_runs);
    let scorecard = score_confidence(&history, &snapshot.candidate, &config.pipeline.scorecard);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&scorecard)?);
    } else {
        render_scorecard(&scorecard);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = Arc::new(InMemoryCandidateStore::default());
    let seeded = seed_demo_candidates(&store);
    let executor = Arc::new(LoopbackStageExecutor::new(store.clone()));
    let pipeline = config.pipeline.clone();
    let service = PipelineService::new(
        store,
        executor,
        pipeline.orchestrator,
        pipeline.scorecard,
    );

    println!("Product pipeline demo ({} candidates)", seeded.len());
    for id in seeded.into_iter().map(CandidateId) {
        println!("\nCandidate {id}");
        if !args.skip_evaluation {
            let status = service.full_evaluation(&id)?;
            render_status(&status);
        }

        let scorecard = service.scorecard(&id)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&scorecard)?);
        } else {
            render_scorecard(&scorecard);
        }
    }
    Ok(())
}

fn stage_list(stages: &[StageCode]) -> String {
    if stages.is_empty() {
        "-".to_string()
    } else {
        stages
            .iter()
            .map(|stage| format!("{stage} ({})", stage.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render_status(status: &FullEvalStatus) {
    println!("Full evaluation pass:");
    println!("  - ran: {}", stage_list(&status.ran));
    println!("  - queued: {}", stage_list(&status.queued));
    println!("  - skipped: {}", stage_list(&status.skipped));
    println!("  - missing: {}", stage_list(&status.missing));
}

fn render_scorecard(scorecard: &Scorecard) {
    println!(
        "Scorecard: {} | confidence {} ({})",
        scorecard.recommendation.label(),
        scorecard.confidence,
        scorecard.confidence_band.label()
    );
    if let Some(gate) = scorecard.gate {
        println!("  - gate: {} ({})", gate.label(), gate.explanation());
    }
    println!("  - missing stages: {}", stage_list(&scorecard.missing_stages));
    if let Some(next) = scorecard.next_stage {
        println!("  - next stage: {next} ({})", next.label());
    }
    if let Some(band) = &scorecard.risk_band {
        println!("  - risk band: {band}");
    }
    let metrics = &scorecard.key_metrics;
    if let Some(contribution) = metrics.contribution_per_unit_cents {
        println!("  - contribution per unit: {:.2}", contribution as f64 / 100.0);
    }
    if let Some(outlay) = metrics.peak_cash_outlay_cents {
        println!("  - peak cash outlay: {:.2}", outlay as f64 / 100.0);
    }
    if let Some(day) = metrics.payback_day {
        println!("  - payback day: {day}");
    }
    for reason in scorecard.reason_messages() {
        println!("  * {reason}");
    }
    if let Some(decision) = scorecard.human_decision {
        println!("  - human decision: {}", decision.label());
    }
}

fn seed_run(candidate: &str, stage: StageCode, minutes_ago: i64, summary: Value) -> StageRun {
    let created_at = Utc::now() - Duration::minutes(minutes_ago);
    StageRun {
        id: StageRunId(format!("seed-{candidate}-{stage}")),
        candidate_id: CandidateId(candidate.to_string()),
        stage,
        status: StageRunStatus::Succeeded,
        input_version: Some("seed".to_string()),
        input: Value::Null,
        output: Some(json!({ "summary": summary })),
        error: None,
        created_at,
        started_at: Some(created_at),
        finished_at: Some(created_at),
    }
}

fn demo_candidate(id: &str, title: &str, url: Option<&str>) -> Candidate {
    let mut candidate = Candidate::new(id);
    candidate.lead_id = Some(format!("lead-{id}"));
    candidate.fingerprint = Some(format!("fp-{id}"));
    candidate.created_at = Some(Utc::now() - Duration::days(3));
    candidate.lead = Some(LeadSnapshot {
        id: candidate.lead_id.clone(),
        title: Some(title.to_string()),
        source: Some("demo".to_string()),
        url: url.map(str::to_string),
    });
    candidate
}

fn screened_history(id: &str) -> Vec<StageRun> {
    vec![
        seed_run(id, StageCode::M, 600, json!({ "listingCount": 24, "medianPriceCents": 2399 })),
        seed_run(id, StageCode::T, 590, json!({ "decision": "allowed" })),
        seed_run(id, StageCode::S, 580, json!({ "overallRisk": "low", "action": "ALLOW" })),
        seed_run(
            id,
            StageCode::B,
            570,
            json!({ "landedCostPerUnitCents": 910, "totalLandedCostCents": 455000 }),
        ),
        seed_run(
            id,
            StageCode::C,
            560,
            json!({ "contributionPerUnitCents": 612, "contributionMarginPct": 0.24 }),
        ),
        seed_run(
            id,
            StageCode::K,
            550,
            json!({ "peakCashOutlayCents": 455000, "paybackDay": 71 }),
        ),
        seed_run(
            id,
            StageCode::R,
            540,
            json!({ "riskBand": "low", "effortBand": "medium", "rankScore": 0.72 }),
        ),
    ]
}

/// Seeds one candidate per pipeline situation and returns their ids.
pub(crate) fn seed_demo_candidates(store: &InMemoryCandidateStore) -> Vec<String> {
    let fresh = "cand-fresh";
    store.insert_candidate(demo_candidate(fresh, "Collapsible silicone water bottle", None));

    let blocked = "cand-blocked";
    store.insert_candidate(demo_candidate(
        blocked,
        "Magnetic phone mount",
        Some("https://www.amazon.de/dp/B0DEMO0001"),
    ));
    store.append_run(seed_run(blocked, StageCode::M, 120, json!({ "listingCount": 40 })));
    store.append_run(seed_run(blocked, StageCode::T, 90, json!({ "decision": "blocked" })));

    let cooled = "cand-cooldown";
    let mut cooled_candidate = demo_candidate(
        cooled,
        "Bamboo cutlery set",
        Some("https://item.taobao.com/item.htm?id=7781"),
    );
    cooled_candidate.cooldown = Some(Cooldown {
        id: Some("cooldown-demo".to_string()),
        fingerprint: cooled_candidate.fingerprint.clone(),
        reason_code: "supplier_price_spike".to_string(),
        severity: CooldownSeverity::ShortCooldown,
        recheck_after: Some(Utc::now() + Duration::days(10)),
        what_would_change: Some("Supplier quote back under 1.80 EUR".to_string()),
        created_at: Some(Utc::now()),
        active: true,
    });
    store.insert_candidate(cooled_candidate);
    for run in screened_history(cooled) {
        store.append_run(run);
    }

    let ready = "cand-ready";
    let mut ready_candidate = demo_candidate(ready, "Foldable laptop stand", None);
    ready_candidate.decision = Some("approved".to_string());
    store.insert_candidate(ready_candidate);
    for run in screened_history(ready) {
        store.append_run(run);
    }

    [fresh, blocked, cooled, ready]
        .into_iter()
        .map(str::to_string)
        .collect()
}
