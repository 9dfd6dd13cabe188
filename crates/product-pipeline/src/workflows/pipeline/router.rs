use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::domain::{CandidateId, StageCode};
use super::executor::{ExecutorError, StageExecutor};
use super::payload::PayloadError;
use super::service::{PipelineService, PipelineServiceError};
use super::store::CandidateStore;

/// Router builder exposing the candidate pipeline endpoints.
pub fn pipeline_router<S, E>(service: Arc<PipelineService<S, E>>) -> Router
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    Router::new()
        .route(
            "/api/v1/candidates/stage-k/bulk",
            post(bulk_stage_k_handler::<S, E>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/full-eval",
            post(full_evaluation_handler::<S, E>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/scorecard",
            get(scorecard_handler::<S, E>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/gate",
            get(gate_handler::<S, E>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/stages/:stage/run",
            post(run_stage_handler::<S, E>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/decision",
            put(decision_handler::<S, E>),
        )
        .with_state(service)
}

/// Body of a single-stage run; both fields, or the whole body, may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct StageRunRequest {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub scenario: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BulkStageKRequest {
    pub candidate_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) async fn full_evaluation_handler<S, E>(
    State(service): State<Arc<PipelineService<S, E>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    let id = CandidateId(candidate_id);
    match service.full_evaluation(&id) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => error_response(&id, err),
    }
}

pub(crate) async fn scorecard_handler<S, E>(
    State(service): State<Arc<PipelineService<S, E>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    let id = CandidateId(candidate_id);
    match service.scorecard(&id) {
        Ok(scorecard) => (StatusCode::OK, Json(scorecard)).into_response(),
        Err(err) => error_response(&id, err),
    }
}

pub(crate) async fn gate_handler<S, E>(
    State(service): State<Arc<PipelineService<S, E>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    let id = CandidateId(candidate_id);
    match service.gate(&id) {
        Ok(gate) => {
            let payload = json!({
                "candidate_id": id.0,
                "gate": gate,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(&id, err),
    }
}

pub(crate) async fn run_stage_handler<S, E>(
    State(service): State<Arc<PipelineService<S, E>>>,
    Path((candidate_id, stage)): Path<(String, String)>,
    body: Bytes,
) -> Response
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    let id = CandidateId(candidate_id);
    let stage: StageCode = match stage.parse() {
        Ok(stage) => stage,
        Err(err) => {
            let payload = json!({
                "error": "unknown_stage",
                "message": err.to_string(),
            });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    let request = match parse_run_request(&body) {
        Ok(request) => request,
        Err(err) => {
            let payload = json!({
                "error": "invalid_body",
                "message": err.to_string(),
            });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    match service.run_stage(&id, stage, request.input.as_ref(), request.scenario) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(&id, err),
    }
}

fn parse_run_request(body: &[u8]) -> Result<StageRunRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StageRunRequest::default());
    }
    serde_json::from_slice(body)
}

pub(crate) async fn bulk_stage_k_handler<S, E>(
    State(service): State<Arc<PipelineService<S, E>>>,
    Json(request): Json<BulkStageKRequest>,
) -> Response
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    let ids: Vec<CandidateId> = request.candidate_ids.into_iter().map(CandidateId).collect();
    let summary = service.run_stage_k_bulk(&ids);
    (StatusCode::OK, Json(summary)).into_response()
}

pub(crate) async fn decision_handler<S, E>(
    State(service): State<Arc<PipelineService<S, E>>>,
    Path(candidate_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    S: CandidateStore + 'static,
    E: StageExecutor + 'static,
{
    let id = CandidateId(candidate_id);
    match service.record_decision(&id, &request.decision, request.reason.as_deref()) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&id, err),
    }
}

fn error_response(candidate_id: &CandidateId, err: PipelineServiceError) -> Response {
    let (status, payload) = match &err {
        PipelineServiceError::NotFound => (
            StatusCode::NOT_FOUND,
            json!({
                "error": "candidate_not_found",
                "candidate_id": candidate_id.0,
            }),
        ),
        PipelineServiceError::CooldownActive(cooldown) => (
            StatusCode::CONFLICT,
            json!({
                "error": "cooldown_active",
                "fingerprint": cooldown.fingerprint,
                "reason_code": cooldown.reason_code,
                "severity": cooldown.severity,
                "recheck_after": cooldown.recheck_after,
                "what_would_change": cooldown.what_would_change,
            }),
        ),
        PipelineServiceError::Gated { stage, gate } => (
            StatusCode::CONFLICT,
            json!({
                "error": "stage_gated",
                "stage": stage,
                "gate": gate,
                "message": gate.explanation(),
            }),
        ),
        PipelineServiceError::Executor(ExecutorError::MissingPrerequisite { stage }) => (
            StatusCode::CONFLICT,
            json!({
                "error": "missing_prerequisite",
                "stage": stage,
            }),
        ),
        PipelineServiceError::Executor(ExecutorError::CooldownActive) => (
            StatusCode::CONFLICT,
            json!({ "error": "cooldown_active" }),
        ),
        PipelineServiceError::Executor(other) => (
            StatusCode::BAD_GATEWAY,
            json!({
                "error": "stage_failed",
                "message": other.to_string(),
            }),
        ),
        PipelineServiceError::Payload(PayloadError::InvalidMoney { stage }) => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": "invalid_money",
                "stage": stage,
            }),
        ),
        PipelineServiceError::Payload(PayloadError::Invalid { stage, message }) => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": "invalid_input",
                "stage": stage,
                "message": message,
            }),
        ),
        PipelineServiceError::MissingInput { stage } => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": "input_required",
                "stage": stage,
            }),
        ),
        PipelineServiceError::UnknownDecision(decision) => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": "invalid_decision",
                "decision": decision,
            }),
        ),
        PipelineServiceError::Store(store) => {
            error!(%candidate_id, error = %store, "candidate store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            )
        }
    };
    (status, Json(payload)).into_response()
}
