use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    comparison::{ComparisonCoordinator, ComparisonView, SlotId},
    error::{ExportError, InputError},
    models::{AnalyzeRequest, FeedbackRequest},
    orchestrator::{Orchestrator, PipelineRun},
    pdf::generate_pdf,
    report::analysis_csv,
    stages::Stages,
};

#[derive(Clone)]
pub struct AppState {
    pub stages: Stages,
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<ComparisonCoordinator>>>>,
}

impl AppState {
    pub fn new(stages: Stages) -> Self {
        Self { stages, sessions: Arc::default() }
    }

    fn session(&self, id: Uuid) -> Result<Arc<ComparisonCoordinator>, ApiError> {
        self.sessions.read().get(&id).cloned().ok_or(ApiError::NotFound("comparison session"))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/feedback", post(submit_feedback))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/compare", post(compare_products))
        .route("/api/sessions/:id/slots/:slot", post(submit_slot).get(get_slot))
        .route("/api/sessions/:id/slots/:slot/report.csv", get(export_csv))
        .route("/api/sessions/:id/slots/:slot/report.pdf", get(export_pdf))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Input(InputError),
    NotFound(&'static str),
    Export(ExportError),
    Superseded,
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        ApiError::Input(e)
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        ApiError::Export(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Input(e) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": e.to_string(), "kind": e.stage_kind() }),
            ),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, json!({ "error": format!("{what} not found") })),
            ApiError::Export(ExportError::NoAnalysis) => {
                (StatusCode::NOT_FOUND, json!({ "error": ExportError::NoAnalysis.to_string() }))
            }
            ApiError::Export(e) => {
                warn!("❌ Export failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Failed to generate the report." }))
            }
            ApiError::Superseded => (
                StatusCode::CONFLICT,
                json!({ "error": "The run was replaced by a newer submission." }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// One-shot analysis outside any comparison session.
pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<PipelineRun>, ApiError> {
    let (input, preferences) = body.into_submission()?;
    info!("🔍 Analyzing product ({} preferences)", preferences.len());
    let run = Orchestrator::new(state.stages.clone())
        .run_to_end(input, preferences)
        .await
        .ok_or(ApiError::Superseded)?;
    Ok(Json(run))
}

#[derive(Serialize)]
pub struct SessionCreated {
    pub id: Uuid,
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let id = Uuid::new_v4();
    state.sessions.write().insert(id, Arc::new(ComparisonCoordinator::new(state.stages.clone())));
    info!("🎯 Created comparison session {}", id);
    (StatusCode::CREATED, Json(SessionCreated { id }))
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ComparisonView>, ApiError> {
    Ok(Json(state.session(id)?.view()))
}

/// Drop a session and stop anything still running in it.
pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let session = state.sessions.write().remove(&id).ok_or(ApiError::NotFound("comparison session"))?;
    session.cancel();
    info!("🗑️ Deleted comparison session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub first: AnalyzeRequest,
    pub second: AnalyzeRequest,
}

pub async fn compare_products(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<CompareRequest>,
) -> Result<Json<ComparisonView>, ApiError> {
    let session = state.session(id)?;
    let first = body.first.into_submission()?;
    let second = body.second.into_submission()?;
    Ok(Json(session.run_both(first, second).await))
}

/// Starts a run in the background and returns its first snapshot. Poll the
/// slot or the session for progress.
pub async fn submit_slot(
    Path((id, slot)): Path<(Uuid, SlotId)>,
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<PipelineRun>), ApiError> {
    let session = state.session(id)?;
    let (input, preferences) = body.into_submission()?;
    let mut stream = session.submit(slot, input, preferences);
    let first = stream.next().await.ok_or(ApiError::Superseded)?;
    Ok((StatusCode::ACCEPTED, Json(first)))
}

pub async fn get_slot(
    Path((id, slot)): Path<(Uuid, SlotId)>,
    State(state): State<AppState>,
) -> Result<Json<PipelineRun>, ApiError> {
    state
        .session(id)?
        .orchestrator(slot)
        .current()
        .map(Json)
        .ok_or(ApiError::NotFound("pipeline run"))
}

fn slot_run(state: &AppState, id: Uuid, slot: SlotId) -> Result<PipelineRun, ApiError> {
    state.session(id)?.orchestrator(slot).current().ok_or(ApiError::NotFound("pipeline run"))
}

fn report_title(run: &PipelineRun, slot: SlotId) -> String {
    run.product_name().unwrap_or(slot.default_name()).to_string()
}

pub async fn export_csv(
    Path((id, slot)): Path<(Uuid, SlotId)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let run = slot_run(&state, id, slot)?;
    let analysis = run.analysis().ok_or(ExportError::NoAnalysis)?;
    let csv = analysis_csv(analysis);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv;charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"analysis_{}.csv\"", run.id)),
        ],
        csv,
    )
        .into_response())
}

pub async fn export_pdf(
    Path((id, slot)): Path<(Uuid, SlotId)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let run = slot_run(&state, id, slot)?;
    let analysis = run.analysis().ok_or(ExportError::NoAnalysis)?;
    let pdf_bytes = generate_pdf(&report_title(&run, slot), analysis)?;
    info!("📄 Generated PDF report for run {} ({} bytes)", run.id, pdf_bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"analysis_{}.pdf\"", run.id)),
        ],
        pdf_bytes,
    )
        .into_response())
}

/// Feedback is only logged.
pub async fn submit_feedback(Json(body): Json<FeedbackRequest>) -> Result<StatusCode, ApiError> {
    let text = body.validated()?;
    info!(feedback = %text, "📝 Feedback received");
    Ok(StatusCode::NO_CONTENT)
}
