use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn,
    response::Json,
    routing::{get, post},
};
use claim_flow::{
    ClaimId, ClaimRecord, ClaimSchema, ConversationEvent, FlowError, FlowRunner,
    HttpPredictionChannel, InMemorySessionStorage, SessionSnapshot, SubmissionService, TurnResult,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{config::ServiceConfig, telemetry::correlation_id_middleware};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn flow_error(session_id: &str, e: FlowError) -> ApiError {
    let status = match &e {
        FlowError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        FlowError::UnexpectedEvent { .. } | FlowError::StaleForm { .. } => StatusCode::CONFLICT,
        FlowError::Record(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::SubmissionAborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(session_id = %session_id, error = %e, "Conversation event failed");
    } else {
        warn!(session_id = %session_id, error = %e, "Conversation event rejected");
    }
    (
        status,
        Json(json!({
            "error": e.to_string(),
            "session_id": session_id
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub flow_runner: FlowRunner,
    pub schema: Arc<ClaimSchema>,
}

impl AppState {
    pub fn new(flow_runner: FlowRunner) -> Self {
        Self {
            flow_runner,
            schema: Arc::new(ClaimSchema::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub session_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct FormSubmission {
    pub claim_id: ClaimId,
    pub fields: BTreeMap<String, String>,
}

/// `?claim_id=` is optional; without it the currently open form is cancelled.
#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub claim_id: Option<ClaimId>,
}

/// Wires the prediction channel, submission service and session storage together.
pub fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let channel = HttpPredictionChannel::new(
        config.prediction_endpoint.clone(),
        config.prediction_timeout,
    )?;
    let submission = Arc::new(SubmissionService::new(
        Arc::new(channel),
        config.doc_s3_path.clone(),
    ));
    let flow_runner = FlowRunner::new(Arc::new(InMemorySessionStorage::new()), submission);

    info!(
        prediction_endpoint = %config.prediction_endpoint,
        doc_s3_path = %config.doc_s3_path,
        "Claim intake flow ready"
    );

    Ok(build_router(AppState::new(flow_runner)))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/schema", get(get_schema))
        .route("/execute", post(execute))
        .route("/session/{id}", get(get_session))
        .route("/session/{id}/form", post(submit_form).delete(cancel_form))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(from_fn(correlation_id_middleware))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_schema(State(state): State<AppState>) -> Json<ClaimSchema> {
    Json(state.schema.as_ref().clone())
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult<TurnResult> {
    info!(
        session_id = ?request.session_id,
        content_length = %request.content.len(),
        "Processing execute request"
    );

    let session_id = match request.session_id {
        Some(session_id) => {
            if Uuid::parse_str(&session_id).is_err() {
                warn!(session_id = %session_id, "Invalid session ID format");
                return Err(bad_request_error("Invalid session ID format"));
            }
            session_id
        }
        None => state
            .flow_runner
            .create_session(None)
            .await
            .map_err(|e| flow_error("new", e))?
            .id
            .clone(),
    };

    let result = state
        .flow_runner
        .run(&session_id, ConversationEvent::UserTextSubmitted(request.content))
        .await
        .map_err(|e| flow_error(&session_id, e))?;

    info!(
        session_id = %session_id,
        state = %result.state,
        "Request completed successfully"
    );
    Ok(Json(result))
}

async fn submit_form(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(form): Json<FormSubmission>,
) -> ApiResult<TurnResult> {
    info!(session_id = %session_id, claim_id = %form.claim_id, "Claim form submitted");

    let record = ClaimRecord::from_fields(&form.fields)
        .map_err(|e| flow_error(&session_id, FlowError::from(e)))?;

    let result = state
        .flow_runner
        .run(
            &session_id,
            ConversationEvent::FormSubmitted {
                claim_id: form.claim_id,
                record,
            },
        )
        .await
        .map_err(|e| flow_error(&session_id, e))?;

    Ok(Json(result))
}

async fn cancel_form(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<CancelParams>,
) -> ApiResult<TurnResult> {
    let claim_id = match params.claim_id {
        Some(claim_id) => claim_id,
        None => open_claim_id(&state, &session_id).await?,
    };
    info!(session_id = %session_id, claim_id = %claim_id, "Claim form cancelled");

    let result = state
        .flow_runner
        .run(&session_id, ConversationEvent::FormCancelled { claim_id })
        .await
        .map_err(|e| flow_error(&session_id, e))?;

    Ok(Json(result))
}

async fn open_claim_id(state: &AppState, session_id: &str) -> Result<ClaimId, ApiError> {
    let session = state
        .flow_runner
        .storage()
        .get(session_id)
        .await
        .map_err(|e| flow_error(session_id, e))?
        .ok_or_else(|| flow_error(session_id, FlowError::SessionNotFound(session_id.to_string())))?;

    if let Some(form) = session.open_form() {
        return Ok(form.claim_id);
    }
    let current = session.controller().lock().await.state();
    Err(flow_error(
        session_id,
        FlowError::UnexpectedEvent {
            state: current.to_string(),
            event: "FormCancelled".to_string(),
        },
    ))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let session = state
        .flow_runner
        .storage()
        .get(&session_id)
        .await
        .map_err(|e| flow_error(&session_id, e))?
        .ok_or_else(|| flow_error(&session_id, FlowError::SessionNotFound(session_id.clone())))?;

    Ok(Json(session.snapshot().await))
}
