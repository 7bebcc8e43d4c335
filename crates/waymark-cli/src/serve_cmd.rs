use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use waymark_core::conversation::{self, OrchestratorConfig};
use waymark_core::generation::GenerationService;
use waymark_core::progress::{self, ProgressUpdate};
use waymark_core::roadmap::view;
use waymark_core::{CoreError, CoreResult};
use waymark_db::models::RoadmapStatus;

pub const USER_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::ServiceRejected { .. }
            | CoreError::ServiceUnknownFailure(_)
            | CoreError::NormalizationFailure(_) => StatusCode::BAD_GATEWAY,
            CoreError::ServiceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::ConsistencyViolation(_) => StatusCode::CONFLICT,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %err, "request failed");
        }
        let message = match err {
            CoreError::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The authenticated caller, read from the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("missing {USER_HEADER} header")))?;
        raw.to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Caller)
            .ok_or_else(|| AppError::bad_request(format!("{USER_HEADER} must be a UUID")))
    }
}

// ---------------------------------------------------------------------------
// State and request bodies
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub service: Arc<dyn GenerationService>,
    pub config: OrchestratorConfig,
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionBody {
    title: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessageBody {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleBody {
    plan_id: Uuid,
    /// Identifies the topic. A `topicSourceId` sent by older clients is ignored.
    topic_record_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProgressBody {
    plan_id: Uuid,
    topic_record_id: Uuid,
    #[serde(flatten)]
    update: ProgressUpdate,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: RoadmapStatus,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/messages", post(send_message))
        .route("/api/roadmaps", get(list_roadmaps))
        .route("/api/roadmaps/{id}", get(get_roadmap).delete(delete_roadmap))
        .route("/api/roadmaps/{id}/status", patch(set_roadmap_status))
        .route("/api/roadmaps/{id}/progress", get(roadmap_progress))
        .route("/api/progress", patch(update_progress))
        .route("/api/progress/toggle", post(toggle_progress))
        .route("/api/progress/overall", get(overall_progress))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_serve(
    pool: PgPool,
    service: Arc<dyn GenerationService>,
    config: OrchestratorConfig,
    bind: &str,
    port: u16,
) -> Result<()> {
    let app = build_router(AppState {
        pool,
        service,
        config,
    });
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("waymark serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("waymark serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C, shutting down");
    }
}

fn ok_json<T: serde::Serialize>(value: CoreResult<T>) -> Result<Response, AppError> {
    Ok(Json(value?).into_response())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_session(
    State(state): State<AppState>,
    Caller(user): Caller,
    body: Option<Json<CreateSessionBody>>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let session = conversation::create_session(
        &state.pool,
        user,
        body.title.as_deref(),
        body.domain.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

async fn list_sessions(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Response, AppError> {
    ok_json(conversation::list_sessions(&state.pool, user).await)
}

async fn get_session(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    ok_json(conversation::load_session(&state.pool, user, id).await)
}

async fn delete_session(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    conversation::delete_session(&state.pool, user, id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Runs the turn on its own task so a client disconnect does not cancel
/// an in-flight generation.
async fn send_message(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageBody>,
) -> Result<Response, AppError> {
    let turn = tokio::spawn(async move {
        conversation::handle_user_message(
            &state.pool,
            state.service.as_ref(),
            &state.config,
            user,
            id,
            &body.content,
        )
        .await
    })
    .await
    .map_err(|e| AppError::internal(format!("turn task failed: {e}")))?;
    ok_json(turn)
}

async fn list_roadmaps(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Response, AppError> {
    ok_json(view::list(&state.pool, user).await)
}

async fn get_roadmap(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    ok_json(view::load(&state.pool, user, id).await)
}

async fn set_roadmap_status(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Response, AppError> {
    ok_json(view::set_status(&state.pool, user, id, body.status).await)
}

async fn delete_roadmap(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    view::delete(&state.pool, user, id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn roadmap_progress(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    ok_json(progress::stats(&state.pool, user, id).await)
}

async fn toggle_progress(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(body): Json<ToggleBody>,
) -> Result<Response, AppError> {
    ok_json(progress::toggle(&state.pool, user, body.plan_id, body.topic_record_id).await)
}

async fn update_progress(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(body): Json<UpdateProgressBody>,
) -> Result<Response, AppError> {
    ok_json(
        progress::update_entry(
            &state.pool,
            user,
            body.plan_id,
            body.topic_record_id,
            &body.update,
        )
        .await,
    )
}

async fn overall_progress(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Response, AppError> {
    ok_json(progress::overall_stats(&state.pool, user).await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
