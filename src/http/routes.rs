//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::session::{JoinOutcome, SessionError, SessionInfo};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::PlayerId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.client_origin))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/join", post(join_session_handler))
        // One segment name for all three: a join code for lookups, a session id for actions
        .route("/sessions/:key", get(get_session_handler))
        .route("/sessions/:key/start", post(start_session_handler))
        .route("/sessions/:key/leave", post(leave_session_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// `*` allows any origin, otherwise a comma-separated list
fn allowed_origins(client_origin: &str) -> AllowOrigin {
    if client_origin.trim() == "*" {
        return AllowOrigin::any();
    }
    let origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    AllowOrigin::list(origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.registry.active_sessions(),
        active_players: state.registry.total_players(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    display_name: String,
    max_players: Option<usize>,
    bots: Option<usize>,
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<JoinOutcome>), AppError> {
    check_rate_limit(&state)?;

    let outcome = state
        .sessions
        .create_session(req.display_name, req.max_players, req.bots)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Deserialize)]
struct JoinSessionRequest {
    join_code: String,
    #[serde(default)]
    display_name: String,
    player_id: Option<PlayerId>,
    token: Option<Uuid>,
}

async fn join_session_handler(
    State(state): State<AppState>,
    Json(req): Json<JoinSessionRequest>,
) -> Result<Json<JoinOutcome>, AppError> {
    check_rate_limit(&state)?;

    let outcome = state
        .sessions
        .join_session(&req.join_code, req.display_name, req.player_id, req.token)
        .await?;

    Ok(Json(outcome))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SessionInfo>, AppError> {
    Ok(Json(state.sessions.get_session(&code)?))
}

#[derive(Deserialize)]
struct PlayerRequest {
    player_id: Option<PlayerId>,
    token: Option<Uuid>,
}

async fn start_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<PlayerRequest>,
) -> Result<Json<SessionInfo>, AppError> {
    let player_id = req.player_id.ok_or(SessionError::MissingIdentity)?;
    let info = state
        .sessions
        .start_session(session_id, player_id, req.token)
        .await?;
    Ok(Json(info))
}

async fn leave_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<PlayerRequest>,
) -> Result<StatusCode, AppError> {
    let player_id = req.player_id.ok_or(SessionError::MissingIdentity)?;
    state
        .sessions
        .leave_session(session_id, player_id, req.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn check_rate_limit(state: &AppState) -> Result<(), AppError> {
    if state.api_limiter.check().is_err() {
        warn!("Session API rate limited");
        return Err(AppError::RateLimited);
    }
    Ok(())
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Too many requests")]
    RateLimited,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Session(e) => {
                let status = match e {
                    SessionError::NotFound => StatusCode::NOT_FOUND,
                    SessionError::Full | SessionError::NotJoinable => StatusCode::CONFLICT,
                    SessionError::MissingIdentity => StatusCode::BAD_REQUEST,
                    SessionError::NotHost | SessionError::InvalidToken => StatusCode::FORBIDDEN,
                    SessionError::JoinTimeout => StatusCode::GATEWAY_TIMEOUT,
                    SessionError::RelayClosed => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
