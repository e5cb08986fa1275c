//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::engine::controller::{InitSummary, RoundEndSummary, RoundStartInfo, SongSelection};
use crate::engine::{EngineError, MatchPhase};
use crate::session::SessionRecord;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::ScoreboardView;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = if state.config.client_origin.trim() == "*" {
        CorsLayer::permissive()
    } else {
        let allowed_origins: Vec<header::HeaderValue> = state
            .config
            .client_origin
            .split(',')
            .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/match", get(scoreboard_handler))
        .route("/match/init", post(init_handler))
        .route("/match/song", post(select_song_handler))
        .route("/match/duration", post(set_duration_handler))
        .route("/match/start", post(start_round_handler))
        .route("/match/rank", post(rank_handler))
        .route("/match/end", post(end_round_handler))
        .route("/match/players/:id/disqualify", post(disqualify_handler))
        .route("/match/players/:id/reinstate", post(reinstate_handler))
        .route("/match/players/:id/resync", post(resync_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/:id", get(get_session_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    phase: MatchPhase,
    players: usize,
    catalog_songs: usize,
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let view = state.match_handle.scoreboard().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        phase: view.phase,
        players: view.rows.len(),
        catalog_songs: state.catalog.len(),
    }))
}

// ============================================================================
// Match endpoints
// ============================================================================

async fn scoreboard_handler(
    State(state): State<AppState>,
) -> Result<Json<ScoreboardView>, AppError> {
    let view = state.match_handle.scoreboard().await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
struct InitMatchRequest {
    players: Vec<String>,
}

async fn init_handler(
    State(state): State<AppState>,
    Json(req): Json<InitMatchRequest>,
) -> Result<Json<InitSummary>, AppError> {
    let summary = state.match_handle.init_match(req.players).await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct SelectSongRequest {
    song_id: String,
}

async fn select_song_handler(
    State(state): State<AppState>,
    Json(req): Json<SelectSongRequest>,
) -> Result<Json<SongResponse>, AppError> {
    let selection = state.match_handle.select_song(req.song_id).await?;
    Ok(Json(SongResponse::from(selection)))
}

#[derive(Serialize)]
struct SongResponse {
    song_id: String,
    title: String,
    base_duration_secs: u32,
}

impl From<SongSelection> for SongResponse {
    fn from(s: SongSelection) -> Self {
        Self {
            song_id: s.song_id,
            title: s.title,
            base_duration_secs: s.base_duration_secs,
        }
    }
}

#[derive(Deserialize)]
struct SetDurationRequest {
    seconds: u32,
}

async fn set_duration_handler(
    State(state): State<AppState>,
    Json(req): Json<SetDurationRequest>,
) -> Result<StatusCode, AppError> {
    state.match_handle.set_duration(req.seconds).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_round_handler(
    State(state): State<AppState>,
) -> Result<Json<RoundStartInfo>, AppError> {
    let info = state.match_handle.start_round().await?;
    Ok(Json(info))
}

async fn rank_handler(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.match_handle.rank_players().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn end_round_handler(
    State(state): State<AppState>,
) -> Result<Json<RoundEndSummary>, AppError> {
    let summary = state.match_handle.end_round().await?;
    Ok(Json(summary))
}

async fn disqualify_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.match_handle.disqualify(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reinstate_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.match_handle.reinstate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resync_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.match_handle.resync(id).await?;
    // The poll settles asynchronously; clients observe it over the WebSocket
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Session history endpoints
// ============================================================================

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<Uuid>,
}

async fn list_sessions_handler(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.sessions.list(),
    })
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, AppError> {
    let record = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
    Ok(Json(record))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::InvalidIdentifiers(_) | EngineError::RoundNotConfigured => {
                AppError::BadRequest(err.to_string())
            }
            EngineError::Guard { .. } | EngineError::PlayerDisqualified(_) => {
                AppError::Conflict(err.to_string())
            }
            EngineError::UnknownSong(_) | EngineError::UnknownPlayer(_) => {
                AppError::NotFound(err.to_string())
            }
            EngineError::ControllerClosed => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
