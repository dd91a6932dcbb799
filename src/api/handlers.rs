//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::{error, info, warn};

use super::responses::{
    ApiResponse, DiagnosticsResponse, HealthResponse, StartRequest, StatusResponse,
};
use crate::{error::SessionError, state::AppState};

type HandlerResult = Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)>;

fn reject(state: &AppState, e: SessionError) -> (StatusCode, Json<ApiResponse>) {
    let code = match &e {
        SessionError::ZeroDuration => StatusCode::BAD_REQUEST,
        SessionError::NothingToResume => StatusCode::CONFLICT,
        SessionError::Alarm(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    if code.is_server_error() {
        error!("Session request failed: {}", e);
    } else {
        warn!("Session request rejected: {}", e);
    }
    (code, Json(ApiResponse::error(e.to_string(), state.status())))
}

/// Handle POST /start - Start a session
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRequest>>,
) -> HandlerResult {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    match state.start_session(request.cycle, request.duration_ms) {
        Ok(timer) => {
            info!("Start endpoint called - {} session running", timer.cycle);
            Ok(Json(ApiResponse::active(
                format!("{} session started", timer.cycle.label()),
                timer,
            )))
        }
        Err(e) => Err(reject(&state, e)),
    }
}

/// Handle POST /pause - Pause the running session
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    let timer = state.pause_session();
    info!("Pause endpoint called - timer {}", timer.state);
    Json(ApiResponse::inactive("Session paused".to_string(), timer))
}

/// Handle POST /resume - Resume the paused session
pub async fn resume_handler(State(state): State<Arc<AppState>>) -> HandlerResult {
    match state.resume_session() {
        Ok(timer) => {
            info!("Resume endpoint called - {}ms remaining", timer.remaining_ms);
            Ok(Json(ApiResponse::active("Session resumed".to_string(), timer)))
        }
        Err(e) => Err(reject(&state, e)),
    }
}

/// Handle POST /stop - Stop the session
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    let timer = state.stop_session();
    info!("Stop endpoint called");
    Json(ApiResponse::inactive("Session stopped".to_string(), timer))
}

/// Handle GET /status - Return current timer status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timer: state.status(),
        primary: state.countdown.progress(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /diagnostics - Return the raw state record and health telemetry
pub async fn diagnostics_handler(State(state): State<Arc<AppState>>) -> Json<DiagnosticsResponse> {
    Json(DiagnosticsResponse {
        snapshot: state.manager.snapshot(),
        telemetry: state.diagnostics(),
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
