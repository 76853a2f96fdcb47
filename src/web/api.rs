//! Defines the Axum API routes and handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::dispatch::Dispatcher;
use crate::web::models::{CommandRequest, PortsResponse};

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub struct AppStateInner {
    pub dispatcher: Dispatcher,
}
pub type AppState = Arc<AppStateInner>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(dispatcher: Dispatcher) -> Router {
    create_router_with_state(Arc::new(AppStateInner { dispatcher }))
}

pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/ports", get(list_ports))
        .route("/api/v1/command", post(run_command))
        .with_state(state)
}

/// Handler to list the attached candidate boards.
async fn list_ports(State(state): State<AppState>) -> axum::response::Response {
    match state.dispatcher.list_ports() {
        Ok(ports) => (StatusCode::OK, Json(PortsResponse { ports })).into_response(),
        Err(e) => {
            tracing::error!("Port listing failed: {}", e);
            json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handler to broadcast one command to every attached board and report
/// the per-board transcripts.
async fn run_command(
    State(state): State<AppState>,
    Json(payload): Json<CommandRequest>,
) -> axum::response::Response {
    let command = payload.cmd.trim();
    match state.dispatcher.dispatch(command).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::error!("Dispatch failed: {}", e);
            json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
