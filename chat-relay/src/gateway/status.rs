//! Session status adapter.
//!
//! The backend signals "no active session" with a 404. Callers get a 200 with
//! `{hasActiveSession: false}` instead and must check the flag.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use super::{backend_error, decode, segment, send, GatewayState};
use crate::error::GatewayError;
use crate::types::SessionStatus;

const STATUS_FAILURE: &str = "Failed to fetch session status";

pub(super) async fn session_status(
    State(state): State<Arc<GatewayState>>,
    Path(project_id): Path<String>,
) -> Result<Response, GatewayError> {
    let request = state.backend_get(&format!("chat/{}/active-session", segment(&project_id)));
    let response = send(request, STATUS_FAILURE).await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(Json(SessionStatus::inactive()).into_response());
    }
    if !status.is_success() {
        return backend_error(response, STATUS_FAILURE).await;
    }

    let session: Value = decode(response, STATUS_FAILURE).await?;
    Ok(Json(SessionStatus::active(session)).into_response())
}
