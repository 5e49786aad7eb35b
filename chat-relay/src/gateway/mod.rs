//! Forwarding gateway - stateless HTTP handlers in front of the backend.
//!
//! Architecture:
//! - Every handler builds a backend URL from the shared config and forwards
//! - Backend status codes and bodies are relayed; only transport failures
//!   become local 500s
//! - Handlers share nothing mutable; each request is independent
//!
//! Endpoints:
//! - GET /api/chat/{project_id}/messages - message list (default limit 100)
//! - POST /api/chat/{project_id} - forward a chat instruction
//! - GET /api/chat/{project_id}/status - active-session adapter
//! - GET|POST|PUT|DELETE /api/proxy/{*path} - generic passthrough
//! - OPTIONS /api/proxy/{*path} - local CORS preflight

mod chat;
mod proxy;
mod status;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::types::ErrorEnvelope;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Shared, read-only gateway state.
pub struct GatewayState {
    pub config: GatewayConfig,
    http: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub const fn with_client(config: GatewayConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// A JSON request to the backend. Inbound headers are never copied.
    fn backend_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.config.api_url(path))
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
    }
}

/// Build the gateway router.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/chat/{project_id}", post(chat::send_chat))
        .route("/api/chat/{project_id}/messages", get(chat::list_messages))
        .route("/api/chat/{project_id}/status", get(status::session_status))
        .route(
            "/api/proxy/{*path}",
            get(proxy::forward)
                .post(proxy::forward)
                .put(proxy::forward)
                .delete(proxy::forward)
                .options(proxy::preflight),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the gateway until Ctrl-C.
pub async fn start_server(config: GatewayConfig) -> Result<()> {
    let addr = config.bind;
    let state = Arc::new(GatewayState::new(config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        "chat-relay gateway listening on http://{addr}, forwarding to {}",
        state.config.backend_url()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

/// Percent-encode an opaque identifier for use as one path segment.
fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Send a backend request, mapping transport failures to a local 500.
async fn send(
    request: reqwest::RequestBuilder,
    context: &'static str,
) -> Result<reqwest::Response, GatewayError> {
    request
        .send()
        .await
        .map_err(|source| GatewayError::transport(context, source))
}

/// Relay a non-2xx backend answer as `{error, details}` with its status.
async fn backend_error(
    response: reqwest::Response,
    context: &'static str,
) -> Result<Response, GatewayError> {
    let status = response.status();
    let details = response
        .text()
        .await
        .map_err(|source| GatewayError::transport(context, source))?;
    tracing::warn!(status = status.as_u16(), "{context}: backend error");
    Ok((status, Json(ErrorEnvelope::new(context, details))).into_response())
}

/// Read a 2xx backend body as JSON.
async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &'static str,
) -> Result<T, GatewayError> {
    let body: Bytes = response
        .bytes()
        .await
        .map_err(|source| GatewayError::transport(context, source))?;
    serde_json::from_slice(&body).map_err(|source| GatewayError::decode(context, source))
}

/// Relay a backend JSON answer: 2xx bodies as-is, errors as an envelope.
async fn relay_json(
    response: reqwest::Response,
    backend_context: &'static str,
    local_context: &'static str,
) -> Result<Response, GatewayError> {
    if !response.status().is_success() {
        return backend_error(response, backend_context).await;
    }
    let payload: serde_json::Value = decode(response, local_context).await?;
    Ok((StatusCode::OK, Json(payload)).into_response())
}
