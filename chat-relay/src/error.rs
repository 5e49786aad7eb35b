//! Error types for the gateway and the polling client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::types::ErrorEnvelope;

/// Placeholder `details` for local failures that carry no message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// A local gateway failure. Always rendered as HTTP 500.
///
/// Backend-reported errors are not represented here; those are relayed with
/// the backend's own status code.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The forwarded call itself failed (DNS, connection refused, reset).
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A body could not be parsed as JSON.
    #[error("{context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl GatewayError {
    pub const fn transport(context: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { context, source }
    }

    pub const fn decode(context: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { context, source }
    }

    /// The `{error, details}` body returned to the caller.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (context, details) = match self {
            Self::Transport { context, source } => (*context, source.to_string()),
            Self::Decode { context, source } => (*context, source.to_string()),
        };
        let details = if details.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            details
        };
        ErrorEnvelope::new(context, details)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::error!("{self}");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self.envelope())).into_response()
    }
}

/// Failures seen by the polling client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("gateway returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not the expected JSON.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// An attachment URL could not be turned into bytes.
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
}
