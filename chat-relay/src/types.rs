//! Wire types shared by the gateway and the polling client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of every locally generated error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default)]
    pub details: String,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

/// Normalized answer of the session status route.
///
/// A backend 404 becomes `{hasActiveSession: false}` rather than an error, so
/// callers must check `has_active_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub has_active_session: bool,
    /// Opaque backend session object; carries at least a `status` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
}

impl SessionStatus {
    pub const fn inactive() -> Self {
        Self {
            has_active_session: false,
            session: None,
        }
    }

    pub const fn active(session: Value) -> Self {
        Self {
            has_active_session: true,
            session: Some(session),
        }
    }

    /// The session's `status` field, if any.
    pub fn status(&self) -> Option<&str> {
        self.session.as_ref()?.get("status")?.as_str()
    }

    /// True when an active session reports `running` or `active`.
    pub fn is_busy(&self) -> bool {
        self.has_active_session && self.status().is_some_and(is_busy_status)
    }
}

/// Session states during which the backend is still working.
pub fn is_busy_status(status: &str) -> bool {
    matches!(status, "running" | "active")
}

/// An image the user attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// A `data:` URI or a remote reference.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ImageAttachment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only embedded images are uploaded.
    pub fn is_data_uri(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// An uploaded image as referenced in an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedImage {
    pub path: String,
    pub name: String,
}

/// Backend answer to an asset upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub absolute_path: String,
    pub filename: String,
}

impl From<UploadResponse> for PreparedImage {
    fn from(upload: UploadResponse) -> Self {
        Self {
            path: upload.absolute_path,
            name: upload.filename,
        }
    }
}

/// Instruction submitted for chat or act execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRequest {
    pub instruction: String,
    pub conversation_id: Option<String>,
    pub cli_preference: Option<String>,
    pub fallback_enabled: Option<bool>,
    /// `None` when the caller attached nothing; `Some(vec![])` when every
    /// attachment was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<PreparedImage>>,
    #[serde(default)]
    pub is_initial_prompt: bool,
}
