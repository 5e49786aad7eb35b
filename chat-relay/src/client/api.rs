//! The seam between the polling controller and the transport.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::images::DecodedImage;
use crate::error::ClientError;
use crate::types::{InstructionRequest, PreparedImage, SessionStatus};

/// Project/conversation pair every call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatScope {
    pub project_id: String,
    pub conversation_id: Option<String>,
}

impl ChatScope {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            conversation_id: None,
        }
    }

    #[must_use]
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

impl fmt::Display for ChatScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conversation_id {
            Some(conversation) => write!(f, "{}/{conversation}", self.project_id),
            None => f.write_str(&self.project_id),
        }
    }
}

/// Where an instruction is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionRoute {
    /// Project chat route.
    Chat,
    /// Act execution, reached through the generic passthrough.
    Act,
}

impl InstructionRoute {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Act => "act",
        }
    }

    /// Error flag set when a submission fails.
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::Chat => "Failed to execute chat",
            Self::Act => "Failed to execute act",
        }
    }
}

impl fmt::Display for InstructionRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the polling controller needs from the gateway.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Message history for a scope, oldest first.
    async fn fetch_messages(&self, scope: &ChatScope) -> Result<Vec<Value>, ClientError>;

    /// Normalized active-session status for a project.
    async fn fetch_status(&self, project_id: &str) -> Result<SessionStatus, ClientError>;

    /// Upload one image; returns the backend-assigned path and name.
    async fn upload_image(
        &self,
        project_id: &str,
        image: DecodedImage,
        filename: &str,
    ) -> Result<PreparedImage, ClientError>;

    /// Submit an instruction; returns the backend session object.
    async fn submit_instruction(
        &self,
        route: InstructionRoute,
        project_id: &str,
        request: &InstructionRequest,
    ) -> Result<Value, ClientError>;

    /// Delete the message history for a scope.
    async fn clear_messages(&self, scope: &ChatScope) -> Result<(), ClientError>;
}

#[async_trait]
impl<T: ChatApi + ?Sized> ChatApi for Arc<T> {
    async fn fetch_messages(&self, scope: &ChatScope) -> Result<Vec<Value>, ClientError> {
        (**self).fetch_messages(scope).await
    }

    async fn fetch_status(&self, project_id: &str) -> Result<SessionStatus, ClientError> {
        (**self).fetch_status(project_id).await
    }

    async fn upload_image(
        &self,
        project_id: &str,
        image: DecodedImage,
        filename: &str,
    ) -> Result<PreparedImage, ClientError> {
        (**self).upload_image(project_id, image, filename).await
    }

    async fn submit_instruction(
        &self,
        route: InstructionRoute,
        project_id: &str,
        request: &InstructionRequest,
    ) -> Result<Value, ClientError> {
        (**self).submit_instruction(route, project_id, request).await
    }

    async fn clear_messages(&self, scope: &ChatScope) -> Result<(), ClientError> {
        (**self).clear_messages(scope).await
    }
}
