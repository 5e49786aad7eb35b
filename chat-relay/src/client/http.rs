//! `ChatApi` over HTTP, talking to a chat-relay gateway.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::api::{ChatApi, ChatScope, InstructionRoute};
use super::images::DecodedImage;
use crate::error::ClientError;
use crate::types::{ErrorEnvelope, InstructionRequest, PreparedImage, SessionStatus, UploadResponse};

/// HTTP client for the gateway routes.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    fn project_url(&self, prefix: &str, project_id: &str, suffix: &str) -> String {
        format!(
            "{}{prefix}{}{suffix}",
            self.base_url,
            urlencoding::encode(project_id)
        )
    }

    fn messages_url(&self, scope: &ChatScope) -> String {
        self.project_url("/api/chat/", &scope.project_id, "/messages")
    }

    fn instruction_url(&self, route: InstructionRoute, project_id: &str) -> String {
        match route {
            InstructionRoute::Chat => self.project_url("/api/chat/", project_id, ""),
            InstructionRoute::Act => self.project_url("/api/proxy/chat/", project_id, "/act"),
        }
    }
}

fn conversation_query(scope: &ChatScope) -> Vec<(&'static str, &str)> {
    scope
        .conversation_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| vec![("conversation_id", id)])
        .unwrap_or_default()
}

/// Turn a non-2xx answer into `ClientError::Status`, preferring the envelope's
/// `error` text over the raw body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("Failed to read error body ({status}): {e}");
            String::new()
        }
    };
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error)
        .unwrap_or(body);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let body = ensure_success(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_messages(&self, scope: &ChatScope) -> Result<Vec<Value>, ClientError> {
        let response = self
            .http
            .get(self.messages_url(scope))
            .query(&conversation_query(scope))
            .send()
            .await?;
        read_json(response).await
    }

    async fn fetch_status(&self, project_id: &str) -> Result<SessionStatus, ClientError> {
        let response = self
            .http
            .get(self.project_url("/api/chat/", project_id, "/status"))
            .send()
            .await?;
        read_json(response).await
    }

    async fn upload_image(
        &self,
        project_id: &str,
        image: DecodedImage,
        filename: &str,
    ) -> Result<PreparedImage, ClientError> {
        let part = Part::bytes(image.bytes)
            .file_name(filename.to_string())
            .mime_str(&image.mime)?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.project_url("/api/proxy/assets/", project_id, "/upload"))
            .multipart(form)
            .send()
            .await?;
        let upload: UploadResponse = read_json(response).await?;
        Ok(upload.into())
    }

    async fn submit_instruction(
        &self,
        route: InstructionRoute,
        project_id: &str,
        request: &InstructionRequest,
    ) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(self.instruction_url(route, project_id))
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn clear_messages(&self, scope: &ChatScope) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.project_url("/api/proxy/chat/", &scope.project_id, "/messages"))
            .query(&conversation_query(scope))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
