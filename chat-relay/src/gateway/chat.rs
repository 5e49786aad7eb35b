//! Project-scoped chat routes: message history and instruction submit.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header::CONTENT_TYPE,
    response::Response,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{relay_json, segment, send, GatewayState, JSON_CONTENT_TYPE};
use crate::error::GatewayError;

const MESSAGES_FAILURE: &str = "Failed to fetch messages";
const SEND_FAILURE: &str = "Failed to send message";
const SEND_BACKEND_FAILURE: &str = "Failed to send message to backend";

const DEFAULT_MESSAGE_LIMIT: &str = "100";

/// Query parameters for the message list.
#[derive(Debug, Default, Deserialize)]
pub(super) struct MessagesQuery {
    conversation_id: Option<String>,
    limit: Option<String>,
}

/// Inbound instruction; every field is optional so the backend decides.
#[derive(Debug, Deserialize)]
pub(super) struct ChatSubmission {
    instruction: Option<String>,
    conversation_id: Option<String>,
    cli_preference: Option<String>,
    fallback_enabled: Option<bool>,
    images: Option<Vec<Value>>,
    is_initial_prompt: Option<bool>,
}

impl ChatSubmission {
    /// Body for the backend's `/chat` endpoint, with defaults filled in.
    fn into_backend_body(self) -> Value {
        json!({
            "instruction": self.instruction,
            "conversation_id": self.conversation_id,
            "cli_preference": self.cli_preference,
            "fallback_enabled": self.fallback_enabled,
            "images": self.images.unwrap_or_default(),
            "is_initial_prompt": self.is_initial_prompt.unwrap_or(false),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub(super) async fn list_messages(
    State(state): State<Arc<GatewayState>>,
    Path(project_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Response, GatewayError> {
    let limit = non_empty(query.limit.as_deref()).unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let mut params = vec![("limit", limit)];
    if let Some(conversation_id) = non_empty(query.conversation_id.as_deref()) {
        params.push(("conversation_id", conversation_id));
    }

    let request = state
        .backend_get(&format!("chat/{}/messages", segment(&project_id)))
        .query(&params);
    let response = send(request, MESSAGES_FAILURE).await?;
    relay_json(response, MESSAGES_FAILURE, MESSAGES_FAILURE).await
}

pub(super) async fn send_chat(
    State(state): State<Arc<GatewayState>>,
    Path(project_id): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let submission: ChatSubmission = serde_json::from_slice(&body)
        .map_err(|source| GatewayError::decode(SEND_FAILURE, source))?;

    let url = state
        .config
        .api_url(&format!("chat/{}/chat", segment(&project_id)));
    tracing::info!("[Chat] {project_id} -> {url}");

    let request = state
        .http
        .post(url)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .json(&submission.into_backend_body());
    let response = send(request, SEND_FAILURE).await?;
    relay_json(response, SEND_BACKEND_FAILURE, SEND_FAILURE).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use crate::gateway::testing::{client, closed_port_url, spawn_gateway, FakeBackend};

    #[tokio::test]
    async fn messages_default_limit() {
        let backend = FakeBackend::default();
        backend.respond("/api/chat/p1/messages", StatusCode::OK, r#"[{"id":1}]"#);
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .get(format!("{gateway}/api/chat/p1/messages"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!([{"id": 1}]));
        let request = &backend.requests_to("/api/chat/p1/messages")[0];
        assert_eq!(request.query.as_deref(), Some("limit=100"));
    }

    #[tokio::test]
    async fn messages_pass_conversation_and_limit() {
        let backend = FakeBackend::default();
        backend.respond("/api/chat/p1/messages", StatusCode::OK, "[]");
        let gateway = spawn_gateway(&backend.spawn().await).await;

        client()
            .get(format!(
                "{gateway}/api/chat/p1/messages?conversation_id=c9&limit=20"
            ))
            .send()
            .await
            .unwrap();

        let request = &backend.requests_to("/api/chat/p1/messages")[0];
        assert_eq!(request.query.as_deref(), Some("limit=20&conversation_id=c9"));
    }

    #[tokio::test]
    async fn messages_backend_error_keeps_status() {
        let backend = FakeBackend::default();
        backend.respond("/api/chat/p1/messages", StatusCode::BAD_GATEWAY, "upstream down");
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .get(format!("{gateway}/api/chat/p1/messages"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"error": MESSAGES_FAILURE, "details": "upstream down"})
        );
    }

    #[tokio::test]
    async fn chat_fills_defaults() {
        let backend = FakeBackend::default();
        backend.respond(
            "/api/chat/p1/chat",
            StatusCode::OK,
            r#"{"id":"s1","status":"running"}"#,
        );
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .post(format!("{gateway}/api/chat/p1"))
            .json(&json!({"instruction": "hello", "conversation_id": "c1"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"id": "s1", "status": "running"}));

        let request = &backend.requests_to("/api/chat/p1/chat")[0];
        assert_eq!(request.method, axum::http::Method::POST);
        let forwarded: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(
            forwarded,
            json!({
                "instruction": "hello",
                "conversation_id": "c1",
                "cli_preference": null,
                "fallback_enabled": null,
                "images": [],
                "is_initial_prompt": false,
            })
        );
    }

    #[tokio::test]
    async fn chat_backend_error_is_wrapped() {
        let backend = FakeBackend::default();
        backend.respond("/api/chat/p1/chat", StatusCode::UNPROCESSABLE_ENTITY, "bad instruction");
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .post(format!("{gateway}/api/chat/p1"))
            .json(&json!({"instruction": "hello"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], SEND_BACKEND_FAILURE);
        assert_eq!(body["details"], "bad instruction");
    }

    #[tokio::test]
    async fn chat_rejects_unparseable_body() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .post(format!("{gateway}/api/chat/p1"))
            .body("not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], SEND_FAILURE);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn chat_transport_failure() {
        let gateway = spawn_gateway(&closed_port_url().await).await;

        let response = client()
            .post(format!("{gateway}/api/chat/p1"))
            .json(&json!({"instruction": "hello"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], SEND_FAILURE);
    }
}
