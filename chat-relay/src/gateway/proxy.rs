//! Generic passthrough: `/api/proxy/<path>` is forwarded to `<backend>/api/<path>`.

use std::sync::Arc;

use axum::{
    body::{self, Body, Bytes},
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE,
        },
        HeaderMap, HeaderName, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, info};

use super::{send, GatewayState, JSON_CONTENT_TYPE};
use crate::error::GatewayError;

const PROXY_PREFIX: &str = "/api/proxy/";
const PROXY_FAILURE: &str = "Proxy request failed";

/// Collection resource the backend redirects to a trailing-slash URL.
const TRAILING_SLASH_RESOURCE: &str = "projects";

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

fn cors_headers() -> [(HeaderName, &'static str); 3] {
    [
        (ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
        (ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
        (ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
    ]
}

/// Backend path for a proxied path, relative to `/api/`.
///
/// The `projects` collection always gets a trailing `/`.
pub(super) fn backend_path(path: &str) -> String {
    let first = path.split('/').next().unwrap_or_default();
    if first == TRAILING_SLASH_RESOURCE && !path.ends_with('/') {
        format!("{path}/")
    } else {
        path.to_string()
    }
}

/// GET and DELETE never carry a body.
fn carries_body(method: &Method) -> bool {
    method != Method::GET && method != Method::DELETE
}

/// Buffer the inbound body. Unreadable or empty bodies count as absent.
async fn read_body(body: Body) -> Option<Bytes> {
    match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(bytes),
        Err(e) => {
            debug!("Discarding unreadable request body: {e}");
            None
        }
    }
}

/// CORS preflight, answered locally.
pub(super) async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

pub(super) async fn forward(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = uri.path().strip_prefix(PROXY_PREFIX).unwrap_or_default();
    let mut target = state.config.api_url(&backend_path(path));
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }

    info!("[Proxy] {method} {uri} -> {target}");

    let body = if carries_body(&method) {
        read_body(body).await
    } else {
        None
    };

    let mut request = state
        .http
        .request(method, &target)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
    if let Some(authorization) = headers.get(AUTHORIZATION) {
        request = request.header(AUTHORIZATION, authorization.clone());
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    match relay(request).await {
        Ok(response) => response,
        Err(e) => {
            error!("[Proxy] {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN)],
                Json(e.envelope()),
            )
                .into_response()
        }
    }
}

/// Relay status and raw body verbatim, adding CORS headers.
async fn relay(request: reqwest::RequestBuilder) -> Result<Response, GatewayError> {
    let response = send(request, PROXY_FAILURE).await?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|source| GatewayError::transport(PROXY_FAILURE, source))?;

    info!(
        "[Proxy] Response: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    );

    Ok((
        status,
        [(CONTENT_TYPE, JSON_CONTENT_TYPE)],
        cors_headers(),
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{client, closed_port_url, spawn_gateway, FakeBackend};

    #[test]
    fn projects_paths_get_trailing_separator() {
        assert_eq!(backend_path("projects"), "projects/");
        assert_eq!(backend_path("projects/p1"), "projects/p1/");
        assert_eq!(backend_path("projects/p1/"), "projects/p1/");
        assert_eq!(backend_path("projectsx/p1"), "projectsx/p1");
        assert_eq!(backend_path("chat/p1/act"), "chat/p1/act");
    }

    #[tokio::test]
    async fn options_is_answered_locally() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .request(Method::OPTIONS, format!("{gateway}/api/proxy/chat/p1/act"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], ALLOW_HEADERS);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn get_and_delete_never_forward_a_body() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;

        for method in [Method::GET, Method::DELETE] {
            let response = client()
                .request(method, format!("{gateway}/api/proxy/chat/p1/messages"))
                .body(r#"{"ignored":true}"#)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.body.is_empty()));
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[1].method, Method::DELETE);
    }

    #[tokio::test]
    async fn write_methods_forward_raw_body() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;
        let payload = r#"{"instruction":"hi",  "x":[1,2]}"#;

        for method in [Method::POST, Method::PUT] {
            client()
                .request(method, format!("{gateway}/api/proxy/chat/p1/act"))
                .body(payload)
                .send()
                .await
                .unwrap();
        }

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request.path, "/api/chat/p1/act");
            assert_eq!(request.body, payload.as_bytes());
        }
    }

    #[tokio::test]
    async fn empty_post_reaches_backend_without_body() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .post(format!("{gateway}/api/proxy/chat/p1/act"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let request = &backend.requests_to("/api/chat/p1/act")[0];
        assert_eq!(request.method, Method::POST);
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn large_body_is_forwarded_whole() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;
        let payload = vec![b'x'; 33 * 1024 * 1024];

        let response = client()
            .put(format!("{gateway}/api/proxy/assets/p1/blob"))
            .body(payload.clone())
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let request = &backend.requests_to("/api/assets/p1/blob")[0];
        assert_eq!(request.body.len(), payload.len());
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .patch(format!("{gateway}/api/proxy/chat/p1/messages"))
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn only_authorization_is_forwarded() {
        let backend = FakeBackend::default();
        let gateway = spawn_gateway(&backend.spawn().await).await;

        client()
            .post(format!("{gateway}/api/proxy/chat/p1/act"))
            .header(AUTHORIZATION, "Bearer secret-token")
            .header("x-custom", "1")
            .header("cookie", "a=b")
            .header(CONTENT_TYPE, "text/plain")
            .body("{}")
            .send()
            .await
            .unwrap();

        let request = &backend.requests()[0];
        assert_eq!(request.headers[AUTHORIZATION], "Bearer secret-token");
        assert_eq!(request.headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert!(request.headers.get("x-custom").is_none());
        assert!(request.headers.get("cookie").is_none());
    }

    #[tokio::test]
    async fn relays_backend_status_body_and_query() {
        let backend = FakeBackend::default();
        backend.respond("/api/projects/", StatusCode::CONFLICT, r#"{"detail":"exists"}"#);
        let gateway = spawn_gateway(&backend.spawn().await).await;

        let response = client()
            .get(format!("{gateway}/api/proxy/projects?limit=5&q=a%20b"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(response.text().await.unwrap(), r#"{"detail":"exists"}"#);

        let request = &backend.requests()[0];
        assert_eq!(request.path, "/api/projects/");
        assert_eq!(request.query.as_deref(), Some("limit=5&q=a%20b"));
    }

    #[tokio::test]
    async fn transport_failure_is_a_local_500() {
        let gateway = spawn_gateway(&closed_port_url().await).await;

        let response = client()
            .get(format!("{gateway}/api/proxy/chat/p1/messages"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], PROXY_FAILURE);
        assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));
    }
}
