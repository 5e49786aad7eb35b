//! Test support: a recording fake backend and loopback servers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};

use super::{router, GatewayState};
use crate::config::GatewayConfig;

/// One request as seen by the fake backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A backend that records every request and answers from a path table.
///
/// Unknown paths answer `200 {}`.
#[derive(Clone, Default)]
pub struct FakeBackend {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responses: Arc<Mutex<HashMap<String, (StatusCode, String)>>>,
}

impl FakeBackend {
    pub fn respond(&self, path: &str, status: StatusCode, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Serve on an ephemeral loopback port; returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .fallback(record)
            .layer(DefaultBodyLimit::disable())
            .with_state(self.clone());
        format!("http://{}", serve(app).await)
    }
}

async fn record(
    State(backend): State<FakeBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    backend.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: path.clone(),
        query: uri.query().map(String::from),
        headers,
        body: body.to_vec(),
    });

    let (status, body) = backend
        .responses
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or((StatusCode::OK, "{}".to_string()));
    (status, body).into_response()
}

/// Serve a router on an ephemeral loopback port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Run a gateway in front of `backend_url`; returns the gateway base URL.
pub async fn spawn_gateway(backend_url: &str) -> String {
    let config = GatewayConfig::new(backend_url, SocketAddr::from(([127, 0, 0, 1], 0)));
    let state = Arc::new(GatewayState::with_client(config, client()));
    format!("http://{}", serve(router(state)).await)
}

/// A backend URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// HTTP client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
