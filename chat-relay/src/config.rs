//! Process-wide gateway configuration.
//!
//! Resolved once at startup from CLI flags and the environment. Every route
//! shares the same backend base URL.

use std::net::{Ipv4Addr, SocketAddr};

/// Backend used when `CHAT_RELAY_API_BASE` is not set.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Port the gateway binds when `CHAT_RELAY_PORT` is not set.
pub const DEFAULT_PORT: u16 = 3000;

/// Gateway URL the CLI client talks to by default.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:3000";

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    backend_url: String,
    /// Address the gateway listens on.
    pub bind: SocketAddr,
}

impl GatewayConfig {
    /// Create a config; a trailing `/` on the backend URL is dropped.
    pub fn new(backend_url: impl Into<String>, bind: SocketAddr) -> Self {
        let backend_url = backend_url.into().trim_end_matches('/').to_string();
        Self { backend_url, bind }
    }

    /// Backend base URL without a trailing separator.
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Absolute backend URL for a path under `/api/`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.backend_url, path.trim_start_matches('/'))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_BACKEND_URL,
            SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_separator() {
        let config = GatewayConfig::new("http://backend:9000/", SocketAddr::from(([0, 0, 0, 0], 1)));
        assert_eq!(config.backend_url(), "http://backend:9000");
        assert_eq!(config.api_url("chat/p1/messages"), "http://backend:9000/api/chat/p1/messages");
    }

    #[test]
    fn api_url_does_not_double_separators() {
        let config = GatewayConfig::default();
        assert_eq!(config.api_url("/projects/"), "http://localhost:8080/api/projects/");
    }

    #[test]
    fn default_binds_loopback() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)));
    }
}
