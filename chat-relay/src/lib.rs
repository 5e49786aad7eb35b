//! chat-relay - forward chat traffic to a backend service and poll it for updates.
//!
//! Architecture:
//! - The gateway is a set of stateless axum handlers in front of the backend
//! - The polling client talks to the gateway over plain HTTP on a fixed interval
//! - Chat and session state live in the backend; nothing here persists

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod types;
