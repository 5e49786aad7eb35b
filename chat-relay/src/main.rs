//! chat-relay - forward chat traffic to a backend service and poll it for updates.
//!
//! Architecture:
//! - `serve` runs the forwarding gateway in front of the backend
//! - `watch`, `send` and `clear` are thin clients that talk to a gateway

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

const DEFAULT_LOG_FILTER: &str = "chat_relay=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
