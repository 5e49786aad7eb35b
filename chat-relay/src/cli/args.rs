//! CLI argument definitions.

use std::net::IpAddr;

use clap::{Args, Parser, Subcommand};

use chat_relay::config::{DEFAULT_BACKEND_URL, DEFAULT_GATEWAY_URL, DEFAULT_PORT};

/// chat-relay - forward chat requests to a backend and poll it for updates
#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the forwarding gateway
    Serve {
        /// Backend service base URL
        #[arg(long, env = "CHAT_RELAY_API_BASE", default_value = DEFAULT_BACKEND_URL)]
        backend_url: String,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, env = "CHAT_RELAY_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Poll a project's messages and session status until Ctrl-C
    Watch {
        #[command(flatten)]
        target: Target,
    },

    /// Submit an instruction, then watch for updates
    Send {
        #[command(flatten)]
        target: Target,

        /// Run as an act instead of a chat
        #[arg(long)]
        act: bool,

        /// Preferred CLI agent on the backend
        #[arg(long)]
        cli: Option<String>,

        /// Allow the backend to fall back to another CLI agent
        #[arg(long)]
        fallback: bool,

        /// Image to attach (file path or data URI, repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// Exit after submitting instead of watching
        #[arg(long)]
        no_watch: bool,

        /// Instruction text
        #[arg(trailing_var_arg = true, required = true)]
        instruction: Vec<String>,
    },

    /// Clear a project's message history
    Clear {
        #[command(flatten)]
        target: Target,
    },
}

/// Which gateway and project/conversation a client command talks to.
#[derive(Args, Debug)]
pub struct Target {
    /// Project ID
    pub project_id: String,

    /// Conversation ID
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// Gateway base URL
    #[arg(long, env = "CHAT_RELAY_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,
}
