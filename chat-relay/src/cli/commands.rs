//! CLI command execution.
//!
//! Client commands are thin - every call goes through a running gateway.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use chat_relay::client::{
    encode_data_uri, ChatScope, ChatState, HttpChatApi, InstructionOptions, InstructionRoute,
    PollingClient,
};
use chat_relay::config::GatewayConfig;
use chat_relay::gateway;
use chat_relay::types::ImageAttachment;

use super::args::{Cli, Commands, Target};

/// How often `watch` looks at the client state.
const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            backend_url,
            host,
            port,
        } => {
            let config = GatewayConfig::new(backend_url, SocketAddr::new(host, port));
            gateway::start_server(config).await
        }

        Commands::Watch { target } => {
            let client = connect(&target);
            client.mount().await;
            watch(&client).await
        }

        Commands::Send {
            target,
            act,
            cli,
            fallback,
            images,
            no_watch,
            instruction,
        } => {
            let instruction = instruction.join(" ");
            if instruction.trim().is_empty() {
                bail!("Instruction is required for send command");
            }

            let options = InstructionOptions {
                cli_preference: cli,
                fallback_enabled: fallback.then_some(true),
                images: images
                    .iter()
                    .map(String::as_str)
                    .map(attachment_from_arg)
                    .collect::<Result<_>>()?,
            };
            let route = if act {
                InstructionRoute::Act
            } else {
                InstructionRoute::Chat
            };

            let client = connect(&target);
            client.mount().await;
            let session = client
                .submit_instruction(route, &instruction, options)
                .await
                .with_context(|| format!("Failed to execute {route}"))?;
            println!("Session: {}", serde_json::to_string(&session)?);

            if no_watch {
                client.stop_polling();
                return Ok(());
            }
            watch(&client).await
        }

        Commands::Clear { target } => {
            let client = connect(&target);
            client
                .clear_messages()
                .await
                .context("Failed to clear messages")?;
            println!("Cleared messages for {}", client.scope().await);
            Ok(())
        }
    }
}

fn connect(target: &Target) -> PollingClient<HttpChatApi> {
    let mut scope = ChatScope::new(&target.project_id);
    if let Some(conversation) = &target.conversation {
        scope = scope.with_conversation(conversation);
    }
    PollingClient::new(HttpChatApi::new(&target.gateway_url), scope)
}

/// Print state changes until Ctrl-C.
async fn watch(client: &PollingClient<HttpChatApi>) -> Result<()> {
    let mut last = client.snapshot().await;
    println!(
        "Watching {} ({} messages). Press Ctrl-C to stop.",
        client.scope().await,
        last.messages.len()
    );

    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = ticker.tick() => {
                let current = client.snapshot().await;
                report_changes(&last, &current);
                last = current;
            }
        }
    }

    client.stop_polling();
    Ok(())
}

fn report_changes(previous: &ChatState, current: &ChatState) {
    if current.messages != previous.messages {
        let start = if current.messages.starts_with(&previous.messages) {
            previous.messages.len()
        } else {
            println!("--- {} messages", current.messages.len());
            0
        };
        for message in &current.messages[start..] {
            println!("{}", describe_message(message));
        }
    }

    if current.current_session != previous.current_session
        || current.is_loading != previous.is_loading
    {
        match &current.current_session {
            Some(session) => println!(
                "[session] {} {}{}",
                session.get("id").and_then(Value::as_str).unwrap_or("?"),
                session.get("status").and_then(Value::as_str).unwrap_or("unknown"),
                if current.is_loading { " (working)" } else { "" }
            ),
            None => println!("[session] none"),
        }
    }

    if current.error != previous.error {
        if let Some(error) = &current.error {
            eprintln!("[error] {error}");
        }
    }
}

/// One line per message: `[role] content` when present, raw JSON otherwise.
fn describe_message(message: &Value) -> String {
    let role = message.get("role").and_then(Value::as_str).unwrap_or("?");
    match message.get("content").and_then(Value::as_str) {
        Some(content) => format!("[{role}] {content}"),
        None => message.to_string(),
    }
}

/// Data URIs and remote URLs pass through; anything else is read as a file.
fn attachment_from_arg(arg: &str) -> Result<ImageAttachment> {
    if arg.starts_with("data:") || arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(ImageAttachment::new(arg));
    }

    let path = Path::new(arg);
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    let mut attachment = ImageAttachment::new(encode_data_uri(image_mime(path), &bytes));
    if let Some(name) = path.file_name() {
        attachment = attachment.named(name.to_string_lossy());
    }
    Ok(attachment)
}

fn image_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
