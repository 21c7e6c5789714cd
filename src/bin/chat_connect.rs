//! Interactive chat client
//!
//! Connects to the configured server and sends every stdin line to the
//! configured conversation. Lines starting with `/` are commands:
//!
//! ```text
//! /typing on|off    send a typing indicator
//! /token <jwt>      sign in (reconnects if idle)
//! /logout           drop the token
//! /connect          open the channel
//! /disconnect       close the channel
//! /status           print the connection snapshot
//! ```
//!
//! Usage: `chat_connect [config.yaml]` (default: `$CHAT_CONFIG_PATH` or
//! `config/client_config.yaml`). Exits on Ctrl+C or end of input.

use anyhow::{Context, Result};
use chat_realtime::bin_common::{load_config_from_env, parse_args, ConfigType};
use chat_realtime::chatlink::{ClientEvent, ConnectionManager, ConnectionManagerBuilder, Session};
use chat_realtime::config::ClientConfig;
use chat_realtime::logging::init_tracing;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_type = match parse_args().into_iter().next() {
        Some(path) => ConfigType::Custom(path),
        None => ConfigType::Client,
    };
    let config_path = load_config_from_env(config_type);

    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let (session_tx, session_rx) = watch::channel(config.session());

    let mut manager = ConnectionManagerBuilder::from_config(config.manager_config())
        .session_source(session_rx)
        .build()?;
    manager.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_line(&manager, &session_tx, &config.conversation_id, line.trim()),
                    None => {
                        info!("End of input, shutting down");
                        break;
                    }
                }
            }
            event = manager.next_event() => {
                match event {
                    Some(event) => log_event(&event),
                    None => break,
                }
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

fn handle_line(
    manager: &ConnectionManager,
    session_tx: &watch::Sender<Session>,
    conversation_id: &str,
    line: &str,
) {
    if line.is_empty() {
        return;
    }

    let mut parts = line.splitn(2, ' ');
    match (parts.next(), parts.next().map(str::trim)) {
        (Some("/typing"), Some(flag)) => manager.send_typing(conversation_id, flag == "on"),
        (Some("/token"), Some(token)) => {
            let _ = session_tx.send(Session::authenticated(token));
            info!("Session updated");
        }
        (Some("/logout"), _) => {
            let _ = session_tx.send(Session::anonymous());
            info!("Signed out");
        }
        (Some("/connect"), _) => manager.connect(),
        (Some("/disconnect"), _) => manager.disconnect(),
        (Some("/status"), _) => {
            let info = manager.info();
            info!(
                "Status: {} (latency: {}, retries: {}/{}, last error: {})",
                info.status,
                info.latency_ms.map(|l| format!("{}ms", l)).unwrap_or_else(|| "-".to_string()),
                info.retry_attempts,
                info.max_retries,
                info.last_error.as_deref().unwrap_or("-")
            );
        }
        (Some(command), _) if command.starts_with('/') => warn!("Unknown command: {}", command),
        _ => manager.send_message(line, conversation_id, None),
    }
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Status(info) => match &info.last_error {
            Some(reason) => info!("[status] {} ({})", info.status, reason),
            None => info!("[status] {}", info.status),
        },
        ClientEvent::MessageDelta { .. } => {}
        ClientEvent::MessageCompleted(message) => {
            info!("[{}] {}", message.conversation_id, message.full_text);
        }
        ClientEvent::Typing { is_typing } => {
            if *is_typing {
                info!("[typing] assistant is typing...");
            }
        }
        ClientEvent::ServerError(payload) => error!("[server error] {}", payload),
        ClientEvent::AuthError(reason) => error!("[auth] {} (use /token to sign in again)", reason),
        ClientEvent::RateLimited(payload) => warn!("[rate limit] {}", payload),
    }
}
