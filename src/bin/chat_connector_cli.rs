//! chat-connector CLI: send one message through the proxy and stream the reply.
//!
//! Usage:
//!   chat-connector-cli send <base-url> [--agent <id>] <message...>
//!   chat-connector-cli health <base-url>

use anyhow::{bail, Context};
use chat_connector::{ChatClient, ChatEvent};
use futures::StreamExt;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "send" => cmd_send(&args[2], &args[3..]).await,
        "health" => cmd_health(&args[2]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"chat-connector-cli: send a chat message through the proxy

USAGE:
    chat-connector-cli <COMMAND> <BASE_URL> [OPTIONS]

COMMANDS:
    send <base-url> [--agent <id>] <message...>   Send a message and stream the reply
    health <base-url>                             Probe the proxy's /health endpoint

ENVIRONMENT:
    RUST_LOG                                      Log filter (default: warn)"#
    );
}

async fn cmd_health(base_url: &str) -> anyhow::Result<()> {
    let client = ChatClient::new(base_url)?;
    client.health().await.context("health check failed")?;
    println!("ok");
    Ok(())
}

async fn cmd_send(base_url: &str, rest: &[String]) -> anyhow::Result<()> {
    let mut builder = ChatClient::builder(base_url);
    let mut words = Vec::new();
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        if arg == "--agent" {
            let id = iter.next().context("--agent needs a value")?;
            builder = builder.agent_id(id.clone());
        } else {
            words.push(arg.as_str());
        }
    }
    if words.is_empty() {
        bail!("no message given");
    }
    let client = builder.build()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut stream = client.stream_message_with_cancel(words.join(" "), &cancel);
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event? {
            ChatEvent::Delta(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            ChatEvent::RateLimitWait { remaining, .. } => {
                eprintln!("[waiting {}ms for rate limit]", remaining.as_millis());
            }
            ChatEvent::Retrying { attempt, delay, reason } => {
                eprintln!(
                    "\n[retry {} after {}ms: {reason}]",
                    attempt + 1,
                    delay.as_millis()
                );
            }
            ChatEvent::SessionCreated { session_id } => {
                eprintln!("[session {session_id}]");
            }
            ChatEvent::SessionRestart { restarts } => {
                eprintln!("[session expired, restart {restarts}]");
            }
            ChatEvent::Completed { stats, .. } => {
                writeln!(stdout)?;
                eprintln!(
                    "[done: {} attempt(s), {}ms]",
                    stats.attempts, stats.duration_ms
                );
            }
            ChatEvent::Cancelled { .. } => {
                writeln!(stdout)?;
                eprintln!("[cancelled]");
            }
        }
    }
    Ok(())
}
