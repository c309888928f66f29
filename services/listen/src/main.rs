//! chorus-listen: plays a scripted multi-agent conversation through a relay
//! and records what a listener would hear.
//!
//! Each `--say AGENT=TEXT` line is sent to the relay in order per agent;
//! different agents talk over each other. Audio is laid out on a wall-clock
//! timeline exactly as a live player would schedule it, then written as WAV.

use anyhow::{Context, Result, bail};
use chorus_core::{
    output::TimelineOutput,
    protocol::{ClientRequest, RelayMessage},
};
use clap::Parser;
use futures_util::{Sink, SinkExt, StreamExt};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod conversation;
mod player;
mod recorder;

use conversation::{Conversation, Utterance};
use player::Player;

#[derive(Parser)]
#[command(name = "chorus-listen")]
#[command(about = "Speak a scripted conversation through a Chorus relay and record it")]
#[command(version)]
struct Cli {
    /// Relay WebSocket endpoint
    #[arg(long, default_value = "ws://127.0.0.1:9000/ws")]
    url: String,

    /// A line to speak, as AGENT=TEXT (repeatable)
    #[arg(long = "say", value_name = "AGENT=TEXT", required = true)]
    lines: Vec<Utterance>,

    /// Where to write the recorded conversation
    #[arg(long, default_value = "conversation.wav")]
    out: PathBuf,

    /// Give up after this many seconds without a relay message
    #[arg(long, default_value = "30")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let (ws, _) = connect_async(cli.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to relay at {}", cli.url))?;
    info!(url = %cli.url, lines = cli.lines.len(), "Connected to relay.");
    let (mut ws_tx, mut ws_rx) = ws.split();

    let started = Instant::now();
    let output = TimelineOutput::new(move || started.elapsed().as_secs_f64());
    let mut player = Player::new(output, Conversation::new(cli.lines));

    for request in player.start() {
        send_request(&mut ws_tx, &request).await?;
    }

    let silence = Duration::from_secs(cli.timeout);
    while !player.is_done() {
        let frame = tokio::time::timeout(silence, ws_rx.next())
            .await
            .with_context(|| format!("No message from the relay for {}s", cli.timeout))?;
        let Some(frame) = frame else {
            bail!("Relay closed the connection before the conversation finished");
        };
        match frame.context("Relay connection failed")? {
            Message::Text(text) => match RelayMessage::parse(text.as_str()) {
                Ok(message) => {
                    if let Some(request) = player.handle(message) {
                        send_request(&mut ws_tx, &request).await?;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring unrecognized relay message."),
            },
            Message::Close(frame) => {
                bail!("Relay closed the connection: {frame:?}");
            }
            _ => {}
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;

    let failed = player.failed_agents();
    if !failed.is_empty() {
        warn!(agents = ?failed, "Some agents did not finish their lines.");
    }

    let output = player.into_output();
    recorder::write_wav(&cli.out, &output.render())
        .with_context(|| format!("Failed to write {}", cli.out.display()))?;
    info!(path = %cli.out.display(), seconds = output.duration(), "Conversation recorded.");
    Ok(())
}

async fn send_request<S>(ws_tx: &mut S, request: &ClientRequest) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let payload = serde_json::to_string(request)?;
    ws_tx.send(Message::Text(payload.into())).await?;
    info!(agent_id = %request.agent_id, "Sent line.");
    Ok(())
}
