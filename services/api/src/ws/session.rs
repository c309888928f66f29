//! Manages the WebSocket connection lifecycle for a relay client.

use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chorus_core::protocol::{RelayErrorCode, RelayMessage};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};

const OUTBOUND_CAPACITY: usize = 256;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one client connection from registration to teardown.
///
/// Client frames, channel events and the relay's close signal are handled in a
/// single loop, so all events of one session are processed in order. Replies
/// are drained into the socket by a separate writer task.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (socket_tx, mut socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

    let sessions = state.sessions.clone();
    let mut session = match sessions.open_session(outbound_tx).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Refusing WebSocket connection.");
            let mut socket_tx = socket_tx;
            let _ = socket_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let session_id = session.id;
    tracing::Span::current().record("session_id", session_id.to_string());
    info!("New WebSocket connection.");

    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx).in_current_span());

    loop {
        tokio::select! {
            frame = socket_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    sessions.on_client_message(session_id, text.as_str()).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Rejecting binary frame.");
                    sessions.reject(session_id, None, RelayErrorCode::MalformedMessage).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Error receiving from client WebSocket.");
                    break;
                }
            },
            Some(event) = session.events.recv() => {
                sessions.on_provider_event(session_id, event).await;
            },
            Ok(()) = session.closing.changed() => {
                if *session.closing.borrow_and_update() {
                    info!("Relay is shutting down; closing client connection.");
                    break;
                }
            },
        }
    }

    // Dropping the last outbound sender lets the writer flush and send a close frame.
    sessions.on_client_disconnect(session_id).await;
    drop(session);
    if let Err(e) = writer.await {
        error!(error = ?e, "Outbound writer task failed.");
    }
    info!("WebSocket session finished.");
}

/// Drains queued relay messages into the socket until every sender is gone.
async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<RelayMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, &msg).await {
            debug!(error = %e, "Client socket closed while sending.");
            return;
        }
    }
    let _ = socket_tx.send(Message::Close(None)).await;
}

/// A helper function to serialize and send a `RelayMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: &RelayMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
