//! The relay multiplexer.
//!
//! [`SessionManager`] is the single owner of every client session and of the
//! provider channels each session has open, keyed by agent. All registry
//! mutations happen under one async mutex; replies to clients are queued on
//! the session's outbound channel after the lock is released.

use super::{
    channel::{
        ChannelContext, ChannelEvent, ChannelEventKind, ChannelHandle, ChannelState,
        ChannelTimeouts, ProviderChannel,
    },
    provider::ProviderConnector,
};
use chorus_core::{
    agent::AgentRegistry,
    protocol::{ClientRequest, RelayErrorCode, RelayMessage},
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SESSION_EVENT_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("the relay is shutting down")]
    ShuttingDown,
}

/// The session loop's end of a registered session.
pub struct SessionHandle {
    pub id: Uuid,
    /// Events produced by this session's channels, in emission order.
    pub events: mpsc::Receiver<ChannelEvent>,
    /// Flips to `true` when the relay wants the client transport closed.
    pub closing: watch::Receiver<bool>,
}

struct Session {
    outbound: mpsc::Sender<RelayMessage>,
    events: mpsc::Sender<ChannelEvent>,
    closing: watch::Sender<bool>,
    channels: HashMap<String, ChannelHandle>,
}

impl Session {
    fn close_channels(&mut self) -> usize {
        let count = self.channels.len();
        for (_, mut channel) in self.channels.drain() {
            channel.close();
        }
        count
    }
}

pub struct SessionManager {
    registry: Arc<AgentRegistry>,
    connector: Arc<dyn ProviderConnector>,
    timeouts: ChannelTimeouts,
    sessions: Mutex<HashMap<Uuid, Session>>,
    shut_down: AtomicBool,
}

impl SessionManager {
    pub fn new(
        registry: Arc<AgentRegistry>,
        connector: Arc<dyn ProviderConnector>,
        timeouts: ChannelTimeouts,
    ) -> Self {
        Self {
            registry,
            connector,
            timeouts,
            sessions: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Registers a new client session whose replies go to `outbound`.
    pub async fn open_session(
        &self,
        outbound: mpsc::Sender<RelayMessage>,
    ) -> Result<SessionHandle, RelayError> {
        let mut sessions = self.sessions.lock().await;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(RelayError::ShuttingDown);
        }
        let id = Uuid::new_v4();
        let (events_tx, events) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let (closing_tx, closing) = watch::channel(false);
        sessions.insert(
            id,
            Session {
                outbound,
                events: events_tx,
                closing: closing_tx,
                channels: HashMap::new(),
            },
        );
        debug!(session_id = %id, active_sessions = sessions.len(), "Session registered.");
        Ok(SessionHandle {
            id,
            events,
            closing,
        })
    }

    /// Handles one text frame from the client.
    ///
    /// Every failure is answered with an error message; the connection is never closed here.
    pub async fn on_client_message(&self, session_id: Uuid, raw: &str) {
        let request = match serde_json::from_str::<ClientRequest>(raw) {
            Ok(request) => request,
            Err(e) => {
                debug!(%session_id, error = %e, "Unparseable client frame.");
                self.reject(session_id, None, RelayErrorCode::MalformedMessage)
                    .await;
                return;
            }
        };

        let ClientRequest { agent_id, text } = request;
        if text.trim().is_empty() {
            self.reject(session_id, Some(&agent_id), RelayErrorCode::MalformedMessage)
                .await;
            return;
        }

        let refusal = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(&session_id) else {
                debug!(%session_id, "Dropping client frame for a closed session.");
                return;
            };
            match self.registry.get(&agent_id) {
                None => Some(RelayErrorCode::InvalidAgent),
                // The entry stays until its terminal event has been forwarded.
                Some(_) if session.channels.contains_key(&agent_id) => {
                    Some(RelayErrorCode::AgentBusy)
                }
                Some(profile) => {
                    let ctx = ChannelContext {
                        connector: self.connector.clone(),
                        timeouts: self.timeouts,
                        events: session.events.clone(),
                    };
                    let channel =
                        ProviderChannel::spawn(session_id, &agent_id, profile.clone(), text, ctx);
                    info!(%session_id, %agent_id, channel_id = %channel.id(), "Opened provider channel.");
                    session.channels.insert(agent_id.clone(), channel);
                    None
                }
            }
        };

        if let Some(code) = refusal {
            self.reject(session_id, Some(&agent_id), code).await;
        }
    }

    /// Sends an error reply to the client of `session_id`.
    pub async fn reject(&self, session_id: Uuid, agent_id: Option<&str>, code: RelayErrorCode) {
        let outbound = {
            let sessions = self.sessions.lock().await;
            match sessions.get(&session_id) {
                Some(session) => session.outbound.clone(),
                None => return,
            }
        };
        warn!(%session_id, agent_id, error = %code, "Rejecting client request.");
        if outbound
            .send(RelayMessage::error(agent_id, code))
            .await
            .is_err()
        {
            debug!(%session_id, "Client went away before the error reply.");
        }
    }

    /// Forwards a channel event to its client, retiring the channel on terminal events.
    pub async fn on_provider_event(&self, session_id: Uuid, event: ChannelEvent) {
        let outbound = {
            let mut sessions = self.sessions.lock().await;
            let Some(session) = sessions.get_mut(&session_id) else {
                return;
            };
            let current = session.channels.get(&event.agent_id).map(ChannelHandle::id);
            if current != Some(event.channel_id) {
                debug!(%session_id, agent_id = %event.agent_id, "Ignoring event from a superseded channel.");
                return;
            }
            if matches!(
                event.kind,
                ChannelEventKind::Finished | ChannelEventKind::Failed(_)
            ) {
                session.channels.remove(&event.agent_id);
            }
            session.outbound.clone()
        };

        let ChannelEvent { agent_id, kind, .. } = event;
        let message = match kind {
            ChannelEventKind::Audio(audio) => RelayMessage::audio(agent_id, audio),
            ChannelEventKind::Finished => RelayMessage::finished(agent_id),
            ChannelEventKind::Failed(code) => RelayMessage::error(Some(&agent_id), code),
        };
        if outbound.send(message).await.is_err() {
            debug!(%session_id, "Client went away; dropping provider event.");
        }
    }

    /// Tears down a session and every channel it owns. Idempotent.
    pub async fn on_client_disconnect(&self, session_id: Uuid) {
        let removed = self.sessions.lock().await.remove(&session_id);
        if let Some(mut session) = removed {
            let closed = session.close_channels();
            info!(%session_id, closed_channels = closed, "Session closed.");
        }
    }

    /// Closes every channel and asks every client transport to close. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        let mut closed = 0;
        for mut session in drained {
            closed += session.close_channels();
            session.closing.send_replace(true);
        }
        info!(closed_channels = closed, "Relay sessions shut down.");
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn channel_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map_or(0, |session| session.channels.len())
    }

    pub async fn channel_state(&self, session_id: Uuid, agent_id: &str) -> Option<ChannelState> {
        self.sessions
            .lock()
            .await
            .get(&session_id)?
            .channels
            .get(agent_id)
            .map(ChannelHandle::state)
    }
}
