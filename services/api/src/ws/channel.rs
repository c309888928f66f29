//! Provider channels.
//!
//! A channel is one outbound provider stream bound to a single (session,
//! agent) pair. It runs as its own task, walks an explicit lifecycle, and
//! reports what the provider produced as [`ChannelEvent`]s on the owning
//! session's event queue. It never writes to the client directly.

use super::provider::{OutboundFrame, ProviderConnector, ProviderError, ProviderTransport};
use chorus_core::{agent::AgentProfile, protocol::RelayErrorCode};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Lifecycle of a provider channel.
///
/// ```text
/// Idle -> Connecting -> Streaming -> Finalizing -> Closed
///   \________\_____________\___________\-> Errored -> Closed
/// ```
/// Any live state may also jump straight to `Closed` when the session goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Streaming,
    Finalizing,
    Closed,
    Errored,
}

impl ChannelState {
    /// A live channel still owns (or is about to own) a provider connection.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Closed | Self::Errored)
    }

    pub fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Errored, _) => false,
            (_, Errored) => true,
            (Idle, Connecting)
            | (Connecting, Streaming)
            | (Streaming, Streaming)
            | (Streaming, Finalizing) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ChannelState,
        to: ChannelState,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("channel was cancelled")]
    Cancelled,
}

impl ChannelError {
    /// The error code reported to the client for this failure.
    pub fn code(&self) -> RelayErrorCode {
        match self {
            Self::Provider(_) => RelayErrorCode::ProviderError,
            Self::InvalidTransition { .. } | Self::Cancelled => RelayErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Audio(String),
    Finished,
    Failed(RelayErrorCode),
}

/// Something a channel wants forwarded to its client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel_id: ChannelId,
    pub agent_id: String,
    pub kind: ChannelEventKind,
}

/// Upper bounds on how long a channel waits on the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTimeouts {
    pub connect: Duration,
    /// Longest silence tolerated between two provider frames.
    pub idle: Duration,
}

impl Default for ChannelTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            idle: Duration::from_secs(30),
        }
    }
}

/// What a channel task needs from its surroundings.
#[derive(Clone)]
pub(crate) struct ChannelContext {
    pub connector: Arc<dyn ProviderConnector>,
    pub timeouts: ChannelTimeouts,
    pub events: mpsc::Sender<ChannelEvent>,
}

/// The session manager's handle on a running channel.
///
/// Dropping the handle closes the channel.
pub struct ChannelHandle {
    id: ChannelId,
    state: watch::Receiver<ChannelState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live() && !self.task.is_finished()
    }

    /// Asks the channel to release its provider connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    #[cfg(test)]
    pub(crate) async fn wait_for_state(&mut self, state: ChannelState) {
        let _ = self.state.wait_for(|s| *s == state).await;
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct ProviderChannel {
    id: ChannelId,
    agent_id: String,
    state: watch::Sender<ChannelState>,
}

impl ProviderChannel {
    pub fn new(agent_id: impl Into<String>) -> (Self, watch::Receiver<ChannelState>) {
        let (state, state_rx) = watch::channel(ChannelState::Idle);
        (
            Self {
                id: ChannelId::new(),
                agent_id: agent_id.into(),
                state,
            },
            state_rx,
        )
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Moves to `next`, refusing transitions the lifecycle does not allow.
    pub fn transition(&self, next: ChannelState) -> Result<(), ChannelError> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(ChannelError::InvalidTransition { from, to: next });
        }
        self.state.send_replace(next);
        Ok(())
    }

    /// Starts a channel task that speaks `text` with `profile`'s voice.
    pub(crate) fn spawn(
        session_id: Uuid,
        agent_id: &str,
        profile: AgentProfile,
        text: String,
        ctx: ChannelContext,
    ) -> ChannelHandle {
        let (channel, state) = Self::new(agent_id);
        let id = channel.id;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let span = info_span!("provider_channel", %session_id, agent_id, channel_id = %id);
        let task = tokio::spawn(channel.run(profile, text, ctx, shutdown_rx).instrument(span));
        ChannelHandle {
            id,
            state,
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn run(
        self,
        profile: AgentProfile,
        text: String,
        ctx: ChannelContext,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut transport: Option<Box<dyn ProviderTransport>> = None;
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => Err(ChannelError::Cancelled),
            result = self.stream(&profile, &text, &ctx, &mut transport) => result,
        };

        match outcome {
            Ok(()) => {
                if self.emit(&ctx, ChannelEventKind::Finished).await.is_err() {
                    debug!("Session went away before the utterance finished.");
                }
                release(&mut transport).await;
                self.settle(ChannelState::Closed);
                info!("Utterance finished; provider connection released.");
            }
            Err(ChannelError::Cancelled) => {
                release(&mut transport).await;
                self.settle(ChannelState::Closed);
                debug!("Channel closed by its session.");
            }
            Err(e) => {
                warn!(error = %e, "Provider channel failed.");
                self.settle(ChannelState::Errored);
                let _ = self.emit(&ctx, ChannelEventKind::Failed(e.code())).await;
                release(&mut transport).await;
                self.settle(ChannelState::Closed);
            }
        }
    }

    /// Opens the provider stream, submits the text and forwards audio until
    /// the final frame. Returns once the channel reached `Finalizing`.
    async fn stream(
        &self,
        profile: &AgentProfile,
        text: &str,
        ctx: &ChannelContext,
        slot: &mut Option<Box<dyn ProviderTransport>>,
    ) -> Result<(), ChannelError> {
        self.transition(ChannelState::Connecting)?;
        let connected = tokio::time::timeout(ctx.timeouts.connect, ctx.connector.connect(profile))
            .await
            .map_err(|_| ProviderError::Timeout(ctx.timeouts.connect))??;
        let transport = slot.insert(connected);

        self.transition(ChannelState::Streaming)?;
        transport.send(OutboundFrame::Prime(profile.settings)).await?;
        transport.send(OutboundFrame::Text(text.to_owned())).await?;
        transport.send(OutboundFrame::EndOfInput).await?;
        debug!(text_len = text.len(), "Text submitted to provider.");

        loop {
            let next = tokio::time::timeout(ctx.timeouts.idle, transport.next_event())
                .await
                .map_err(|_| ProviderError::Timeout(ctx.timeouts.idle))?;
            let event = match next {
                Some(event) => event?,
                None => return Err(ProviderError::UnexpectedClose.into()),
            };
            if let Some(audio) = event.audio {
                self.transition(ChannelState::Streaming)?;
                self.emit(ctx, ChannelEventKind::Audio(audio)).await?;
            }
            if event.is_final {
                self.transition(ChannelState::Finalizing)?;
                return Ok(());
            }
        }
    }

    async fn emit(&self, ctx: &ChannelContext, kind: ChannelEventKind) -> Result<(), ChannelError> {
        ctx.events
            .send(ChannelEvent {
                channel_id: self.id,
                agent_id: self.agent_id.clone(),
                kind,
            })
            .await
            .map_err(|_| ChannelError::Cancelled)
    }

    fn settle(&self, state: ChannelState) {
        if let Err(e) = self.transition(state) {
            debug!(error = %e, "Ignoring redundant channel transition.");
        }
    }
}

async fn release(transport: &mut Option<Box<dyn ProviderTransport>>) {
    if let Some(mut transport) = transport.take() {
        transport.close().await;
    }
}
