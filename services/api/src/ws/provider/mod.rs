//! Outbound streaming connections to the text-to-speech provider.
//!
//! A [`ProviderConnector`] opens one [`ProviderTransport`] per channel. The
//! channel drives the transport through provider-neutral frames and reads
//! provider-neutral events back, so the relay logic can be exercised against
//! an in-memory transport in tests.

pub mod elevenlabs;
#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use chorus_core::agent::{AgentProfile, VoiceSettings};

/// A frame the relay sends to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Opens generation: seed text, credentials and voice settings.
    Prime(VoiceSettings),
    /// Text to synthesize.
    Text(String),
    /// No more text will follow; the provider should flush and finish.
    EndOfInput,
}

/// One inbound provider frame, reduced to what the relay forwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderEvent {
    /// Base64 PCM16 audio, if the frame carried any.
    pub audio: Option<String>,
    /// Set on the last frame of the utterance.
    pub is_final: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to connect to provider: {0}")]
    Connect(String),
    #[error("provider transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("provider rejected the session: {0}")]
    Rejected(String),
    #[error("provider sent an unreadable frame: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("provider did not respond within {0:?}")]
    Timeout(std::time::Duration),
    #[error("provider closed the stream before the final frame")]
    UnexpectedClose,
}

/// Opens provider sessions for agents.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(
        &self,
        profile: &AgentProfile,
    ) -> Result<Box<dyn ProviderTransport>, ProviderError>;
}

/// One open provider session.
#[async_trait]
pub trait ProviderTransport: Send {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), ProviderError>;

    /// Awaits the next inbound frame. `None` means the provider closed the stream.
    async fn next_event(&mut self) -> Option<Result<ProviderEvent, ProviderError>>;

    /// Closes the connection. Safe to call more than once.
    async fn close(&mut self);
}
