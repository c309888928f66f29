//! Handles the streaming WebSocket connection to the ElevenLabs `stream-input` API.

use super::{OutboundFrame, ProviderConnector, ProviderError, ProviderEvent, ProviderTransport};
use async_trait::async_trait;
use chorus_core::agent::AgentProfile;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, warn};

// --- Local ElevenLabs wire types ---
mod elevenlabs_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub(super) struct InputFrame<'a> {
        pub text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub xi_api_key: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub try_trigger_generation: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub voice_settings: Option<VoiceSettings>,
    }

    #[derive(Serialize)]
    pub(super) struct VoiceSettings {
        pub stability: f32,
        pub similarity_boost: f32,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct OutputFrame {
        pub audio: Option<String>,
        pub is_final: Option<bool>,
        pub message: Option<String>,
        pub error: Option<String>,
    }
}

type ProviderStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the `stream-input` endpoint for an agent, requesting raw 44.1 kHz PCM.
pub fn stream_input_url(base_url: &str, profile: &AgentProfile) -> String {
    format!(
        "{}/v1/text-to-speech/{}/stream-input?model_id={}&output_format=pcm_44100",
        base_url.trim_end_matches('/'),
        profile.voice_id,
        profile.model_id
    )
}

/// Serializes a frame in the shape the provider expects.
pub(crate) fn encode_frame(frame: &OutboundFrame, api_key: &str) -> Result<String, serde_json::Error> {
    let input = match frame {
        OutboundFrame::Prime(settings) => elevenlabs_types::InputFrame {
            text: " ",
            xi_api_key: Some(api_key),
            try_trigger_generation: Some(true),
            voice_settings: Some(elevenlabs_types::VoiceSettings {
                stability: settings.stability,
                similarity_boost: settings.similarity_boost,
            }),
        },
        OutboundFrame::Text(text) => elevenlabs_types::InputFrame {
            text,
            xi_api_key: None,
            try_trigger_generation: None,
            voice_settings: None,
        },
        // An empty text frame tells the provider the input is complete.
        OutboundFrame::EndOfInput => elevenlabs_types::InputFrame {
            text: "",
            xi_api_key: None,
            try_trigger_generation: None,
            voice_settings: None,
        },
    };
    serde_json::to_string(&input)
}

/// Parses one inbound text frame.
pub(crate) fn decode_frame(text: &str) -> Result<ProviderEvent, ProviderError> {
    let frame: elevenlabs_types::OutputFrame = serde_json::from_str(text)?;
    if let Some(error) = frame.error {
        let detail = frame.message.unwrap_or_default();
        return Err(ProviderError::Rejected(format!("{error}: {detail}")));
    }
    Ok(ProviderEvent {
        audio: frame.audio.filter(|audio| !audio.is_empty()),
        is_final: frame.is_final.unwrap_or(false),
    })
}

/// Opens ElevenLabs `stream-input` sessions.
pub struct ElevenLabsConnector {
    base_url: String,
    api_key: String,
}

impl ElevenLabsConnector {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ProviderConnector for ElevenLabsConnector {
    async fn connect(
        &self,
        profile: &AgentProfile,
    ) -> Result<Box<dyn ProviderTransport>, ProviderError> {
        let url = stream_input_url(&self.base_url, profile);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;
        info!(voice_id = %profile.voice_id, model_id = %profile.model_id, "Connected to ElevenLabs stream-input.");
        Ok(Box::new(ElevenLabsTransport {
            stream,
            api_key: self.api_key.clone(),
            closed: false,
        }))
    }
}

/// One open `stream-input` session.
pub struct ElevenLabsTransport {
    stream: ProviderStream,
    api_key: String,
    closed: bool,
}

#[async_trait]
impl ProviderTransport for ElevenLabsTransport {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), ProviderError> {
        let payload = encode_frame(&frame, &self.api_key)?;
        self.stream.send(WsMessage::Text(payload.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<ProviderEvent, ProviderError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(decode_frame(&text)),
                Ok(WsMessage::Close(close_frame)) => {
                    debug!(?close_frame, "ElevenLabs closed the stream.");
                    return None;
                }
                Ok(WsMessage::Binary(data)) => {
                    warn!(len = data.len(), "Ignoring unexpected binary frame from ElevenLabs.");
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "ElevenLabs stream was already closed.");
        }
    }
}
