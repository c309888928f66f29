//! Defines the WebSocket message protocol between clients and the relay.
//!
//! The wire format carries no type tag: each relay message is recognized by
//! its exact set of fields. Every shape rejects unknown fields, so a payload
//! that does not match one of the known messages fails to parse instead of
//! being coerced into the closest match.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A text prompt sent by the client for one agent to speak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientRequest {
    pub agent_id: String,
    pub text: String,
}

impl ClientRequest {
    pub fn new(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            text: text.into(),
        }
    }
}

/// Error codes reported to the client. The connection stays open after any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayErrorCode {
    /// The requested agent is not in the registry.
    InvalidAgent,
    /// The provider connection failed or dropped mid-stream.
    ProviderError,
    /// The relay hit an unexpected internal condition.
    InternalError,
    /// The client frame was not a valid request.
    MalformedMessage,
    /// The agent is still speaking a previous utterance.
    AgentBusy,
}

impl RelayErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAgent => "INVALID_AGENT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::MalformedMessage => "MALFORMED_MESSAGE",
            Self::AgentBusy => "AGENT_BUSY",
        }
    }
}

impl fmt::Display for RelayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtteranceStatus {
    Finished,
}

/// `{ agentId, audio }`: one base64 PCM16 chunk of an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AudioMessage {
    pub agent_id: String,
    pub audio: String,
}

/// `{ agentId, status: "finished" }`: sent once, after the last audio chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusMessage {
    pub agent_id: String,
    pub status: UtteranceStatus,
}

/// `{ agentId?, error }`: `agentId` is absent only when the request could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ErrorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub error: RelayErrorCode,
}

/// Messages sent from the relay to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayMessage {
    Audio(AudioMessage),
    Status(StatusMessage),
    Error(ErrorMessage),
}

impl RelayMessage {
    pub fn audio(agent_id: impl Into<String>, audio: impl Into<String>) -> Self {
        Self::Audio(AudioMessage {
            agent_id: agent_id.into(),
            audio: audio.into(),
        })
    }

    pub fn finished(agent_id: impl Into<String>) -> Self {
        Self::Status(StatusMessage {
            agent_id: agent_id.into(),
            status: UtteranceStatus::Finished,
        })
    }

    pub fn error(agent_id: Option<&str>, error: RelayErrorCode) -> Self {
        Self::Error(ErrorMessage {
            agent_id: agent_id.map(str::to_owned),
            error,
        })
    }

    /// Parses a relay frame, rejecting anything that is not one of the known shapes.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Audio(m) => Some(&m.agent_id),
            Self::Status(m) => Some(&m.agent_id),
            Self::Error(m) => m.agent_id.as_deref(),
        }
    }
}
