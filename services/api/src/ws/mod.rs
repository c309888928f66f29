//! WebSocket Relay
//!
//! This module contains the core logic for relaying client text prompts to
//! the speech provider and streaming the audio back. It is structured into
//! submodules for clarity:
//!
//! - `session`: Manages the client WebSocket lifecycle, from upgrade to teardown.
//! - `manager`: Owns every session and its per-agent provider channels.
//! - `channel`: The lifecycle of one provider stream for one agent.
//! - `provider`: Handles connections to the text-to-speech provider (ElevenLabs).

pub mod channel;
pub mod manager;
pub mod provider;
pub mod session;

pub use manager::SessionManager;
pub use session::ws_handler;
