//! Chorus Core
//!
//! Shared building blocks for the Chorus relay and its clients: the agent
//! registry, the JSON protocol spoken between clients and the relay, the
//! PCM16 codec, and the per-agent playback scheduler.

pub mod agent;
pub mod codec;
pub mod output;
pub mod protocol;
pub mod scheduler;

/// Sample rate of every audio payload carried by the relay, in Hz.
pub const SAMPLE_RATE: u32 = 44_100;
