//! Agent Profiles
//!
//! An agent is a named voice persona. Its profile tells the relay which
//! provider voice and model to open a stream with, and how to tune synthesis.
//! Profiles are loaded once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Synthesis knobs forwarded to the provider in the priming frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
        }
    }
}

/// Static configuration of a single agent voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    /// Provider voice identifier.
    pub voice_id: String,
    /// Provider model identifier.
    pub model_id: String,
    #[serde(default)]
    pub settings: VoiceSettings,
}

impl AgentProfile {
    pub fn new(voice_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            settings: VoiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Fixed lookup table from agent identifier to profile.
///
/// Serializes as a plain JSON object (`{"agent1": {...}}`), which is also the
/// format of the optional agents file read by the relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentProfile>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `profile` under `agent_id`, returning the profile it replaced.
    pub fn insert(
        &mut self,
        agent_id: impl Into<String>,
        profile: AgentProfile,
    ) -> Option<AgentProfile> {
        self.agents.insert(agent_id.into(), profile)
    }

    /// Adds every entry of `other`, overriding profiles with the same id.
    pub fn merge(&mut self, other: AgentRegistry) {
        self.agents.extend(other.agents);
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.agents.get(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Agent identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, AgentProfile)> for AgentRegistry {
    fn from_iter<I: IntoIterator<Item = (K, AgentProfile)>>(iter: I) -> Self {
        Self {
            agents: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
