//! Which utterance each agent speaks next.
//!
//! The relay refuses a second utterance for an agent that is still speaking,
//! so the client keeps at most one request in flight per agent and releases
//! the next one when the relay reports the previous one finished.

use chorus_core::protocol::ClientRequest;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    str::FromStr,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UtteranceError {
    #[error("expected AGENT=TEXT, got '{0}'")]
    MissingSeparator(String),
    #[error("agent id must not be empty")]
    EmptyAgent,
    #[error("text for agent '{0}' must not be empty")]
    EmptyText(String),
}

/// One `--say agent=text` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub agent_id: String,
    pub text: String,
}

impl FromStr for Utterance {
    type Err = UtteranceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (agent_id, text) = s
            .split_once('=')
            .ok_or_else(|| UtteranceError::MissingSeparator(s.to_string()))?;
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(UtteranceError::EmptyAgent);
        }
        if text.trim().is_empty() {
            return Err(UtteranceError::EmptyText(agent_id.to_string()));
        }
        Ok(Self {
            agent_id: agent_id.to_string(),
            text: text.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    pending: BTreeMap<String, VecDeque<String>>,
    in_flight: BTreeSet<String>,
    failed: BTreeSet<String>,
}

impl Conversation {
    pub fn new(utterances: impl IntoIterator<Item = Utterance>) -> Self {
        let mut conversation = Self::default();
        for Utterance { agent_id, text } in utterances {
            conversation.pending.entry(agent_id).or_default().push_back(text);
        }
        conversation
    }

    /// The first request of every agent. Agents speak concurrently.
    pub fn start(&mut self) -> Vec<ClientRequest> {
        let agents: Vec<String> = self.pending.keys().cloned().collect();
        agents
            .into_iter()
            .filter_map(|agent_id| self.release(&agent_id))
            .collect()
    }

    /// Marks the agent's current utterance done and returns its next request, if any.
    pub fn on_finished(&mut self, agent_id: &str) -> Option<ClientRequest> {
        if !self.in_flight.remove(agent_id) {
            return None;
        }
        self.release(agent_id)
    }

    /// Gives up on the agent: the rest of its lines are dropped.
    pub fn on_failed(&mut self, agent_id: &str) -> usize {
        self.in_flight.remove(agent_id);
        self.failed.insert(agent_id.to_string());
        self.pending.remove(agent_id).map_or(0, |lines| lines.len())
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(String::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.in_flight.is_empty() && self.pending.values().all(VecDeque::is_empty)
    }

    fn release(&mut self, agent_id: &str) -> Option<ClientRequest> {
        let text = self.pending.get_mut(agent_id)?.pop_front()?;
        self.in_flight.insert(agent_id.to_string());
        Some(ClientRequest::new(agent_id, text))
    }
}
