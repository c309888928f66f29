//! Per-agent gapless playback scheduling.
//!
//! Every agent owns a queue of pending chunks and a *horizon*: the output
//! clock time at which its stream is next free. A chunk starts at
//! `max(now, horizon)` and pushes the horizon forward by its own duration, so
//! the chunks of one agent play back to back however late they arrive.
//! Agents never share a horizon and never wait on each other.

use crate::{codec, output::AudioOutput};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// One undecoded audio payload as received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    audio: String,
    expected_samples: usize,
}

impl AudioChunk {
    /// Wraps a base64 payload, expecting as many samples as its length implies.
    pub fn new(audio: impl Into<String>) -> Self {
        let audio = audio.into();
        let expected_samples = codec::estimated_samples(&audio);
        Self {
            audio,
            expected_samples,
        }
    }

    pub fn with_expected_samples(audio: impl Into<String>, expected_samples: usize) -> Self {
        Self {
            audio: audio.into(),
            expected_samples,
        }
    }

    pub fn audio(&self) -> &str {
        &self.audio
    }
}

/// A chunk that was handed to the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No utterance in progress; the next chunk starts a new one.
    Idle,
    Speaking,
}

#[derive(Debug)]
struct AgentPlayback {
    queue: VecDeque<AudioChunk>,
    horizon: f64,
    phase: Phase,
    /// Clock reading when this agent last scheduled audio.
    last_clock: f64,
}

impl Default for AgentPlayback {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            horizon: 0.0,
            phase: Phase::Idle,
            last_clock: 0.0,
        }
    }
}

/// Turns per-agent chunk arrivals into non-overlapping playback on an [`AudioOutput`].
pub struct PlaybackScheduler<O> {
    output: O,
    agents: HashMap<String, AgentPlayback>,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            agents: HashMap::new(),
        }
    }

    /// Appends a chunk to the agent's queue and schedules everything pending.
    pub fn enqueue(&mut self, agent_id: &str, chunk: AudioChunk) -> Vec<ScheduledChunk> {
        self.agents
            .entry(agent_id.to_owned())
            .or_default()
            .queue
            .push_back(chunk);
        self.drain(agent_id)
    }

    /// Schedules every queued chunk of `agent_id` in arrival order.
    ///
    /// Chunks that fail to decode are dropped; the rest of the queue is still
    /// scheduled.
    pub fn drain(&mut self, agent_id: &str) -> Vec<ScheduledChunk> {
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return Vec::new();
        };
        let mut scheduled = Vec::with_capacity(agent.queue.len());

        while let Some(chunk) = agent.queue.pop_front() {
            let samples = match codec::decode_pcm16(&chunk.audio, chunk.expected_samples) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(agent_id, error = %e, "Dropping undecodable audio chunk");
                    continue;
                }
            };
            if samples.is_empty() {
                continue;
            }

            let now = self.output.current_time();
            if agent.phase == Phase::Idle {
                // A restarted clock makes the old horizon meaningless. Each
                // agent compares against its own reading: another agent may
                // already have observed the restart.
                agent.horizon = if now < agent.last_clock {
                    now
                } else {
                    agent.horizon.max(now)
                };
                agent.phase = Phase::Speaking;
            }
            agent.last_clock = now;

            let start_at = now.max(agent.horizon);
            let duration = codec::chunk_duration(samples.len());
            self.output.play(agent_id, samples, start_at);
            agent.horizon = start_at + duration;
            debug!(agent_id, start_at, duration, "Scheduled audio chunk");
            scheduled.push(ScheduledChunk { start_at, duration });
        }

        scheduled
    }

    /// Records that the relay finished the agent's current utterance.
    ///
    /// Chunks are drained as they arrive, so the queue is already empty here
    /// and the agent goes idle: its next chunk starts a new utterance with a
    /// re-based horizon.
    pub fn finish(&mut self, agent_id: &str) {
        self.drain(agent_id);
        self.agents.entry(agent_id.to_owned()).or_default().phase = Phase::Idle;
    }

    /// Drops everything still queued for `agent_id`, e.g. after a relay error.
    pub fn discard(&mut self, agent_id: &str) -> usize {
        match self.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.phase = Phase::Idle;
                std::mem::take(&mut agent.queue).len()
            }
            None => 0,
        }
    }

    /// Clock time at which the agent's stream is next free.
    pub fn horizon(&self, agent_id: &str) -> Option<f64> {
        self.agents.get(agent_id).map(|a| a.horizon)
    }

    pub fn pending(&self, agent_id: &str) -> usize {
        self.agents.get(agent_id).map_or(0, |a| a.queue.len())
    }

    /// True when the agent has no utterance in progress.
    pub fn is_idle(&self, agent_id: &str) -> bool {
        self.agents
            .get(agent_id)
            .is_none_or(|a| a.phase == Phase::Idle)
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }
}
