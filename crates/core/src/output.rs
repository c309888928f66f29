//! Audio outputs the playback scheduler can drive.

use crate::SAMPLE_RATE;

/// A sink that plays sample buffers at absolute positions of its own clock.
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput {
    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Queues `samples` to start playing at `start_at` seconds on the output clock.
    fn play(&mut self, agent_id: &str, samples: Vec<f32>, start_at: f64);
}

/// Where a chunk landed on a [`TimelineOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub agent_id: String,
    pub start_at: f64,
    /// First sample index on the timeline.
    pub offset: usize,
    pub len: usize,
}

/// Renders every scheduled chunk into a single mono timeline.
///
/// Chunks from different agents that overlap in time are summed. The clock
/// is supplied by the caller: wall-clock time for live use, a counter in tests.
pub struct TimelineOutput<C> {
    clock: C,
    mix: Vec<f32>,
    placements: Vec<Placement>,
}

impl<C: Fn() -> f64> TimelineOutput<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            mix: Vec::new(),
            placements: Vec::new(),
        }
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Length of the rendered timeline in seconds.
    pub fn duration(&self) -> f64 {
        self.mix.len() as f64 / SAMPLE_RATE as f64
    }

    /// Mixed timeline, clamped to [-1, 1].
    pub fn render(&self) -> Vec<f32> {
        self.mix.iter().map(|s| s.clamp(-1.0, 1.0)).collect()
    }
}

impl<C: Fn() -> f64> AudioOutput for TimelineOutput<C> {
    fn current_time(&self) -> f64 {
        (self.clock)()
    }

    fn play(&mut self, agent_id: &str, samples: Vec<f32>, start_at: f64) {
        let offset = (start_at.max(0.0) * SAMPLE_RATE as f64).round() as usize;
        let end = offset + samples.len();
        if self.mix.len() < end {
            self.mix.resize(end, 0.0);
        }
        for (slot, sample) in self.mix[offset..end].iter_mut().zip(&samples) {
            *slot += sample;
        }
        self.placements.push(Placement {
            agent_id: agent_id.to_owned(),
            start_at,
            offset,
            len: samples.len(),
        });
    }
}
