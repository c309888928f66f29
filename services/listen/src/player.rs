//! Applies relay messages to the playback timeline and the conversation.

use crate::conversation::Conversation;
use chorus_core::{
    output::AudioOutput,
    protocol::{ClientRequest, RelayErrorCode, RelayMessage},
    scheduler::{AudioChunk, PlaybackScheduler},
};
use tracing::{debug, info, warn};

pub struct Player<O> {
    scheduler: PlaybackScheduler<O>,
    conversation: Conversation,
}

impl<O: AudioOutput> Player<O> {
    pub fn new(output: O, conversation: Conversation) -> Self {
        Self {
            scheduler: PlaybackScheduler::new(output),
            conversation,
        }
    }

    /// Requests to send when the session opens.
    pub fn start(&mut self) -> Vec<ClientRequest> {
        self.conversation.start()
    }

    /// Handles one relay message, returning the follow-up request to send, if any.
    pub fn handle(&mut self, message: RelayMessage) -> Option<ClientRequest> {
        match message {
            RelayMessage::Audio(audio) => {
                for chunk in self
                    .scheduler
                    .enqueue(&audio.agent_id, AudioChunk::new(audio.audio))
                {
                    debug!(agent_id = %audio.agent_id, start_at = chunk.start_at, duration = chunk.duration, "Scheduled chunk.");
                }
                None
            }
            RelayMessage::Status(status) => {
                self.scheduler.finish(&status.agent_id);
                info!(agent_id = %status.agent_id, "Utterance finished.");
                self.conversation.on_finished(&status.agent_id)
            }
            RelayMessage::Error(error) => {
                match error.agent_id.as_deref() {
                    Some(agent_id) => {
                        let dropped_chunks = self.scheduler.discard(agent_id);
                        let dropped_lines = self.conversation.on_failed(agent_id);
                        warn!(agent_id, error = %error.error, dropped_chunks, dropped_lines, "Relay refused or lost the utterance.");
                    }
                    None if error.error == RelayErrorCode::MalformedMessage => {
                        warn!("Relay could not parse a request.");
                    }
                    None => warn!(error = %error.error, "Relay reported an error."),
                }
                None
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.conversation.is_done()
    }

    pub fn failed_agents(&self) -> Vec<String> {
        self.conversation.failed().map(str::to_owned).collect()
    }

    pub fn into_output(self) -> O {
        self.scheduler.into_output()
    }
}
