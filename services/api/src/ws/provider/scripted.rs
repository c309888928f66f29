//! In-memory provider used by the relay tests.
//!
//! Every `connect` hands the test a [`ScriptedCall`] through which it can
//! observe the frames the relay sent and inject provider events.

use super::{OutboundFrame, ProviderConnector, ProviderError, ProviderEvent, ProviderTransport};
use async_trait::async_trait;
use chorus_core::agent::AgentProfile;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};

pub(crate) struct ScriptedConnector {
    calls: mpsc::UnboundedSender<ScriptedCall>,
    refuse: AtomicBool,
    stall: AtomicBool,
}

impl ScriptedConnector {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ScriptedCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls,
                refuse: AtomicBool::new(false),
                stall: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Makes every following `connect` fail.
    pub(crate) fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Makes every following `connect` hang without ever answering.
    pub(crate) fn stall_connections(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderConnector for ScriptedConnector {
    async fn connect(
        &self,
        profile: &AgentProfile,
    ) -> Result<Box<dyn ProviderTransport>, ProviderError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ProviderError::Connect("connection refused".into()));
        }
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);
        let _ = self.calls.send(ScriptedCall {
            voice_id: profile.voice_id.clone(),
            sent,
            inbound,
            closed,
        });
        Ok(Box::new(ScriptedTransport {
            sent: sent_tx,
            inbound: inbound_rx,
            closed: closed_tx,
        }))
    }
}

/// The test's end of one scripted provider session.
pub(crate) struct ScriptedCall {
    pub voice_id: String,
    pub sent: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<Option<Result<ProviderEvent, ProviderError>>>,
    closed: watch::Receiver<bool>,
}

impl ScriptedCall {
    pub(crate) fn audio(&self, audio: &str) {
        self.push(Some(Ok(ProviderEvent {
            audio: Some(audio.to_string()),
            is_final: false,
        })));
    }

    pub(crate) fn finish(&self) {
        self.push(Some(Ok(ProviderEvent {
            audio: None,
            is_final: true,
        })));
    }

    pub(crate) fn fail(&self) {
        self.push(Some(Err(ProviderError::UnexpectedClose)));
    }

    /// Closes the stream from the provider side without a final frame.
    pub(crate) fn hang_up(&self) {
        self.push(None);
    }

    fn push(&self, event: Option<Result<ProviderEvent, ProviderError>>) {
        let _ = self.inbound.send(event);
    }

    /// Waits until the relay has released the connection.
    pub(crate) async fn wait_closed(&mut self) {
        let _ = self.closed.wait_for(|closed| *closed).await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Collects the frames sent so far.
    pub(crate) async fn take_sent(&mut self, count: usize) -> Vec<OutboundFrame> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            match self.sent.recv().await {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }
}

struct ScriptedTransport {
    sent: mpsc::UnboundedSender<OutboundFrame>,
    inbound: mpsc::UnboundedReceiver<Option<Result<ProviderEvent, ProviderError>>>,
    closed: watch::Sender<bool>,
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), ProviderError> {
        let _ = self.sent.send(frame);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<ProviderEvent, ProviderError>> {
        // A dropped call behaves like a provider that never speaks again.
        match self.inbound.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed.send_replace(true);
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.closed.send_replace(true);
    }
}
