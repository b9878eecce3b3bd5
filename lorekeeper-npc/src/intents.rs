//! Intent sinks: where validated world intents go.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::output::WorldIntent;

/// An intent tagged with the NPC that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentEvent {
    /// NPC whose validated response carried the intent.
    pub npc_id: String,
    /// The intent itself.
    pub intent: WorldIntent,
}

/// Receives intents from validated responses only.
pub trait IntentSink: Send + Sync {
    /// Deliver the intents of one successful attempt.
    fn emit(&self, npc_id: &str, intents: &[WorldIntent]);
}

/// Keeps every intent in memory. Useful for tests and batch dispatch.
#[derive(Debug, Default)]
pub struct CollectingIntentSink {
    events: Mutex<Vec<IntentEvent>>,
}

impl CollectingIntentSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Received events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<IntentEvent> {
        self.events.lock().clone()
    }

    /// Remove and return every received event.
    pub fn drain(&self) -> Vec<IntentEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl IntentSink for CollectingIntentSink {
    fn emit(&self, npc_id: &str, intents: &[WorldIntent]) {
        self.events.lock().extend(intents.iter().map(|intent| IntentEvent {
            npc_id: npc_id.to_string(),
            intent: intent.clone(),
        }));
    }
}

/// Forwards intents to an async dispatcher over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelIntentSink {
    tx: mpsc::UnboundedSender<IntentEvent>,
}

impl ChannelIntentSink {
    /// Sink plus the receiver a dispatcher task should drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<IntentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl IntentSink for ChannelIntentSink {
    fn emit(&self, npc_id: &str, intents: &[WorldIntent]) {
        for intent in intents {
            let event = IntentEvent {
                npc_id: npc_id.to_string(),
                intent: intent.clone(),
            };
            if self.tx.send(event).is_err() {
                warn!(npc_id, "intent receiver dropped; discarding intents");
                return;
            }
        }
    }
}
