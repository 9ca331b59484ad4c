//! Event sinks for advisory progress notifications.
//!
//! Events never influence results: a sink that drops or fails to deliver an
//! event must not affect the operation that emitted it.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Event type for research progress messages.
pub const RESEARCH_PROGRESS: &str = "research.progress";

/// Builds the payload of a [`RESEARCH_PROGRESS`] event.
#[must_use]
pub fn progress_payload(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "message": message.into() })
}

/// Receives events emitted by the research service.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Emits an event without waiting. Failures are swallowed.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// An event as forwarded by [`ChannelEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedEvent {
    /// Event type.
    pub event_type: String,
    /// Event payload.
    pub data: Option<serde_json::Value>,
}

/// Forwards events into an unbounded channel, e.g. to a protocol writer.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ForwardedEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ForwardedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        let event = ForwardedEvent {
            event_type: event_type.to_string(),
            data,
        };
        if self.tx.send(event).is_err() {
            debug!(event_type = %event_type, "Event receiver closed; dropping event");
        }
    }
}

/// Records events in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// The `message` fields of recorded progress events.
    #[must_use]
    pub fn progress_messages(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == RESEARCH_PROGRESS)
            .filter_map(|(_, data)| data.as_ref()?.get("message")?.as_str().map(String::from))
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}
