//! Failure notifications for observers outside the calling code path.

use serde::Serialize;
use tokio::sync::broadcast;

/// Event published by [`crate::RequestClient`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A call failed terminally: retries exhausted or error not retryable.
    DataError {
        /// Path as passed by the caller, before base URL resolution.
        endpoint: String,
        error: String,
        method: String,
    },
}

/// Receives client events. Publishing is fire-and-forget.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ClientEvent);
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: ClientEvent) {}
}

/// Fans events out to any number of subscribers over a broadcast channel.
#[derive(Clone, Debug)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ClientEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventSink for BroadcastEventSink {
    /// Sends to current subscribers; events published with none are dropped.
    fn publish(&self, event: ClientEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{BroadcastEventSink, ClientEvent, EventSink};

    fn data_error() -> ClientEvent {
        ClientEvent::DataError {
            endpoint: "/test-suites".to_owned(),
            error: "HTTP 500: Internal Server Error".to_owned(),
            method: "GET".to_owned(),
        }
    }

    #[test]
    fn data_error_serializes_with_type_tag() {
        let value = serde_json::to_value(data_error()).expect("event must serialize");
        assert_eq!(
            value,
            json!({
                "type": "data_error",
                "endpoint": "/test-suites",
                "error": "HTTP 500: Internal Server Error",
                "method": "GET"
            })
        );
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let sink = BroadcastEventSink::new(4);
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        sink.publish(data_error());

        assert_eq!(first.try_recv().expect("first must receive"), data_error());
        assert_eq!(second.try_recv().expect("second must receive"), data_error());
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        BroadcastEventSink::default().publish(data_error());
    }
}
