//! Topology change events and the multi-subscriber event bus
//!
//! Events carry the names and payload fields the host's event-publish
//! surface expects. The bus fans every event out to all live subscribers;
//! a dropped subscriber is pruned on the next emit.

use std::sync::{mpsc, Mutex};

use serde::Serialize;

use crate::connection::ConnectionId;
use crate::iter::EventIterator;

/// A discrete change observed in the audio topology or service state
///
/// `name()` yields the wire name the host event surface uses; the serde
/// representation carries the payload fields under that tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopologyEvent {
    SourceAdded { source: String },
    SourceRemoved { source: String },
    SinkAdded { sink: String },
    SinkRemoved { sink: String },
    ConnectionEstablished {
        id: ConnectionId,
        source: String,
        sink: String,
    },
    ServiceStarted,
    ServiceStopped,
    ServicePropertyChanged { name: String, value: String },
}

impl TopologyEvent {
    /// Wire name of this event as published to the host
    pub fn name(&self) -> &'static str {
        match self {
            TopologyEvent::SourceAdded { .. } => "source_added",
            TopologyEvent::SourceRemoved { .. } => "source_removed",
            TopologyEvent::SinkAdded { .. } => "sink_added",
            TopologyEvent::SinkRemoved { .. } => "sink_removed",
            TopologyEvent::ConnectionEstablished { .. } => "connection_established",
            TopologyEvent::ServiceStarted => "service_started",
            TopologyEvent::ServiceStopped => "service_stopped",
            TopologyEvent::ServicePropertyChanged { .. } => "service_property_changed",
        }
    }
}

/// Fan-out bus delivering every event to every subscriber
///
/// Each `subscribe()` call gets its own unbounded channel, so a slow
/// consumer never blocks the emitter (events are emitted while the
/// engine's exclusivity guard is held).
///
/// # Example
///
/// ```rust
/// use topology_store::{EventBus, TopologyEvent};
///
/// let bus = EventBus::new();
/// let events = bus.subscribe();
///
/// bus.emit(TopologyEvent::ServiceStarted);
/// assert_eq!(events.try_recv().unwrap().name(), "service_started");
/// ```
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<TopologyEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its blocking iterator
    pub fn subscribe(&self) -> EventIterator {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        EventIterator::new(rx)
    }

    /// Deliver an event to all live subscribers, pruning dropped ones
    pub fn emit(&self, event: TopologyEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = TopologyEvent::SourceAdded {
            source: "mic".to_string(),
        };
        assert_eq!(event.name(), "source_added");

        let event = TopologyEvent::ServicePropertyChanged {
            name: "refresh".to_string(),
            value: "5.0".to_string(),
        };
        assert_eq!(event.name(), "service_property_changed");
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.emit(TopologyEvent::ServiceStarted);

        assert!(first.try_recv().is_some());
        assert!(second.try_recv().is_some());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        bus.emit(TopologyEvent::ServiceStopped);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_some());
    }

    #[test]
    fn test_emit_with_no_subscribers() {
        let bus = EventBus::new();
        // Must not panic or block
        bus.emit(TopologyEvent::ServiceStarted);
    }

    #[test]
    fn test_payload_serialization() {
        let event = TopologyEvent::ConnectionEstablished {
            id: ConnectionId::from_module_index(4),
            source: "mic".to_string(),
            sink: "hdmi".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connection_established");
        assert_eq!(json["id"], "loopback-4");
        assert_eq!(json["source"], "mic");
        assert_eq!(json["sink"], "hdmi");
    }
}
