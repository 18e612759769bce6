//! Domain event system — decoupled communication between bounded contexts.
//!
//! Events are published when something interesting happens in the system.
//! Other components (external config syncers, dashboards) can subscribe to
//! react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An agent's configuration changed (update or rollback)
    ConfigChanged {
        agent_id: String,
        new_version: String,
        timestamp: DateTime<Utc>,
    },

    /// A reasoning turn completed
    TurnCompleted {
        session_id: String,
        model: String,
        steps: u32,
        tool_calls: u32,
        tokens_used: u32,
        cost_usd: f64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A memory consolidation pass ran
    MemoryConsolidated {
        agent_id: String,
        archived: usize,
        promoted: usize,
        merged: usize,
        timestamp: DateTime<Utc>,
    },

    /// A usage record was appended
    UsageRecorded {
        session_id: String,
        model: String,
        total_tokens: u32,
        cost_usd: f64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ConfigChanged {
            agent_id: "agent-1".into(),
            new_version: "v2".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ConfigChanged { agent_id, new_version, .. } => {
                assert_eq!(agent_id, "agent-1");
                assert_eq!(new_version, "v2");
            }
            _ => panic!("Expected ConfigChanged event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "archival_memory_search".into(),
            success: true,
            duration_ms: 12,
            timestamp: Utc::now(),
        });
    }
}
