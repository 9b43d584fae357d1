//! Event subsystem — named events owned by a node, with pub/sub fan-out.
//!
//! An event must be registered by its owner before anyone can subscribe or
//! publish. Subscribers receive [`EventMessage`]s on an unbounded channel.

use crate::types::{Error, NodeName, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Cluster-wide event address: name plus owning node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef {
    pub name: String,
    pub node: NodeName,
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.node)
    }
}

/// A published event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: EventRef,
    pub timestamp: DateTime<Utc>,
    pub message: Value,
}

/// Event statistics, as reported by `event_list` / `event_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    pub node: String,
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
struct EventEntry {
    subscribers: Vec<(String, mpsc::UnboundedSender<EventMessage>)>,
    published: u64,
    delivered: u64,
    registered_at: DateTime<Utc>,
}

/// Per-node event registry.
#[derive(Debug, Clone)]
pub struct EventBus {
    node: NodeName,
    events: Arc<RwLock<HashMap<String, EventEntry>>>,
}

impl EventBus {
    pub fn new(node: NodeName) -> Self {
        Self {
            node,
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new event owned by this node.
    pub async fn register(&self, name: &str) -> Result<EventRef> {
        if name.is_empty() {
            return Err(Error::validation("event name cannot be empty"));
        }

        let mut events = self.events.write().await;
        if events.contains_key(name) {
            return Err(Error::validation(format!(
                "Event already registered: {}",
                name
            )));
        }
        events.insert(
            name.to_string(),
            EventEntry {
                subscribers: Vec::new(),
                published: 0,
                delivered: 0,
                registered_at: Utc::now(),
            },
        );

        tracing::debug!(event = %name, node = %self.node, "event registered");

        Ok(EventRef {
            name: name.to_string(),
            node: self.node.clone(),
        })
    }

    /// Remove an event; its subscribers' channels close.
    pub async fn unregister(&self, name: &str) -> bool {
        self.events.write().await.remove(name).is_some()
    }

    /// Publish a message to all subscribers of a registered event.
    pub async fn publish(&self, name: &str, message: Value) -> Result<usize> {
        let mut events = self.events.write().await;
        let entry = events
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Unknown event: {}", name)))?;

        let msg = EventMessage {
            event: EventRef {
                name: name.to_string(),
                node: self.node.clone(),
            },
            timestamp: Utc::now(),
            message,
        };

        let mut delivered = 0;
        for (_, tx) in &entry.subscribers {
            if tx.send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        entry.published += 1;
        entry.delivered += delivered as u64;

        tracing::debug!(event = %name, delivered, "event published");

        Ok(delivered)
    }

    /// Subscribe to an event owned by this node.
    pub async fn subscribe(
        &self,
        subscriber: &str,
        event: &EventRef,
    ) -> Result<mpsc::UnboundedReceiver<EventMessage>> {
        if event.node != self.node {
            return Err(Error::not_found(format!(
                "event {} is owned by another node; listen on {} instead",
                event, event.node
            )));
        }

        let mut events = self.events.write().await;
        let entry = events
            .get_mut(&event.name)
            .ok_or_else(|| Error::not_found(format!("Unknown event: {}", event)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        entry.subscribers.push((subscriber.to_string(), tx));

        tracing::debug!(event = %event, subscriber, "event subscription added");

        Ok(rx)
    }

    /// Drop a subscription. Returns false if nothing was removed.
    pub async fn unsubscribe(&self, subscriber: &str, event: &EventRef) -> bool {
        let mut events = self.events.write().await;
        match events.get_mut(&event.name) {
            Some(entry) => {
                let before = entry.subscribers.len();
                entry.subscribers.retain(|(id, _)| id != subscriber);
                before != entry.subscribers.len()
            }
            None => false,
        }
    }

    /// All registered events, sorted by name.
    pub async fn list(&self) -> Vec<EventInfo> {
        let events = self.events.read().await;
        let mut infos: Vec<EventInfo> = events
            .iter()
            .map(|(name, entry)| self.info_of(name, entry))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn info(&self, name: &str) -> Option<EventInfo> {
        let events = self.events.read().await;
        events.get(name).map(|entry| self.info_of(name, entry))
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub fn node(&self) -> &NodeName {
        &self.node
    }

    fn info_of(&self, name: &str, entry: &EventEntry) -> EventInfo {
        EventInfo {
            name: name.to_string(),
            node: self.node.to_string(),
            subscribers: entry.subscribers.len(),
            published: entry.published,
            delivered: entry.delivered,
            registered_at: entry.registered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bus() -> EventBus {
        EventBus::new(NodeName::from_string("alpha@localhost".to_string()).unwrap())
    }

    #[tokio::test]
    async fn test_publish_to_zero_subscribers() {
        let bus = bus();
        bus.register("orders").await.unwrap();

        let delivered = bus.publish("orders", json!({"id": 1})).await.unwrap();
        assert_eq!(delivered, 0);

        let info = bus.info("orders").await.unwrap();
        assert_eq!(info.published, 1);
        assert_eq!(info.subscribers, 0);
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = bus();
        let event = bus.register("orders").await.unwrap();
        let mut rx = bus.subscribe("sub1", &event).await.unwrap();

        let delivered = bus.publish("orders", json!({"id": 7})).await.unwrap();
        assert_eq!(delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.to_string(), "orders@alpha@localhost");
        assert_eq!(received.message["id"], 7);

        assert!(bus.unsubscribe("sub1", &event).await);
        assert!(!bus.unsubscribe("sub1", &event).await);
    }

    #[tokio::test]
    async fn test_unknown_event_errors() {
        let bus = bus();
        assert!(bus.publish("missing", json!(null)).await.is_err());

        let event = EventRef {
            name: "missing".to_string(),
            node: bus.node().clone(),
        };
        let err = bus.subscribe("sub1", &event).await.unwrap_err();
        assert!(err.to_string().contains("Unknown event"));
    }

    #[tokio::test]
    async fn test_foreign_event_rejected() {
        let bus = bus();
        let event = EventRef {
            name: "orders".to_string(),
            node: NodeName::from_string("beta@localhost".to_string()).unwrap(),
        };
        let err = bus.subscribe("sub1", &event).await.unwrap_err();
        assert!(err.to_string().contains("another node"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let bus = bus();
        bus.register("orders").await.unwrap();
        assert!(bus.register("orders").await.is_err());
        assert_eq!(bus.len().await, 1);
    }
}
