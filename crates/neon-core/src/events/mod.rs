use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;
use tracing::trace;

/// In-process publish/subscribe bus keyed by topic name
///
/// Delivery is synchronous: `publish` invokes every handler subscribed to the
/// topic when the call starts, in subscription order, on the calling thread.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<String, Vec<(u64, Arc<dyn EventHandler>)>>>>,
    next_id: AtomicU64,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &dyn Event);
}

/// Registration returned by [`EventBus::subscribe`]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    topic: String,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Topic names shared by widgets
pub mod topics {
    pub const ACTIVE_CONNECTION_CHANGED: &str = "activeConnectionChanged";
    pub const ACTIVE_DATASET_CHANGED: &str = "activeDatasetChanged";
    pub const FILTERS_CHANGED: &str = "filtersChanged";
    pub const SELECTION_CHANGED: &str = "selectionChanged";
}

/// Common system events
pub mod events {
    use serde::{Deserialize, Serialize};

    use super::Event;
    use crate::query::DataSource;

    /// A different backend connection became active
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ActiveConnectionChanged {
        pub datastore: String,
        pub hostname: String,
    }

    /// A different database/table became active
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ActiveDatasetChanged {
        pub database: String,
        pub table: String,
        pub datastore: String,
        pub hostname: String,
    }

    impl ActiveDatasetChanged {
        pub fn data_source(&self) -> DataSource {
            DataSource::new(self.database.clone(), self.table.clone())
        }
    }

    /// Free-form payload for application-defined topics
    #[derive(Debug, Clone, PartialEq)]
    pub struct Message(pub serde_json::Value);

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        ActiveConnectionChanged,
        ActiveDatasetChanged,
        Message
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler to a topic
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock();
        handlers.entry(topic.to_string()).or_insert_with(Vec::new).push((id, handler));
        Subscription {
            topic: topic.to_string(),
            id,
        }
    }

    /// Remove exactly the registration behind `subscription`
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut handlers = self.handlers.lock();
        if let Some(topic_handlers) = handlers.get_mut(&subscription.topic) {
            topic_handlers.retain(|(id, _)| *id != subscription.id);
            if topic_handlers.is_empty() {
                handlers.remove(&subscription.topic);
            }
        }
    }

    /// Publish an event to every handler of `topic`
    pub fn publish<E: Event>(&self, topic: &str, event: &E) {
        // Snapshot so handlers can publish or (un)subscribe re-entrantly
        let snapshot: Vec<Arc<dyn EventHandler>> = match self.handlers.lock().get(topic) {
            Some(topic_handlers) => topic_handlers.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };

        trace!("Publishing on '{}' to {} handlers", topic, snapshot.len());
        for handler in snapshot {
            handler.handle(event);
        }
    }

    /// Number of handlers currently subscribed to `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.handlers.lock().get(topic).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: Fn(&dyn Event) + Send + Sync,
{
    fn handle(&self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&dyn Event) + Send + Sync + 'static,
{
    Arc::new(ClosureEventHandler { handler: f })
}

/// Create a handler that only sees events of type `E`
pub fn typed_handler<E, F>(f: F) -> Arc<dyn EventHandler>
where
    E: Event,
    F: Fn(&E) + Send + Sync + 'static,
{
    handler_from_fn(move |event: &dyn Event| match event.as_any().downcast_ref::<E>() {
        Some(typed) => f(typed),
        None => tracing::warn!(
            "Dropping event that is not a {}",
            std::any::type_name::<E>()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::events::Message;
    use super::*;
    use serde_json::json;

    fn recorder(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn EventHandler> {
        typed_handler(move |msg: &Message| log.lock().push(format!("{}:{}", label, msg.0)))
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("topic", recorder(log.clone(), "first"));
        bus.subscribe("topic", recorder(log.clone(), "second"));
        bus.subscribe("other", recorder(log.clone(), "other"));

        bus.publish("topic", &Message(json!(1)));
        assert_eq!(*log.lock(), vec!["first:1", "second:1"]);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one_registration() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recorder(log.clone(), "h");
        let first = bus.subscribe("topic", handler.clone());
        let _second = bus.subscribe("topic", handler);

        bus.unsubscribe(first);
        assert_eq!(bus.subscriber_count("topic"), 1);
        bus.publish("topic", &Message(json!("x")));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_handlers_may_subscribe_while_publishing() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_bus = bus.clone();
        let inner_log = log.clone();
        bus.subscribe(
            "topic",
            handler_from_fn(move |_| {
                inner_bus.subscribe("topic", recorder(inner_log.clone(), "late"));
            }),
        );

        // the late subscriber was not present when the first publish started
        bus.publish("topic", &Message(json!(1)));
        assert!(log.lock().is_empty());
        bus.publish("topic", &Message(json!(2)));
        assert_eq!(*log.lock(), vec!["late:2"]);
    }

    #[test]
    fn test_typed_handler_ignores_other_payloads() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("topic", recorder(log.clone(), "typed"));
        bus.publish(
            "topic",
            &events::ActiveConnectionChanged {
                datastore: "memory".into(),
                hostname: "localhost".into(),
            },
        );
        assert!(log.lock().is_empty());
    }
}
