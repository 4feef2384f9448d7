use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::info;

use crate::events::events::{ActiveConnectionChanged, ActiveDatasetChanged};
use crate::events::{topics, EventBus};
use crate::messenger::{Messenger, MessengerEvents};
use crate::query::DataSource;
use crate::registry::{FilterRegistry, FilterStore};

/// Shared state every widget of one dashboard is wired to
pub struct NeonContext {
    /// The event bus
    pub event_bus: Arc<EventBus>,

    /// Filter and selection state
    pub filters: Arc<dyn FilterStore>,

    /// Last announced connection
    active_connection: Arc<RwLock<Option<ActiveConnectionChanged>>>,

    /// Last announced dataset
    active_dataset: Arc<RwLock<Option<ActiveDatasetChanged>>>,

    /// Runtime the `*_then` callback variants are spawned on
    runtime: Handle,
}

impl NeonContext {
    /// Create a context with an in-process filter registry
    pub fn new(runtime: Handle) -> Self {
        Self::with_filter_store(Arc::new(FilterRegistry::new()), runtime)
    }

    pub fn with_filter_store(filters: Arc<dyn FilterStore>, runtime: Handle) -> Self {
        Self {
            event_bus: Arc::new(EventBus::new()),
            filters,
            active_connection: Arc::new(RwLock::new(None)),
            active_dataset: Arc::new(RwLock::new(None)),
            runtime,
        }
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// A fresh messenger for one widget
    pub fn messenger(&self) -> Messenger {
        Messenger::new(self.event_bus.clone(), self.filters.clone(), self.runtime.clone())
    }

    /// A messenger with `events` already subscribed
    pub fn messenger_with(&self, events: MessengerEvents) -> Messenger {
        let messenger = self.messenger();
        messenger.events(events);
        messenger
    }

    pub fn active_connection(&self) -> Option<ActiveConnectionChanged> {
        self.active_connection.read().clone()
    }

    pub fn active_dataset(&self) -> Option<ActiveDatasetChanged> {
        self.active_dataset.read().clone()
    }

    /// Record and announce a new active connection; the active dataset is forgotten
    pub fn set_active_connection(&self, datastore: impl Into<String>, hostname: impl Into<String>) {
        let event = ActiveConnectionChanged {
            datastore: datastore.into(),
            hostname: hostname.into(),
        };
        info!("Active connection is now {}@{}", event.datastore, event.hostname);
        *self.active_connection.write() = Some(event.clone());
        *self.active_dataset.write() = None;
        self.event_bus.publish(topics::ACTIVE_CONNECTION_CHANGED, &event);
    }

    /// Record and announce a new active dataset on the active connection
    pub fn set_active_dataset(&self, data_source: &DataSource) {
        let (datastore, hostname) = match self.active_connection() {
            Some(connection) => (connection.datastore, connection.hostname),
            None => (String::new(), String::new()),
        };
        let event = ActiveDatasetChanged {
            database: data_source.database.clone(),
            table: data_source.table.clone(),
            datastore,
            hostname,
        };
        info!("Active dataset is now {}", data_source);
        *self.active_dataset.write() = Some(event.clone());
        self.event_bus.publish(topics::ACTIVE_DATASET_CHANGED, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_dataset_change_is_published_with_connection() {
        let context = NeonContext::new(Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _messenger = context.messenger_with(
            MessengerEvents::new().on_active_dataset_changed(move |event| sink.lock().push(event.clone())),
        );

        context.set_active_connection("memory", "localhost");
        context.set_active_dataset(&DataSource::new("acceptanceTest", "records"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].datastore, "memory");
        assert_eq!(seen[0].data_source(), DataSource::new("acceptanceTest", "records"));
        assert_eq!(context.active_dataset().as_ref(), seen.first());
    }

    #[tokio::test]
    async fn test_connection_change_forgets_dataset() {
        let context = NeonContext::new(Handle::current());
        context.set_active_connection("memory", "localhost");
        context.set_active_dataset(&DataSource::new("db", "t"));
        context.set_active_connection("memory", "elsewhere");
        assert!(context.active_dataset().is_none());
        assert_eq!(context.active_connection().map(|c| c.hostname), Some("elsewhere".to_string()));
    }
}
