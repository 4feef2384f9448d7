//! Per-widget facade over the event bus and the filter store
//!
//! Every widget owns one [`Messenger`]. Mutations go to the [`FilterStore`];
//! once the store acknowledges, the messenger stamps its id on the event and
//! broadcasts it on `filtersChanged` or `selectionChanged` before completing.
//! Each mutation exists twice: as an `async fn`, and as a `*_then` variant that
//! runs on the tokio runtime and reports through a success/error callback pair.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::events::events::{ActiveConnectionChanged, ActiveDatasetChanged};
use crate::events::{topics, typed_handler, Event, EventBus, EventHandler, Subscription};
use crate::query::Filter;
use crate::registry::{FilterEvent, FilterKey, FilterStore, Partition};

/// Identity of a messenger, carried as `_source` on the events it causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessengerId(Uuid);

impl MessengerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessengerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bus topic on which changes to `partition` are broadcast
pub fn topic_for(partition: Partition) -> &'static str {
    match partition {
        Partition::Filters => topics::FILTERS_CHANGED,
        Partition::Selection => topics::SELECTION_CHANGED,
    }
}

/// Declarative handler map subscribed by [`Messenger::events`]
#[derive(Default)]
pub struct MessengerEvents {
    handlers: Vec<(String, Arc<dyn EventHandler>)>,
}

impl MessengerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_active_connection_changed<F>(self, f: F) -> Self
    where
        F: Fn(&ActiveConnectionChanged) + Send + Sync + 'static,
    {
        self.on(topics::ACTIVE_CONNECTION_CHANGED, f)
    }

    pub fn on_active_dataset_changed<F>(self, f: F) -> Self
    where
        F: Fn(&ActiveDatasetChanged) + Send + Sync + 'static,
    {
        self.on(topics::ACTIVE_DATASET_CHANGED, f)
    }

    pub fn on_filters_changed<F>(self, f: F) -> Self
    where
        F: Fn(&FilterEvent) + Send + Sync + 'static,
    {
        self.on(topics::FILTERS_CHANGED, f)
    }

    pub fn on_selection_changed<F>(self, f: F) -> Self
    where
        F: Fn(&FilterEvent) + Send + Sync + 'static,
    {
        self.on(topics::SELECTION_CHANGED, f)
    }

    /// Handler for any topic whose payload is an `E`
    pub fn on<E, F>(mut self, topic: &str, f: F) -> Self
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.handlers.push((topic.to_string(), typed_handler(f)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The cloneable part of a messenger that outlives a spawned request
#[derive(Clone)]
struct Channel {
    id: MessengerId,
    bus: Arc<EventBus>,
    store: Arc<dyn FilterStore>,
}

impl Channel {
    fn acknowledge(&self, mut event: FilterEvent) -> FilterEvent {
        event.source = Some(self.id);
        if event.changed_state() {
            self.bus.publish(topic_for(event.partition), &event);
        } else {
            debug!("Not broadcasting {:?} of '{}', nothing changed", event.event_type, event.key);
        }
        event
    }

    async fn add(&self, partition: Partition, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        let event = self.store.add(partition, key, filter).await?;
        Ok(self.acknowledge(event))
    }

    async fn replace(&self, partition: Partition, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        let event = self.store.replace(partition, key, filter).await?;
        Ok(self.acknowledge(event))
    }

    async fn remove(&self, partition: Partition, key: FilterKey) -> Result<FilterEvent, RegistryError> {
        let event = self.store.remove(partition, &key).await?;
        Ok(self.acknowledge(event))
    }

    async fn clear(&self, partition: Partition) -> Result<Vec<FilterEvent>, RegistryError> {
        let events = self.store.clear(partition).await?;
        Ok(events.into_iter().map(|event| self.acknowledge(event)).collect())
    }
}

/// Widget-facing access to the bus and the filter store
pub struct Messenger {
    channel: Channel,
    runtime: Handle,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Messenger {
    pub fn new(bus: Arc<EventBus>, store: Arc<dyn FilterStore>, runtime: Handle) -> Self {
        Self {
            channel: Channel {
                id: MessengerId::new(),
                bus,
                store,
            },
            runtime,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> MessengerId {
        self.channel.id
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.channel.bus
    }

    pub fn store(&self) -> &Arc<dyn FilterStore> {
        &self.channel.store
    }

    /// Subscribe every handler of `events`; they stay registered until the messenger drops
    pub fn events(&self, events: MessengerEvents) {
        for (topic, handler) in events.handlers {
            self.subscribe(&topic, handler);
        }
    }

    pub fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        let subscription = self.channel.bus.subscribe(topic, handler);
        self.subscriptions.lock().push(subscription);
    }

    pub fn publish<E: Event>(&self, topic: &str, event: &E) {
        self.channel.bus.publish(topic, event);
    }

    /// Drop every subscription made through this messenger
    pub fn unsubscribe_all(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions {
            self.channel.bus.unsubscribe(subscription);
        }
    }

    pub async fn add_filter(&self, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        self.channel.add(Partition::Filters, key, filter).await
    }

    pub async fn replace_filter(&self, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        self.channel.replace(Partition::Filters, key, filter).await
    }

    pub async fn remove_filter(&self, key: FilterKey) -> Result<FilterEvent, RegistryError> {
        self.channel.remove(Partition::Filters, key).await
    }

    pub async fn clear_filters(&self) -> Result<Vec<FilterEvent>, RegistryError> {
        self.channel.clear(Partition::Filters).await
    }

    pub async fn add_selection(&self, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        self.channel.add(Partition::Selection, key, filter).await
    }

    pub async fn replace_selection(&self, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        self.channel.replace(Partition::Selection, key, filter).await
    }

    pub async fn remove_selection(&self, key: FilterKey) -> Result<FilterEvent, RegistryError> {
        self.channel.remove(Partition::Selection, key).await
    }

    pub async fn clear_selection(&self) -> Result<Vec<FilterEvent>, RegistryError> {
        self.channel.clear(Partition::Selection).await
    }

    pub fn add_filter_then<S, E>(&self, key: FilterKey, filter: Filter, on_success: S, on_error: E)
    where
        S: FnOnce(FilterEvent) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.add(Partition::Filters, key, filter).await }, on_success, on_error);
    }

    pub fn replace_filter_then<S, E>(&self, key: FilterKey, filter: Filter, on_success: S, on_error: E)
    where
        S: FnOnce(FilterEvent) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.replace(Partition::Filters, key, filter).await }, on_success, on_error);
    }

    pub fn remove_filter_then<S, E>(&self, key: FilterKey, on_success: S, on_error: E)
    where
        S: FnOnce(FilterEvent) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.remove(Partition::Filters, key).await }, on_success, on_error);
    }

    pub fn clear_filters_then<S, E>(&self, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<FilterEvent>) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.clear(Partition::Filters).await }, on_success, on_error);
    }

    pub fn add_selection_then<S, E>(&self, key: FilterKey, filter: Filter, on_success: S, on_error: E)
    where
        S: FnOnce(FilterEvent) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.add(Partition::Selection, key, filter).await }, on_success, on_error);
    }

    pub fn replace_selection_then<S, E>(&self, key: FilterKey, filter: Filter, on_success: S, on_error: E)
    where
        S: FnOnce(FilterEvent) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.replace(Partition::Selection, key, filter).await }, on_success, on_error);
    }

    pub fn remove_selection_then<S, E>(&self, key: FilterKey, on_success: S, on_error: E)
    where
        S: FnOnce(FilterEvent) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.remove(Partition::Selection, key).await }, on_success, on_error);
    }

    pub fn clear_selection_then<S, E>(&self, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<FilterEvent>) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let channel = self.channel.clone();
        self.spawn_then(async move { channel.clear(Partition::Selection).await }, on_success, on_error);
    }

    fn spawn_then<T, Fut, S, E>(&self, request: Fut, on_success: S, on_error: E)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, RegistryError>> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(RegistryError) + Send + 'static,
    {
        let id = self.channel.id;
        self.runtime.spawn(async move {
            match request.await {
                Ok(value) => on_success(value),
                Err(err) => {
                    warn!("Registry request from messenger {} failed: {}", id, err);
                    on_error(err);
                }
            }
        });
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}
