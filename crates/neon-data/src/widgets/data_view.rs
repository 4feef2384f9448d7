use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use neon_core::widget::instance_id;
use neon_core::{
    DataSource, Filter, FilterEvent, FilterKey, Messenger, MessengerEvents, NeonContext, Query,
    RegistryError, WhereClause,
};

use super::PendingWork;
use crate::connection::Connection;
use crate::executor::QueryResult;
use crate::store::Row;
use crate::DataError;

/// Latest rows shown by a [`DataView`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Request that produced this state; 0 before the first response
    pub generation: u64,
    pub data: Vec<Row>,
    pub error: Option<String>,
}

struct Inner {
    this: Weak<Inner>,
    messenger: Messenger,
    connection: Connection,
    filter_key: FilterKey,
    query: Mutex<Option<Query>>,
    generation: AtomicU64,
    state: watch::Sender<ViewState>,
    fields: watch::Sender<Vec<String>>,
    pending: PendingWork,
}

impl Inner {
    /// Start a new request generation; responses of older ones are dropped
    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn refresh(&self) -> Option<u64> {
        let query = self.query.lock().clone()?;
        let generation = self.begin();
        let on_success = self.this.clone();
        let on_error = self.this.clone();
        self.connection.execute_query_then(
            query,
            move |result| {
                if let Some(inner) = on_success.upgrade() {
                    inner.deliver(generation, Ok(result));
                }
            },
            move |err| {
                if let Some(inner) = on_error.upgrade() {
                    inner.deliver(generation, Err(err));
                }
            },
        );
        Some(generation)
    }

    fn deliver(&self, generation: u64, outcome: Result<QueryResult, DataError>) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        if generation != current {
            debug!("Discarding response {} of view {}, {} is current", generation, self.filter_key, current);
            return false;
        }
        let state = match outcome {
            Ok(result) => ViewState {
                generation,
                data: result.data,
                error: None,
            },
            Err(err) => ViewState {
                generation,
                data: Vec::new(),
                error: Some(err.to_string()),
            },
        };
        self.state.send_replace(state);
        true
    }

    fn reset(&self, query: Option<Query>) {
        *self.query.lock() = query;
        let generation = self.begin();
        self.state.send_replace(ViewState {
            generation,
            ..ViewState::default()
        });
        info!("View {} reset", self.filter_key);
    }

    /// Start over on `data_source`
    ///
    /// The view's filter and selection on the old data source are removed and
    /// the field names fetched before the new query runs.
    fn dataset_changed(&self, data_source: DataSource) {
        let previous = self.query.lock().as_ref().and_then(|query| query.data_source.clone());
        self.reset(Some(Query::new().select_from(data_source.database.clone(), data_source.table.clone())));
        self.fields.send_replace(Vec::new());

        let this = self.this.clone();
        self.pending.start(async move {
            let Some(inner) = this.upgrade() else { return };
            if previous.is_some() {
                let key = inner.filter_key.clone();
                if let Err(err) = inner.messenger.remove_filter(key.clone()).await {
                    warn!("Could not remove filter '{}': {}", key, err);
                }
                if let Err(err) = inner.messenger.remove_selection(key.clone()).await {
                    warn!("Could not remove selection '{}': {}", key, err);
                }
            }

            match inner.connection.field_names(&data_source.database, &data_source.table).await {
                Ok(names) => {
                    inner.fields.send_replace(names);
                }
                Err(err) => warn!("Could not fetch field names of {}: {}", data_source, err),
            }

            // a later dataset change wins
            if inner.data_source().ok().as_ref() == Some(&data_source) {
                inner.refresh();
            }
        });
    }

    fn data_source(&self) -> Result<DataSource, RegistryError> {
        self.query
            .lock()
            .as_ref()
            .and_then(|query| query.data_source.clone())
            .ok_or_else(|| RegistryError::InvalidFilter(self.filter_key.clone(), "view has no query".to_string()))
    }
}

/// A widget that keeps one query's rows current
///
/// The view re-runs its current query whenever filters or the selection
/// change, starts over on a new dataset, and ignores responses that arrive
/// after a newer request was made.
pub struct DataView {
    inner: Arc<Inner>,
}

impl DataView {
    pub fn new(context: &NeonContext, connection: Connection) -> Self {
        let initial = context
            .active_dataset()
            .map(|dataset| Query::new().select_from(dataset.database, dataset.table));

        let inner = Arc::new_cyclic(|this: &Weak<Inner>| {
            let messenger = context.messenger();
            let on_filters = this.clone();
            let on_selection = this.clone();
            let on_dataset = this.clone();
            let on_connection = this.clone();
            messenger.events(
                MessengerEvents::new()
                    .on_filters_changed(move |_: &FilterEvent| {
                        if let Some(inner) = on_filters.upgrade() {
                            inner.refresh();
                        }
                    })
                    .on_selection_changed(move |_: &FilterEvent| {
                        if let Some(inner) = on_selection.upgrade() {
                            inner.refresh();
                        }
                    })
                    .on_active_dataset_changed(move |event| {
                        if let Some(inner) = on_dataset.upgrade() {
                            inner.dataset_changed(event.data_source());
                        }
                    })
                    .on_active_connection_changed(move |_| {
                        if let Some(inner) = on_connection.upgrade() {
                            inner.reset(None);
                        }
                    }),
            );

            Inner {
                this: this.clone(),
                messenger,
                connection,
                filter_key: FilterKey::new(instance_id("dataView")),
                query: Mutex::new(initial),
                generation: AtomicU64::new(0),
                state: watch::channel(ViewState::default()).0,
                fields: watch::channel(Vec::new()).0,
                pending: PendingWork::new(context.runtime().clone()),
            }
        });
        Self { inner }
    }

    pub fn filter_key(&self) -> &FilterKey {
        &self.inner.filter_key
    }

    pub fn query(&self) -> Option<Query> {
        self.inner.query.lock().clone()
    }

    /// Replace the query and run it; returns the request generation
    pub fn set_query(&self, query: Query) -> u64 {
        *self.inner.query.lock() = Some(query);
        self.inner.refresh().unwrap_or_default()
    }

    /// Re-run the current query; `None` when the view has none
    pub fn refresh(&self) -> Option<u64> {
        self.inner.refresh()
    }

    pub fn results(&self) -> watch::Receiver<ViewState> {
        self.inner.state.subscribe()
    }

    /// Field names of the current dataset, refreshed on every dataset change
    pub fn fields(&self) -> watch::Receiver<Vec<String>> {
        self.inner.fields.subscribe()
    }

    pub fn messenger(&self) -> &Messenger {
        &self.inner.messenger
    }

    /// Restrict every other widget on this data source with `clause`
    pub async fn apply_filter(&self, clause: WhereClause) -> Result<FilterEvent, RegistryError> {
        self.inner.pending.settle().await;
        let data_source = self.inner.data_source()?;
        let filter = Filter::select_from(data_source.database, data_source.table).where_clause(clause);
        self.inner.messenger.replace_filter(self.inner.filter_key.clone(), filter).await
    }

    pub async fn clear_filter(&self) -> Result<FilterEvent, RegistryError> {
        self.inner.pending.settle().await;
        self.inner.messenger.remove_filter(self.inner.filter_key.clone()).await
    }

    /// Publish `clause` as this view's selection
    pub async fn apply_selection(&self, clause: WhereClause) -> Result<FilterEvent, RegistryError> {
        self.inner.pending.settle().await;
        let data_source = self.inner.data_source()?;
        let filter = Filter::select_from(data_source.database, data_source.table).where_clause(clause);
        self.inner.messenger.replace_selection(self.inner.filter_key.clone(), filter).await
    }

    pub async fn clear_selection(&self) -> Result<FilterEvent, RegistryError> {
        self.inner.pending.settle().await;
        self.inner.messenger.remove_selection(self.inner.filter_key.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MemoryExecutor;
    use crate::store::MemoryStore;
    use crate::ConnectionConfig;
    use serde_json::json;
    use tokio::runtime::Handle;

    fn view(context: &NeonContext) -> DataView {
        let store = MemoryStore::new();
        store.insert_json("db", "t", vec![json!({"_id": 1})]);
        let executor = MemoryExecutor::new(store, context.filters.clone());
        DataView::new(context, Connection::new(ConnectionConfig::default(), Arc::new(executor), Handle::current()))
    }

    #[tokio::test]
    async fn test_stale_responses_are_discarded() {
        let context = NeonContext::new(Handle::current());
        let view = view(&context);
        let first = view.inner.begin();
        let second = view.inner.begin();

        assert!(!view.inner.deliver(first, Err(DataError::Other("late".into()))));
        assert!(view.inner.deliver(second, Ok(QueryResult::default())));
        let state = view.results().borrow().clone();
        assert_eq!(state.generation, second);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_view_without_query_does_not_run() {
        let context = NeonContext::new(Handle::current());
        let view = view(&context);
        assert!(view.refresh().is_none());
        assert!(view.apply_filter(WhereClause::eq("_id", 1)).await.is_err());
    }
}
