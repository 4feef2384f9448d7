//! Controller of a filter-builder pane
//!
//! Rows are edited optimistically: the local table changes first and the
//! compiled filter is pushed with `replace_filter`. If the registry rejects
//! it, the local change is undone and the error is returned. Removing the
//! filter of a previous dataset always lands before the next push.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use neon_core::events::events::ActiveDatasetChanged;
use neon_core::widget::{instance_id, FilterRow, FilterTable};
use neon_core::{DataSource, Filter, FilterEvent, FilterKey, Messenger, MessengerEvents, NeonContext, RegistryError};

use super::PendingWork;
use crate::connection::Connection;

struct BuilderState {
    table: FilterTable,
    data_source: Option<DataSource>,
    and_clauses: bool,
}

impl BuilderState {
    fn filter(&self) -> Result<Filter, RegistryError> {
        let data_source = self.data_source.as_ref().ok_or_else(|| {
            RegistryError::InvalidFilter(self.table.filter_key().clone(), "no active dataset".to_string())
        })?;
        Ok(self
            .table
            .build_filter(&data_source.database, &data_source.table, self.and_clauses))
    }
}

struct Inner {
    this: Weak<Inner>,
    messenger: Messenger,
    connection: Connection,
    state: Mutex<BuilderState>,
    fields: watch::Sender<Vec<String>>,
    pending: PendingWork,
}

impl Inner {
    async fn push(&self, filter: Filter) -> Result<FilterEvent, RegistryError> {
        self.pending.settle().await;
        let key = self.state.lock().table.filter_key().clone();
        self.messenger.replace_filter(key, filter).await
    }

    fn connection_changed(&self) {
        let mut state = self.state.lock();
        state.table.clear();
        state.data_source = None;
        self.fields.send_replace(Vec::new());
        info!("Filter builder {} reset for a new connection", state.table.filter_key());
    }

    fn dataset_changed(&self, event: &ActiveDatasetChanged) {
        let data_source = event.data_source();
        let (key, previous) = {
            let mut state = self.state.lock();
            state.table.clear();
            (state.table.filter_key().clone(), state.data_source.replace(data_source.clone()))
        };
        info!("Filter builder {} now targets {}", key, data_source);

        if previous.is_some() {
            let this = self.this.clone();
            self.pending.start(async move {
                let Some(inner) = this.upgrade() else { return };
                if let Err(err) = inner.messenger.remove_filter(key.clone()).await {
                    warn!("Could not remove filter '{}': {}", key, err);
                }
            });
        }
        self.fetch_fields(data_source);
    }

    fn fetch_fields(&self, data_source: DataSource) {
        self.fields.send_replace(Vec::new());
        let this = self.this.clone();
        let requested = data_source.clone();
        let (database, table) = (data_source.database.clone(), data_source.table.clone());
        self.connection.field_names_then(
            &database,
            &table,
            move |names| {
                let Some(inner) = this.upgrade() else { return };
                // a later dataset change wins
                if inner.state.lock().data_source.as_ref() == Some(&requested) {
                    inner.fields.send_replace(names);
                }
            },
            move |err| warn!("Could not fetch field names of {}: {}", data_source, err),
        );
    }
}

/// Filter builder bound to the active dataset of a [`NeonContext`]
pub struct FilterBuilder {
    inner: Arc<Inner>,
}

impl FilterBuilder {
    pub fn new(context: &NeonContext, connection: Connection) -> Self {
        let filter_key = FilterKey::new(instance_id("filterBuilder"));
        let inner = Arc::new_cyclic(|this: &Weak<Inner>| {
            let messenger = context.messenger();
            let on_connection = this.clone();
            let on_dataset = this.clone();
            messenger.events(
                MessengerEvents::new()
                    .on_active_connection_changed(move |_| {
                        if let Some(inner) = on_connection.upgrade() {
                            inner.connection_changed();
                        }
                    })
                    .on_active_dataset_changed(move |event| {
                        if let Some(inner) = on_dataset.upgrade() {
                            inner.dataset_changed(event);
                        }
                    }),
            );

            Inner {
                this: this.clone(),
                messenger,
                connection,
                state: Mutex::new(BuilderState {
                    table: FilterTable::new(filter_key),
                    data_source: None,
                    and_clauses: true,
                }),
                fields: watch::channel(Vec::new()).0,
                pending: PendingWork::new(context.runtime().clone()),
            }
        });

        if let Some(dataset) = context.active_dataset() {
            let data_source = dataset.data_source();
            inner.state.lock().data_source = Some(data_source.clone());
            inner.fetch_fields(data_source);
        }
        Self { inner }
    }

    pub fn filter_key(&self) -> FilterKey {
        self.inner.state.lock().table.filter_key().clone()
    }

    pub fn data_source(&self) -> Option<DataSource> {
        self.inner.state.lock().data_source.clone()
    }

    pub fn rows(&self) -> Vec<FilterRow> {
        self.inner.state.lock().table.rows().to_vec()
    }

    pub fn and_clauses(&self) -> bool {
        self.inner.state.lock().and_clauses
    }

    /// Field names of the active dataset; empty until they arrive
    pub fn fields(&self) -> watch::Receiver<Vec<String>> {
        self.inner.fields.subscribe()
    }

    pub async fn add_row(&self, row: FilterRow) -> Result<FilterEvent, RegistryError> {
        let (index, filter) = {
            let mut state = self.inner.state.lock();
            state.filter()?;
            state.table.add_row(row);
            (state.table.len() - 1, state.filter()?)
        };
        match self.inner.push(filter).await {
            Ok(event) => Ok(event),
            Err(err) => {
                warn!("Reverting added filter row: {}", err);
                self.inner.state.lock().table.remove_row(index);
                Err(err)
            }
        }
    }

    /// `Ok(None)` when there is no row at `index`
    pub async fn remove_row(&self, index: usize) -> Result<Option<FilterEvent>, RegistryError> {
        let (removed, filter) = {
            let mut state = self.inner.state.lock();
            state.filter()?;
            let Some(removed) = state.table.remove_row(index) else {
                return Ok(None);
            };
            (removed, state.filter()?)
        };
        match self.inner.push(filter).await {
            Ok(event) => Ok(Some(event)),
            Err(err) => {
                warn!("Restoring removed filter row: {}", err);
                self.inner.state.lock().table.insert_row(index, removed);
                Err(err)
            }
        }
    }

    /// `Ok(None)` when there is no row at `index`
    pub async fn update_row(&self, index: usize, row: FilterRow) -> Result<Option<FilterEvent>, RegistryError> {
        let (previous, filter) = {
            let mut state = self.inner.state.lock();
            state.filter()?;
            if state.table.get_row(index).is_none() {
                return Ok(None);
            }
            let previous = state.table.set_row(index, row);
            (previous, state.filter()?)
        };
        match self.inner.push(filter).await {
            Ok(event) => Ok(Some(event)),
            Err(err) => {
                warn!("Restoring edited filter row: {}", err);
                if let Some(previous) = previous {
                    self.inner.state.lock().table.set_row(index, previous);
                }
                Err(err)
            }
        }
    }

    /// Switch between the AND and the OR of the rows
    pub async fn set_and_clauses(&self, and_clauses: bool) -> Result<FilterEvent, RegistryError> {
        let (previous, filter) = {
            let mut state = self.inner.state.lock();
            let previous = std::mem::replace(&mut state.and_clauses, and_clauses);
            match state.filter() {
                Ok(filter) => (previous, filter),
                Err(err) => {
                    state.and_clauses = previous;
                    return Err(err);
                }
            }
        };
        match self.inner.push(filter).await {
            Ok(event) => Ok(event),
            Err(err) => {
                self.inner.state.lock().and_clauses = previous;
                Err(err)
            }
        }
    }

    /// Remove this builder's filter; the rows are cleared once the registry agrees
    pub async fn reset(&self) -> Result<FilterEvent, RegistryError> {
        self.inner.pending.settle().await;
        let event = self.inner.messenger.remove_filter(self.filter_key()).await?;
        self.inner.state.lock().table.clear();
        Ok(event)
    }
}
