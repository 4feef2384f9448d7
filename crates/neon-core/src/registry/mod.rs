//! Keyed filter and selection state shared by every widget
//!
//! The registry is the authority on which filters are active. Widgets never
//! cache its contents; they mutate it through a [`crate::Messenger`] and
//! re-query once the mutation has been acknowledged.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::query::{DataSource, Filter, IgnoreFilters, WhereClause};

mod event;

pub use crate::query::FilterKey;
pub use event::{FilterEvent, FilterEventType, Partition};

/// Restriction an executor must apply to a query's records
#[derive(Debug, Clone, PartialEq)]
pub enum EffectiveFilter {
    /// Records must satisfy every clause; an empty list keeps everything
    Clauses(Vec<WhereClause>),
    /// No record can match (selection-only query without an active selection)
    Nothing,
}

impl EffectiveFilter {
    pub fn everything() -> Self {
        EffectiveFilter::Clauses(Vec::new())
    }
}

/// Request/response access to the filter and selection partitions
///
/// Every mutation is atomic with respect to other requests. Concurrent
/// mutations of the same key are last-writer-wins.
#[async_trait]
pub trait FilterStore: Send + Sync {
    /// Registers a new key; fails if the key is already in use
    async fn add(&self, partition: Partition, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError>;

    /// Upserts a key
    async fn replace(&self, partition: Partition, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError>;

    /// Removes a key. Removing an unknown key is a no-op whose event carries no filter.
    async fn remove(&self, partition: Partition, key: &FilterKey) -> Result<FilterEvent, RegistryError>;

    /// Removes every key of the partition in one step, one event per removed key
    async fn clear(&self, partition: Partition) -> Result<Vec<FilterEvent>, RegistryError>;

    /// Restriction for a query against `data_source`
    async fn effective_filter(
        &self,
        data_source: &DataSource,
        ignore: &IgnoreFilters,
        selection_only: bool,
    ) -> Result<EffectiveFilter, RegistryError>;

    /// Snapshot of one partition, in registration order
    async fn entries(&self, partition: Partition) -> Result<Vec<(FilterKey, Filter)>, RegistryError>;
}

type Entries = Arc<RwLock<IndexMap<FilterKey, Filter>>>;

/// In-process filter store
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: Entries,
    selection: Entries,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, partition: Partition) -> &Entries {
        match partition {
            Partition::Filters => &self.filters,
            Partition::Selection => &self.selection,
        }
    }

    fn check(key: &FilterKey, filter: &Filter) -> Result<(), RegistryError> {
        filter
            .validate()
            .map_err(|e| RegistryError::InvalidFilter(key.clone(), e.to_string()))
    }

    fn clauses_for(
        entries: &IndexMap<FilterKey, Filter>,
        data_source: &DataSource,
        ignore: &IgnoreFilters,
    ) -> Option<Vec<WhereClause>> {
        let mut matched = false;
        let mut clauses = Vec::new();
        for (key, filter) in entries {
            if filter.data_source != *data_source || ignore.ignores(key) {
                continue;
            }
            matched = true;
            if let Some(clause) = &filter.where_clause {
                clauses.push(clause.clone());
            }
        }
        matched.then_some(clauses)
    }
}

#[async_trait]
impl FilterStore for FilterRegistry {
    async fn add(&self, partition: Partition, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        Self::check(&key, &filter)?;
        let mut entries = self.partition(partition).write();
        if entries.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }

        info!("Adding {} key '{}' on {}", partition, key, filter.data_source);
        entries.insert(key.clone(), filter.clone());
        Ok(FilterEvent::new(FilterEventType::Add, partition, key).added(filter))
    }

    async fn replace(&self, partition: Partition, key: FilterKey, filter: Filter) -> Result<FilterEvent, RegistryError> {
        Self::check(&key, &filter)?;
        let mut entries = self.partition(partition).write();
        let previous = entries.insert(key.clone(), filter.clone());

        info!("Replacing {} key '{}' on {}", partition, key, filter.data_source);
        let event_type = if previous.is_some() {
            FilterEventType::Replace
        } else {
            FilterEventType::Add
        };
        Ok(FilterEvent::new(event_type, partition, key).added(filter).removed(previous))
    }

    async fn remove(&self, partition: Partition, key: &FilterKey) -> Result<FilterEvent, RegistryError> {
        let removed = self.partition(partition).write().shift_remove(key);
        match &removed {
            Some(filter) => info!("Removed {} key '{}' from {}", partition, key, filter.data_source),
            None => debug!("Ignoring removal of unknown {} key '{}'", partition, key),
        }
        Ok(FilterEvent::new(FilterEventType::Remove, partition, key.clone()).removed(removed))
    }

    async fn clear(&self, partition: Partition) -> Result<Vec<FilterEvent>, RegistryError> {
        let drained = std::mem::take(&mut *self.partition(partition).write());
        info!("Cleared {} {} keys", drained.len(), partition);
        Ok(drained
            .into_iter()
            .map(|(key, filter)| FilterEvent::new(FilterEventType::Remove, partition, key).removed(Some(filter)))
            .collect())
    }

    async fn effective_filter(
        &self,
        data_source: &DataSource,
        ignore: &IgnoreFilters,
        selection_only: bool,
    ) -> Result<EffectiveFilter, RegistryError> {
        if selection_only {
            let selection = self.selection.read();
            return Ok(match Self::clauses_for(&selection, data_source, ignore) {
                Some(clauses) => EffectiveFilter::Clauses(clauses),
                None => EffectiveFilter::Nothing,
            });
        }

        let filters = self.filters.read();
        Ok(EffectiveFilter::Clauses(
            Self::clauses_for(&filters, data_source, ignore).unwrap_or_default(),
        ))
    }

    async fn entries(&self, partition: Partition) -> Result<Vec<(FilterKey, Filter)>, RegistryError> {
        Ok(self
            .partition(partition)
            .read()
            .iter()
            .map(|(k, f)| (k.clone(), f.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operator;

    fn records() -> DataSource {
        DataSource::new("acceptanceTest", "records")
    }

    fn dc_filter() -> Filter {
        Filter::select_from("acceptanceTest", "records").where_clause(WhereClause::eq("state", "DC"))
    }

    fn salary_filter() -> Filter {
        Filter::select_from("acceptanceTest", "records")
            .where_clause(WhereClause::compare("salary", Operator::Gt, 85000))
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_add_rejects_duplicate_keys() {
        block_on(async {
            let registry = FilterRegistry::new();
            let event = registry.add(Partition::Filters, "a".into(), dc_filter()).await.unwrap();
            assert_eq!(event.event_type, FilterEventType::Add);
            assert_eq!(event.added_filter, Some(dc_filter()));

            let err = registry.add(Partition::Filters, "a".into(), salary_filter()).await.unwrap_err();
            assert_eq!(err, RegistryError::DuplicateKey("a".into()));
        });
    }

    #[test]
    fn test_effective_filter_is_conjunction_of_keys() {
        block_on(async {
            let registry = FilterRegistry::new();
            registry.add(Partition::Filters, "a".into(), dc_filter()).await.unwrap();
            registry.add(Partition::Filters, "b".into(), salary_filter()).await.unwrap();
            registry
                .add(Partition::Filters, "other".into(), Filter::select_from("db", "elsewhere"))
                .await
                .unwrap();

            let all = registry.effective_filter(&records(), &IgnoreFilters::None, false).await.unwrap();
            assert_eq!(
                all,
                EffectiveFilter::Clauses(vec![
                    dc_filter().where_clause.unwrap(),
                    salary_filter().where_clause.unwrap()
                ])
            );

            let ignore_a = IgnoreFilters::Keys([FilterKey::from("a")].into_iter().collect());
            let partial = registry.effective_filter(&records(), &ignore_a, false).await.unwrap();
            assert_eq!(partial, EffectiveFilter::Clauses(vec![salary_filter().where_clause.unwrap()]));

            let none = registry.effective_filter(&records(), &IgnoreFilters::All, false).await.unwrap();
            assert_eq!(none, EffectiveFilter::everything());
        });
    }

    #[test]
    fn test_replace_reports_previous_filter() {
        block_on(async {
            let registry = FilterRegistry::new();
            let first = registry.replace(Partition::Filters, "a".into(), dc_filter()).await.unwrap();
            assert_eq!(first.event_type, FilterEventType::Add);
            assert!(first.removed_filter.is_none());

            let second = registry.replace(Partition::Filters, "a".into(), salary_filter()).await.unwrap();
            assert_eq!(second.event_type, FilterEventType::Replace);
            assert_eq!(second.removed_filter, Some(dc_filter()));
            assert_eq!(second.added_filter, Some(salary_filter()));
            assert_eq!(registry.entries(Partition::Filters).await.unwrap().len(), 1);
        });
    }

    #[test]
    fn test_remove_unknown_key_is_a_no_op() {
        block_on(async {
            let registry = FilterRegistry::new();
            let event = registry.remove(Partition::Filters, &"missing".into()).await.unwrap();
            assert_eq!(event.event_type, FilterEventType::Remove);
            assert!(!event.changed_state());
        });
    }

    #[test]
    fn test_partitions_are_independent() {
        block_on(async {
            let registry = FilterRegistry::new();
            registry.add(Partition::Selection, "a".into(), dc_filter()).await.unwrap();

            let filters = registry.effective_filter(&records(), &IgnoreFilters::None, false).await.unwrap();
            assert_eq!(filters, EffectiveFilter::everything());

            let cleared = registry.clear(Partition::Filters).await.unwrap();
            assert!(cleared.is_empty());

            let cleared = registry.clear(Partition::Selection).await.unwrap();
            assert_eq!(cleared.len(), 1);
            let selection = registry.effective_filter(&records(), &IgnoreFilters::None, true).await.unwrap();
            assert_eq!(selection, EffectiveFilter::Nothing);
        });
    }

    #[test]
    fn test_invalid_filters_are_rejected() {
        block_on(async {
            let registry = FilterRegistry::new();
            let err = registry
                .add(Partition::Filters, "bad".into(), Filter::select_from("", "records"))
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidFilter(_, _)));
        });
    }
}
