//! Query execution
//!
//! [`QueryExecutor`] is the request/response boundary widgets talk to through
//! a [`crate::Connection`]. [`MemoryExecutor`] implements it over a
//! [`MemoryStore`], merging the registry's filter and selection state into
//! every query unless the query opts out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use neon_core::{DataSource, EffectiveFilter, FilterStore, Query, QueryError, QueryGroup};

use crate::schema::{self, ColumnMetadata, SchemaDetector};
use crate::store::{MemoryStore, Row};
use crate::transform::TransformRegistry;
use crate::DataError;

mod pipeline;
mod predicate;
pub(crate) mod value;

/// Rows returned by an executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub data: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Backend that runs queries
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_query(&self, query: &Query) -> Result<QueryResult, DataError>;

    /// Runs every member with the group's flags and concatenates the rows in order
    async fn execute_query_group(&self, group: &QueryGroup) -> Result<QueryResult, DataError> {
        group.validate()?;
        let mut data = Vec::new();
        for query in group.effective_queries() {
            data.extend(self.execute_query(&query).await?.data);
        }
        Ok(QueryResult { data })
    }

    async fn field_names(&self, data_source: &DataSource) -> Result<Vec<String>, DataError>;

    async fn column_metadata(&self, data_source: &DataSource) -> Result<Vec<ColumnMetadata>, DataError>;
}

/// Executor over in-memory tables
#[derive(Clone)]
pub struct MemoryExecutor {
    store: MemoryStore,
    filters: Arc<dyn FilterStore>,
    transforms: TransformRegistry,
    id_field: String,
    sample_size: usize,
}

impl MemoryExecutor {
    pub fn new(store: MemoryStore, filters: Arc<dyn FilterStore>) -> Self {
        Self {
            store,
            filters,
            transforms: TransformRegistry::new(),
            id_field: "_id".to_string(),
            sample_size: 1000,
        }
    }

    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn execute_query(&self, query: &Query) -> Result<QueryResult, DataError> {
        query.validate()?;
        let data_source = query.data_source.as_ref().ok_or(QueryError::MissingDataSource)?;
        let table = self.store.table(data_source)?;
        let restriction = self
            .filters
            .effective_filter(data_source, &query.ignore_filters, query.selection_only)
            .await?;

        if let EffectiveFilter::Clauses(clauses) = &restriction {
            debug!("Querying {} with {} registered clauses", data_source, clauses.len());
        } else {
            debug!("Querying {} with an empty selection", data_source);
        }

        let rows = pipeline::run(&table, data_source, query, &restriction, &self.id_field)?;
        let rows = self.transforms.apply(&query.transforms, rows)?;
        info!("Query on {} returned {} rows", data_source, rows.len());
        Ok(QueryResult { data: rows })
    }

    async fn field_names(&self, data_source: &DataSource) -> Result<Vec<String>, DataError> {
        let table = self.store.table(data_source)?;
        Ok(schema::field_names(&table))
    }

    async fn column_metadata(&self, data_source: &DataSource) -> Result<Vec<ColumnMetadata>, DataError> {
        let table = self.store.table(data_source)?;
        Ok(SchemaDetector::new().with_sample_size(self.sample_size).detect(&table))
    }
}
