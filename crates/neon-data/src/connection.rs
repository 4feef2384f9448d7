use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use neon_core::{DataSource, FilterStore, Query, QueryGroup};

use crate::config::ConnectionConfig;
use crate::executor::{MemoryExecutor, QueryExecutor, QueryResult};
use crate::schema::ColumnMetadata;
use crate::sources::load_tables;
use crate::store::MemoryStore;
use crate::transform::TransformRegistry;
use crate::DataError;

/// Widget-facing handle on one backend
///
/// Queries are validated before they reach the executor, so build-time misuse
/// fails synchronously with [`DataError::InvalidQuery`]. Every operation is
/// also offered as a `*_then` variant that runs on the tokio runtime and
/// reports through a success/error callback pair.
#[derive(Clone)]
pub struct Connection {
    config: Arc<ConnectionConfig>,
    executor: Arc<dyn QueryExecutor>,
    runtime: Handle,
}

impl Connection {
    pub fn new(config: ConnectionConfig, executor: Arc<dyn QueryExecutor>, runtime: Handle) -> Self {
        Self {
            config: Arc::new(config),
            executor,
            runtime,
        }
    }

    /// Load the configured tables and serve them from memory
    pub async fn open(
        config: ConnectionConfig,
        filters: Arc<dyn FilterStore>,
        transforms: TransformRegistry,
        runtime: Handle,
    ) -> Result<Self, DataError> {
        config.validate()?;
        let store = MemoryStore::new();
        load_tables(&store, &config.tables).await?;

        let executor = MemoryExecutor::new(store, filters)
            .with_transforms(transforms)
            .with_id_field(config.id_field.clone())
            .with_sample_size(config.metadata_sample_size);
        info!(
            "Opened {} connection to {} with {} tables",
            config.datastore,
            config.hostname,
            config.tables.len()
        );
        Ok(Self::new(config, Arc::new(executor), runtime))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn datastore(&self) -> &str {
        &self.config.datastore
    }

    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    pub async fn execute_query(&self, query: &Query) -> Result<QueryResult, DataError> {
        query.validate()?;
        debug!("Executing query on {:?}", query.data_source);
        self.executor.execute_query(query).await
    }

    pub async fn execute_query_group(&self, group: &QueryGroup) -> Result<QueryResult, DataError> {
        group.validate()?;
        debug!("Executing group of {} queries", group.queries.len());
        self.executor.execute_query_group(group).await
    }

    pub async fn field_names(&self, database: &str, table: &str) -> Result<Vec<String>, DataError> {
        let data_source = DataSource::new(database, table);
        data_source.validate()?;
        self.executor.field_names(&data_source).await
    }

    pub async fn column_metadata(&self, database: &str, table: &str) -> Result<Vec<ColumnMetadata>, DataError> {
        let data_source = DataSource::new(database, table);
        data_source.validate()?;
        self.executor.column_metadata(&data_source).await
    }

    pub fn execute_query_then<S, E>(&self, query: Query, on_success: S, on_error: E)
    where
        S: FnOnce(QueryResult) + Send + 'static,
        E: FnOnce(DataError) + Send + 'static,
    {
        // invalid queries never reach the runtime
        if let Err(err) = query.validate() {
            on_error(err.into());
            return;
        }
        let connection = self.clone();
        self.spawn_then(async move { connection.execute_query(&query).await }, on_success, on_error);
    }

    pub fn execute_query_group_then<S, E>(&self, group: QueryGroup, on_success: S, on_error: E)
    where
        S: FnOnce(QueryResult) + Send + 'static,
        E: FnOnce(DataError) + Send + 'static,
    {
        if let Err(err) = group.validate() {
            on_error(err.into());
            return;
        }
        let connection = self.clone();
        self.spawn_then(async move { connection.execute_query_group(&group).await }, on_success, on_error);
    }

    pub fn field_names_then<S, E>(&self, database: &str, table: &str, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(DataError) + Send + 'static,
    {
        let connection = self.clone();
        let (database, table) = (database.to_string(), table.to_string());
        self.spawn_then(
            async move { connection.field_names(&database, &table).await },
            on_success,
            on_error,
        );
    }

    pub fn column_metadata_then<S, E>(&self, database: &str, table: &str, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<ColumnMetadata>) + Send + 'static,
        E: FnOnce(DataError) + Send + 'static,
    {
        let connection = self.clone();
        let (database, table) = (database.to_string(), table.to_string());
        self.spawn_then(
            async move { connection.column_metadata(&database, &table).await },
            on_success,
            on_error,
        );
    }

    fn spawn_then<T, Fut, S, E>(&self, request: Fut, on_success: S, on_error: E)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, DataError>> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(DataError) + Send + 'static,
    {
        self.runtime.spawn(async move {
            match request.await {
                Ok(value) => on_success(value),
                Err(err) => {
                    warn!("Request failed: {}", err);
                    on_error(err);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSource;
    use neon_core::{Filter, FilterRegistry, Partition, QueryError, WhereClause};
    use serde_json::json;
    use tokio::sync::oneshot;

    fn connection() -> Connection {
        let store = MemoryStore::new();
        store.insert_json("db", "t", vec![json!({"_id": 1, "state": "VA"})]);
        let executor = MemoryExecutor::new(store, Arc::new(FilterRegistry::new()));
        Connection::new(ConnectionConfig::default(), Arc::new(executor), Handle::current())
    }

    #[tokio::test]
    async fn test_invalid_query_fails_before_execution() {
        let (tx, rx) = oneshot::channel();
        connection().execute_query_then(
            Query::new(),
            |_| panic!("query without data source executed"),
            move |err| {
                let _ = tx.send(err);
            },
        );
        assert!(matches!(rx.await.unwrap(), DataError::InvalidQuery(QueryError::MissingDataSource)));
    }

    #[tokio::test]
    async fn test_callbacks_receive_results() {
        let (tx, rx) = oneshot::channel();
        connection().field_names_then(
            "db",
            "t",
            move |names| {
                let _ = tx.send(names);
            },
            |err| panic!("field names failed: {}", err),
        );
        assert_eq!(rx.await.unwrap(), vec!["_id", "state"]);
    }

    #[tokio::test]
    async fn test_execution_errors_reach_the_error_path() {
        let (tx, rx) = oneshot::channel();
        connection().column_metadata_then(
            "db",
            "missing",
            |_| panic!("metadata for a missing table"),
            move |err| {
                let _ = tx.send(err);
            },
        );
        assert!(matches!(rx.await.unwrap(), DataError::UnknownTable { .. }));
    }

    fn temp_file(extension: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("neon-open-{}.{}", uuid::Uuid::new_v4(), extension));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_open_loads_every_configured_table() {
        let staff = temp_file(
            "json",
            r#"[{"_id": 1, "state": "VA"}, {"_id": 2, "state": "DC"}, {"_id": 3, "state": "DC"}]"#,
        );
        let offices = temp_file("csv", "_id,city,desks,open\nhq,Arlington,120,true\nlab,Fairfax,35.5,false\n");
        let config = ConnectionConfig::default()
            .with_table(TableSource::new("company", "staff", staff.clone()))
            .with_table(TableSource::new("company", "offices", offices.clone()));

        let filters = Arc::new(FilterRegistry::new());
        let connection = Connection::open(config, filters.clone(), TransformRegistry::new(), Handle::current())
            .await
            .unwrap();
        std::fs::remove_file(&staff).unwrap();
        std::fs::remove_file(&offices).unwrap();

        let result = connection
            .execute_query(&Query::new().select_from("company", "staff"))
            .await
            .unwrap();
        assert_eq!(result.len(), 3);

        let result = connection
            .execute_query(&Query::new().select_from("company", "offices"))
            .await
            .unwrap();
        assert_eq!(result.data[0]["desks"], json!(120));
        assert_eq!(result.data[0]["open"], json!(true));
        assert_eq!(result.data[1]["city"], json!("Fairfax"));
        assert_eq!(result.data[1]["desks"], json!(35.5));
        assert_eq!(connection.field_names("company", "offices").await.unwrap(), vec!["_id", "city", "desks", "open"]);

        // the opened connection still honours the registry
        filters
            .add(
                Partition::Filters,
                "dc".into(),
                Filter::select_from("company", "staff").where_clause(WhereClause::eq("state", "DC")),
            )
            .await
            .unwrap();
        let result = connection
            .execute_query(&Query::new().select_from("company", "staff"))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_open_fails_on_a_missing_file() {
        let config = ConnectionConfig::default().with_table(TableSource::new(
            "company",
            "staff",
            std::env::temp_dir().join(format!("neon-missing-{}.json", uuid::Uuid::new_v4())),
        ));
        let err = Connection::open(config, Arc::new(FilterRegistry::new()), TransformRegistry::new(), Handle::current())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DataError::Io(_)));
    }
}
