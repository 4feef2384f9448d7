//! Query execution, data sources and widget controllers for the dashboard
//!
//! `neon-core` describes queries and keeps filter state; this crate runs those
//! queries against in-memory tables loaded from JSON or CSV files.

pub mod config;
pub mod connection;
pub mod executor;
pub mod schema;
pub mod sources;
pub mod store;
pub mod transform;
pub mod widgets;

use neon_core::{QueryError, RegistryError};
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use config::{ConnectionConfig, NullConfig, SourceFormat, TableSource};
pub use connection::Connection;
pub use executor::{MemoryExecutor, QueryExecutor, QueryResult};
pub use schema::{ColumnMetadata, SchemaDetector};
pub use store::{MemoryStore, Row};
pub use transform::{RowTransform, TransformRegistry};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Unknown table '{table}' in database '{database}'")]
    UnknownTable { database: String, table: String },

    #[error("Field '{field}' does not occur in {database}.{table}")]
    UnknownField {
        database: String,
        table: String,
        field: String,
    },

    #[error("No transform registered as '{0}'")]
    UnknownTransform(String),

    #[error("Transform '{name}' failed: {source}")]
    Transform {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("Filter registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}
