//! Error types shared by the query model and the filter registry

use thiserror::Error;

use crate::query::FilterKey;

/// Misuse of the query model, detected before anything is sent to an executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("No data source selected; call select_from first")]
    MissingDataSource,

    #[error("Data source requires a non-empty {0} name")]
    EmptyDataSourceName(&'static str),

    #[error("Limit must be a positive integer")]
    ZeroLimit,

    #[error("Empty field name in {0}")]
    EmptyField(&'static str),

    #[error("Transform name must not be empty")]
    EmptyTransformName,

    #[error("Query group contains no queries")]
    EmptyGroup,

    #[error("Parse error at {position}: {message}")]
    Parse { position: usize, message: String },
}

/// Failure of a filter or selection mutation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Filter key '{0}' is already registered; use replace instead")]
    DuplicateKey(FilterKey),

    #[error("Filter for key '{0}' is invalid: {1}")]
    InvalidFilter(FilterKey, String),

    #[error("Filter registry unavailable: {0}")]
    Unavailable(String),
}
