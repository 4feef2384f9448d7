//! Filters and the keys they are registered under

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DataSource, WhereClause};
use crate::error::QueryError;

/// Caller-chosen identity of one widget's filter contribution
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterKey(String);

impl FilterKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilterKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for FilterKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A predicate scoped to one data source
///
/// A filter without a where clause matches every record of its data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(flatten)]
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
}

impl Filter {
    pub fn select_from(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: DataSource::new(database, table),
            where_clause: None,
        }
    }

    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        self.data_source.validate()?;
        if let Some(clause) = &self.where_clause {
            clause.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_wire_shape() {
        let filter = Filter::select_from("acceptanceTest", "records").where_clause(WhereClause::eq("state", "DC"));
        let encoded = serde_json::to_value(&filter).unwrap();
        assert_eq!(encoded["databaseName"], json!("acceptanceTest"));
        assert_eq!(encoded["tableName"], json!("records"));
        assert_eq!(encoded["whereClause"]["field"], json!("state"));
    }

    #[test]
    fn test_filter_requires_table() {
        let filter = Filter::select_from("acceptanceTest", "");
        assert_eq!(filter.validate(), Err(QueryError::EmptyDataSourceName("table")));
    }
}
