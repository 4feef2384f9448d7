//! Connection configuration for the in-memory datastore

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::null_handling::NullConfig;
use crate::DataError;

/// File format of a table source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// A JSON array of objects
    Json,
    /// A CSV file with a header line
    Csv,
}

impl SourceFormat {
    /// Guess the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension.eq_ignore_ascii_case("json") {
            Some(SourceFormat::Json)
        } else if extension.eq_ignore_ascii_case("csv") {
            Some(SourceFormat::Csv)
        } else {
            None
        }
    }
}

/// One file loaded as `database.table`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSource {
    pub database: String,
    pub table: String,

    /// Path to the file
    pub path: PathBuf,

    /// Defaults to the format implied by the extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,

    /// Null handling for CSV cells
    #[serde(default)]
    pub null_config: NullConfig,
}

impl TableSource {
    pub fn new(database: impl Into<String>, table: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            path: path.into(),
            format: None,
            null_config: NullConfig::default(),
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn resolved_format(&self) -> Result<SourceFormat, DataError> {
        self.format
            .or_else(|| SourceFormat::from_path(&self.path))
            .ok_or_else(|| DataError::Other(format!("Cannot tell the format of {}", self.path.display())))
    }
}

/// Configuration for one connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    /// Datastore type announced on `activeConnectionChanged`
    pub datastore: String,

    pub hostname: String,

    /// Record id, always returned by plain queries
    pub id_field: String,

    /// Rows sampled for column metadata
    pub metadata_sample_size: usize,

    /// Files loaded when the connection opens
    pub tables: Vec<TableSource>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            datastore: "memory".to_string(),
            hostname: "localhost".to_string(),
            id_field: "_id".to_string(),
            metadata_sample_size: 1000,
            tables: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn from_json_str(text: &str) -> Result<Self, DataError> {
        let config: ConnectionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_table(mut self, source: TableSource) -> Self {
        self.tables.push(source);
        self
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.id_field.is_empty() {
            return Err(DataError::Other("idField must not be empty".to_string()));
        }
        if self.metadata_sample_size == 0 {
            return Err(DataError::Other("metadataSampleSize must be positive".to_string()));
        }
        for source in &self.tables {
            if source.database.is_empty() || source.table.is_empty() {
                return Err(DataError::Other(format!(
                    "Table source {} needs a database and a table name",
                    source.path.display()
                )));
            }
            source.resolved_format()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = ConnectionConfig::from_json_str(
            r#"{
                "hostname": "dashboard-1",
                "tables": [
                    {"database": "acceptanceTest", "table": "records", "path": "data/records.json"},
                    {"database": "acceptanceTest", "table": "extra", "path": "extra.txt", "format": "csv",
                     "nullConfig": {"patterns": ["?"]}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.datastore, "memory");
        assert_eq!(config.id_field, "_id");
        assert_eq!(config.tables[0].resolved_format().unwrap(), SourceFormat::Json);
        assert_eq!(config.tables[1].resolved_format().unwrap(), SourceFormat::Csv);
        assert!(config.tables[1].null_config.is_null("?"));
        assert!(config.tables[1].null_config.trim_whitespace);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let config = ConnectionConfig::default().with_table(TableSource::new("db", "t", "data.parquet"));
        assert!(matches!(config.validate(), Err(DataError::Other(_))));
    }
}
