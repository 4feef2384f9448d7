use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::RowSource;
use crate::store::Row;
use crate::DataError;

/// JSON file holding an array of records
pub struct JsonSource {
    path: PathBuf,
    name: String,
}

impl JsonSource {
    pub fn new(path: PathBuf) -> Self {
        let name = path.display().to_string();
        Self { path, name }
    }

    fn read(path: &Path) -> Result<Vec<Row>, DataError> {
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<Value> = serde_json::from_reader(reader)?;
        let total = records.len();
        let rows: Vec<Row> = records
            .into_iter()
            .filter_map(|record| match record {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect();
        if rows.len() < total {
            warn!("Skipped {} non-object records in {}", total - rows.len(), path.display());
        }
        Ok(rows)
    }
}

#[async_trait]
impl RowSource for JsonSource {
    async fn load_rows(&self) -> Result<Vec<Row>, DataError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read(&path)).await?
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
