use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::ReaderBuilder;
use tracing::debug;

use super::RowSource;
use crate::config::NullConfig;
use crate::store::Row;
use crate::DataError;

/// CSV data source; the header line names the fields
pub struct CsvSource {
    /// Path to the CSV file
    path: PathBuf,
    name: String,
    null_config: NullConfig,
}

impl CsvSource {
    pub fn new(path: PathBuf, null_config: NullConfig) -> Self {
        let name = path.display().to_string();
        Self {
            path,
            name,
            null_config,
        }
    }

    fn read(path: &Path, null_config: &NullConfig) -> Result<Vec<Row>, DataError> {
        let file = File::open(path)?;
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers = csv_reader.headers()?.clone();
        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            // short records leave their trailing fields missing
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| (header.to_string(), null_config.cell_value(cell)))
                .collect();
            rows.push(row);
        }
        debug!("Read {} rows with {} columns from {}", rows.len(), headers.len(), path.display());
        Ok(rows)
    }
}

#[async_trait]
impl RowSource for CsvSource {
    async fn load_rows(&self) -> Result<Vec<Row>, DataError> {
        tokio::task::spawn_blocking({
            let path = self.path.clone();
            let null_config = self.null_config.clone();
            move || Self::read(&path, &null_config)
        })
        .await?
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
