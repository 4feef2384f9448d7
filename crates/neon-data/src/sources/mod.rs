//! File-backed row sources

use async_trait::async_trait;
use tracing::info;

use crate::config::{SourceFormat, TableSource};
use crate::store::{MemoryStore, Row};
use crate::DataError;

pub mod csv_source;
pub mod json_source;

pub use csv_source::CsvSource;
pub use json_source::JsonSource;

/// Something that can produce the rows of one table
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Read every row; blocking I/O runs off the async workers
    async fn load_rows(&self) -> Result<Vec<Row>, DataError>;

    /// Get the source name/path
    fn source_name(&self) -> &str;
}

/// The loader for `source`'s format
pub fn source_for(source: &TableSource) -> Result<Box<dyn RowSource>, DataError> {
    Ok(match source.resolved_format()? {
        SourceFormat::Json => Box::new(JsonSource::new(source.path.clone())),
        SourceFormat::Csv => Box::new(CsvSource::new(source.path.clone(), source.null_config.clone())),
    })
}

/// Load every configured table into `store`, in order
pub async fn load_tables(store: &MemoryStore, sources: &[TableSource]) -> Result<(), DataError> {
    for source in sources {
        let loader = source_for(source)?;
        info!("Loading {}.{} from {}", source.database, source.table, loader.source_name());
        let rows = loader.load_rows().await?;
        store.insert_table(&source.database, &source.table, rows);
    }
    Ok(())
}
