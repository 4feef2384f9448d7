//! In-memory tables, keyed by database and table name

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::info;

use neon_core::DataSource;

use crate::DataError;

/// One record; field presence may differ between rows of the same table
pub type Row = Map<String, Value>;

type Tables = AHashMap<String, Arc<Vec<Row>>>;

/// Shared database -> table -> rows map
///
/// Tables are replaced wholesale, so readers holding an `Arc` to a table keep
/// a consistent snapshot while a reload happens.
#[derive(Clone, Default)]
pub struct MemoryStore {
    databases: Arc<RwLock<AHashMap<String, Tables>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table
    pub fn insert_table(&self, database: &str, table: &str, rows: Vec<Row>) {
        info!("Loaded {} rows into {}.{}", rows.len(), database, table);
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .insert(table.to_string(), Arc::new(rows));
    }

    /// Build a table from JSON objects; anything that is not an object is skipped
    pub fn insert_json(&self, database: &str, table: &str, records: Vec<Value>) {
        let rows = records
            .into_iter()
            .filter_map(|record| match record {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect();
        self.insert_table(database, table, rows);
    }

    pub fn remove_table(&self, database: &str, table: &str) -> bool {
        let mut databases = self.databases.write();
        let Some(tables) = databases.get_mut(database) else {
            return false;
        };
        let removed = tables.remove(table).is_some();
        if tables.is_empty() {
            databases.remove(database);
        }
        removed
    }

    /// Snapshot of the rows of `data_source`
    pub fn table(&self, data_source: &DataSource) -> Result<Arc<Vec<Row>>, DataError> {
        let databases = self.databases.read();
        let tables = databases
            .get(&data_source.database)
            .ok_or_else(|| DataError::UnknownDatabase(data_source.database.clone()))?;
        tables.get(&data_source.table).cloned().ok_or_else(|| DataError::UnknownTable {
            database: data_source.database.clone(),
            table: data_source.table.clone(),
        })
    }

    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn tables(&self, database: &str) -> Result<Vec<String>, DataError> {
        let databases = self.databases.read();
        let tables = databases
            .get(database)
            .ok_or_else(|| DataError::UnknownDatabase(database.to_string()))?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_errors_name_the_missing_part() {
        let store = MemoryStore::new();
        store.insert_json("db", "t", vec![json!({"a": 1}), json!(3)]);

        assert_eq!(store.table(&DataSource::new("db", "t")).unwrap().len(), 1);
        assert!(matches!(
            store.table(&DataSource::new("nope", "t")),
            Err(DataError::UnknownDatabase(db)) if db == "nope"
        ));
        assert!(matches!(
            store.table(&DataSource::new("db", "nope")),
            Err(DataError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_snapshots_survive_replacement() {
        let store = MemoryStore::new();
        store.insert_json("db", "t", vec![json!({"a": 1})]);
        let before = store.table(&DataSource::new("db", "t")).unwrap();
        store.insert_json("db", "t", vec![json!({"a": 2}), json!({"a": 3})]);

        assert_eq!(before.len(), 1);
        assert_eq!(store.tables("db").unwrap(), vec!["t"]);
        assert!(store.remove_table("db", "t"));
        assert!(store.databases().is_empty());
    }
}
