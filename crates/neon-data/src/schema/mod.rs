use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::value::parse_timestamp_str;
use crate::store::Row;

/// Inferred type facets of one field; facets are not mutually exclusive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub column_name: String,
    pub numeric: bool,
    pub logical: bool,
    pub temporal: bool,
    pub array: bool,
    pub object: bool,
    pub text: bool,
    /// More than one non-null kind was seen
    pub heterogeneous: bool,
    /// Null or missing in at least one sampled row
    pub nullable: bool,
}

impl ColumnMetadata {
    fn new(column_name: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            ..Self::default()
        }
    }

    fn observe(&mut self, value: &Value) {
        match value {
            Value::Null => self.nullable = true,
            Value::Bool(_) => self.logical = true,
            Value::Number(_) => self.numeric = true,
            Value::String(text) if parse_timestamp_str(text).is_some() => self.temporal = true,
            Value::String(_) => self.text = true,
            Value::Array(_) => self.array = true,
            Value::Object(_) => self.object = true,
        }
    }

    fn kinds(&self) -> usize {
        [self.numeric, self.logical, self.temporal, self.text, self.array, self.object]
            .into_iter()
            .filter(|facet| *facet)
            .count()
    }
}

/// Schema detector for analyzing sampled rows
pub struct SchemaDetector {
    sample_size: usize,
}

impl SchemaDetector {
    /// Create a new schema detector
    pub fn new() -> Self {
        Self { sample_size: 1000 }
    }

    /// Set the sample size for detection
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    /// Column facets for the first `sample_size` rows, ordered by first appearance
    pub fn detect(&self, rows: &[Row]) -> Vec<ColumnMetadata> {
        let sample = &rows[..rows.len().min(self.sample_size)];
        let mut columns: Vec<ColumnMetadata> = Vec::new();
        let mut positions: AHashMap<&str, usize> = AHashMap::new();
        // rows seen per column, to spot rows where it is missing
        let mut seen_in: Vec<usize> = Vec::new();

        for row in sample {
            for (name, value) in row {
                let index = *positions.entry(name.as_str()).or_insert_with(|| {
                    columns.push(ColumnMetadata::new(name));
                    seen_in.push(0);
                    columns.len() - 1
                });
                columns[index].observe(value);
                seen_in[index] += 1;
            }
        }

        for (column, seen) in columns.iter_mut().zip(seen_in) {
            if seen < sample.len() {
                column.nullable = true;
            }
            column.heterogeneous = column.kinds() > 1;
        }
        columns
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Every field name of `rows`, ordered by first appearance
pub fn field_names(rows: &[Row]) -> Vec<String> {
    let mut seen = ahash::AHashSet::new();
    let mut names = Vec::new();
    for row in rows {
        for name in row.keys() {
            if seen.insert(name.as_str()) {
                names.push(name.clone());
            }
        }
    }
    names
}
