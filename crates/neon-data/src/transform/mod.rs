//! Named post-processing steps applied to result rows
//!
//! Transforms are plug-ins: they report failures with `anyhow` and the
//! registry wraps those into [`DataError::Transform`].

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use neon_core::Transform;

use crate::store::Row;
use crate::DataError;

/// A post-processing step over a whole result set
pub trait RowTransform: Send + Sync {
    fn apply(&self, rows: Vec<Row>, params: Option<&Value>) -> anyhow::Result<Vec<Row>>;
}

impl<F> RowTransform for F
where
    F: Fn(Vec<Row>, Option<&Value>) -> anyhow::Result<Vec<Row>> + Send + Sync,
{
    fn apply(&self, rows: Vec<Row>, params: Option<&Value>) -> anyhow::Result<Vec<Row>> {
        self(rows, params)
    }
}

/// Transform loader: maps names used in queries to implementations
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: Arc<RwLock<AHashMap<String, Arc<dyn RowTransform>>>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the transform called `name`
    pub fn register(&self, name: impl Into<String>, transform: impl RowTransform + 'static) {
        self.transforms.write().insert(name.into(), Arc::new(transform));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.read().contains_key(name)
    }

    /// Run `steps` in order over `rows`
    pub fn apply(&self, steps: &[Transform], mut rows: Vec<Row>) -> Result<Vec<Row>, DataError> {
        for step in steps {
            let transform = self
                .transforms
                .read()
                .get(&step.name)
                .cloned()
                .ok_or_else(|| DataError::UnknownTransform(step.name.clone()))?;
            debug!("Applying transform '{}' to {} rows", step.name, rows.len());
            rows = transform
                .apply(rows, step.params.as_ref())
                .map_err(|source| DataError::Transform {
                    name: step.name.clone(),
                    source,
                })?;
        }
        Ok(rows)
    }
}
