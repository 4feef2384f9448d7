//! Core abstractions for the dashboard query and filter layer
//!
//! This crate provides the declarative query model, the keyed filter and
//! selection registry, the topic event bus and the per-widget messenger that
//! ties them together. Executing queries is left to `neon-data`.

pub mod context;
pub mod error;
pub mod events;
pub mod messenger;
pub mod query;
pub mod registry;
pub mod widget;

// Re-export commonly used types
pub use context::NeonContext;
pub use error::{QueryError, RegistryError};
pub use events::{topics, Event, EventBus, EventHandler, Subscription};
pub use messenger::{Messenger, MessengerEvents, MessengerId};
pub use query::{
    AggregateClause, AggregateFunction, DataSource, Filter, FilterKey, GroupByClause, GroupByFunction,
    IgnoreFilters, Operator, Query, QueryGroup, SortDirection, Transform, WhereClause,
};
pub use registry::{EffectiveFilter, FilterEvent, FilterEventType, FilterRegistry, FilterStore, Partition};
