use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::messenger::MessengerId;
use crate::query::{Filter, FilterKey};

/// The two independent keyed partitions kept per data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Filters,
    Selection,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Filters => f.write_str("filters"),
            Partition::Selection => f.write_str("selection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterEventType {
    Add,
    Replace,
    Remove,
}

/// Acknowledgement of a registry mutation, also broadcast to every messenger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterEvent {
    #[serde(rename = "type")]
    pub event_type: FilterEventType,
    pub partition: Partition,
    pub key: FilterKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_filter: Option<Filter>,
    /// Messenger that requested the mutation
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MessengerId>,
}

impl FilterEvent {
    pub(crate) fn new(event_type: FilterEventType, partition: Partition, key: FilterKey) -> Self {
        Self {
            event_type,
            partition,
            key,
            added_filter: None,
            removed_filter: None,
            source: None,
        }
    }

    pub(crate) fn added(mut self, filter: Filter) -> Self {
        self.added_filter = Some(filter);
        self
    }

    pub(crate) fn removed(mut self, filter: Option<Filter>) -> Self {
        self.removed_filter = filter;
        self
    }

    /// Whether the mutation changed registry state
    pub fn changed_state(&self) -> bool {
        self.added_filter.is_some() || self.removed_filter.is_some()
    }
}

impl Event for FilterEvent {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::WhereClause;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let before = Filter::select_from("acceptanceTest", "records").where_clause(WhereClause::eq("state", "VA"));
        let after = Filter::select_from("acceptanceTest", "records").where_clause(WhereClause::eq("state", "DC"));
        let mut event = FilterEvent::new(FilterEventType::Replace, Partition::Filters, "stateFilter".into())
            .added(after)
            .removed(Some(before));

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], json!("REPLACE"));
        assert_eq!(encoded["partition"], json!("filters"));
        assert_eq!(encoded["key"], json!("stateFilter"));
        assert_eq!(encoded["addedFilter"]["whereClause"]["value"], json!("DC"));
        assert_eq!(encoded["removedFilter"]["whereClause"]["value"], json!("VA"));
        assert!(encoded.get("_source").is_none());

        let source = MessengerId::new();
        event.source = Some(source);
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["_source"], serde_json::to_value(source).unwrap());
        assert_eq!(serde_json::from_value::<FilterEvent>(encoded).unwrap(), event);
    }

    #[test]
    fn test_no_op_remove_changes_nothing() {
        let event = FilterEvent::new(FilterEventType::Remove, Partition::Selection, "gone".into()).removed(None);
        assert!(!event.changed_state());
    }
}
