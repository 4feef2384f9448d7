use serde::{Deserialize, Serialize};

use super::{IgnoreFilters, Query};
use crate::error::QueryError;

/// Ordered batch of queries whose results are concatenated in submission order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryGroup {
    pub queries: Vec<Query>,
    pub ignore_filters: IgnoreFilters,
    pub selection_only: bool,
}

impl QueryGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    pub fn ignore_filters(mut self) -> Self {
        self.ignore_filters = IgnoreFilters::All;
        self
    }

    pub fn selection_only(mut self) -> Self {
        self.selection_only = true;
        self
    }

    /// Member queries with the group's flags folded in
    ///
    /// A group-level ignore replaces the member's own setting; selection-only
    /// applies if either the group or the member asks for it.
    pub fn effective_queries(&self) -> Vec<Query> {
        self.queries
            .iter()
            .cloned()
            .map(|mut query| {
                if self.ignore_filters != IgnoreFilters::None {
                    query.ignore_filters = self.ignore_filters.clone();
                }
                query.selection_only |= self.selection_only;
                query
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.queries.is_empty() {
            return Err(QueryError::EmptyGroup);
        }
        self.queries.iter().try_for_each(Query::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::WhereClause;

    fn state_query(state: &str) -> Query {
        Query::new()
            .select_from("acceptanceTest", "records")
            .where_clause(WhereClause::eq("state", state))
    }

    #[test]
    fn test_group_flags_are_inherited() {
        let group = QueryGroup::new()
            .add_query(state_query("VA"))
            .add_query(state_query("MD"))
            .ignore_filters()
            .selection_only();

        let queries = group.effective_queries();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| q.ignore_filters == IgnoreFilters::All && q.selection_only));
        // the group itself keeps its members untouched
        assert!(!group.queries[0].selection_only);
    }

    #[test]
    fn test_member_validation() {
        assert_eq!(QueryGroup::new().validate(), Err(QueryError::EmptyGroup));
        let group = QueryGroup::new().add_query(state_query("VA")).add_query(Query::new());
        assert_eq!(group.validate(), Err(QueryError::MissingDataSource));
    }
}
