//! Declarative query model
//!
//! A [`Query`] only describes what to fetch. Executing it, and merging in the
//! registered filter and selection state, is the job of a query executor.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

mod clause;
mod filter;
mod group;
pub mod language;
mod query_group;

pub use clause::{DistanceUnit, LatLon, Operator, SimpleWhereClause, WhereClause, WithinDistanceClause};
pub use filter::{Filter, FilterKey};
pub use group::{GroupByClause, GroupByFunction, GroupByFunctionClause};
pub use query_group::QueryGroup;

/// Field name that makes COUNT count whole records
pub const ALL_FIELDS: &str = "*";

/// A queryable collection, identified by database and table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "databaseName")]
    pub database: String,
    #[serde(rename = "tableName")]
    pub table: String,
}

impl DataSource {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.database.is_empty() {
            return Err(QueryError::EmptyDataSourceName("database"));
        }
        if self.table.is_empty() {
            return Err(QueryError::EmptyDataSourceName("table"));
        }
        Ok(())
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

/// Aggregation functions understood by executors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            _ => Err(QueryError::Parse {
                position: 0,
                message: format!("unknown aggregate function '{}'", s),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateClause {
    pub function: AggregateFunction,
    /// Source field, or [`ALL_FIELDS`]
    pub field: String,
    pub name: String,
}

impl AggregateClause {
    /// Output name used when the caller does not pick one, e.g. `max_salary` or `count_all`
    pub fn generated_name(function: AggregateFunction, field: &str) -> String {
        let field = if field == ALL_FIELDS { "all" } else { field };
        format!("{}_{}", function.name(), field)
    }

    pub fn counts_records(&self) -> bool {
        self.function == AggregateFunction::Count && self.field == ALL_FIELDS
    }
}

/// Which registered filters a query opts out of
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IgnoreFilters {
    #[default]
    None,
    All,
    Keys(BTreeSet<FilterKey>),
}

impl IgnoreFilters {
    pub fn ignores(&self, key: &FilterKey) -> bool {
        match self {
            IgnoreFilters::None => false,
            IgnoreFilters::All => true,
            IgnoreFilters::Keys(keys) => keys.contains(key),
        }
    }
}

/// Named post-processing step applied to result rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Transform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Query descriptor, built by chaining value-returning calls
///
/// ```
/// use neon_core::query::{AggregateFunction, Query, SortDirection, WhereClause};
///
/// let query = Query::new()
///     .select_from("acceptanceTest", "records")
///     .where_clause(WhereClause::eq("state", "DC"))
///     .group_by(["city"])
///     .aggregate_as(AggregateFunction::Sum, "salary", "salary_sum")
///     .sort_by([("city", SortDirection::Ascending)])
///     .limit(10);
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
    pub group_by_clauses: Vec<GroupByClause>,
    pub aggregates: Vec<AggregateClause>,
    pub sort_clauses: Vec<SortClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    pub is_distinct: bool,
    pub ignore_filters: IgnoreFilters,
    pub selection_only: bool,
    pub transforms: Vec<Transform>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data source; required before the query can be executed
    pub fn select_from(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        self.data_source = Some(DataSource::new(database, table));
        self
    }

    /// Restricts the projection. Aggregate outputs are always kept.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        self.where_clause = Some(clause);
        self
    }

    /// Appends grouping keys; raw fields and function clauses may be mixed
    pub fn group_by<I, G>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupByClause>,
    {
        self.group_by_clauses.extend(clauses.into_iter().map(Into::into));
        self
    }

    /// Appends an aggregate whose output name is generated
    pub fn aggregate(self, function: AggregateFunction, field: impl Into<String>) -> Self {
        let field = field.into();
        let name = AggregateClause::generated_name(function, &field);
        self.aggregate_as(function, field, name)
    }

    pub fn aggregate_as(
        mut self,
        function: AggregateFunction,
        field: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.aggregates.push(AggregateClause {
            function,
            field: field.into(),
            name: name.into(),
        });
        self
    }

    /// Appends sort keys, applied in the order given
    pub fn sort_by<I, S>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = (S, SortDirection)>,
        S: Into<String>,
    {
        self.sort_clauses.extend(clauses.into_iter().map(|(field, direction)| SortClause {
            field: field.into(),
            direction,
        }));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.is_distinct = true;
        self
    }

    /// Ignores every registered filter
    pub fn ignore_filters(mut self) -> Self {
        self.ignore_filters = IgnoreFilters::All;
        self
    }

    /// Ignores only the named filters; all others still apply
    pub fn ignore_filter_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FilterKey>,
    {
        self.ignore_filters = IgnoreFilters::Keys(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the result to the current selection instead of the filters
    pub fn selection_only(mut self) -> Self {
        self.selection_only = true;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by_clauses.is_empty() || !self.aggregates.is_empty()
    }

    /// Checks everything that can be checked without an executor
    pub fn validate(&self) -> Result<(), QueryError> {
        let data_source = self.data_source.as_ref().ok_or(QueryError::MissingDataSource)?;
        data_source.validate()?;

        if self.fields.iter().any(|f| f.is_empty()) {
            return Err(QueryError::EmptyField("field selection"));
        }
        if let Some(clause) = &self.where_clause {
            clause.validate()?;
        }
        for clause in &self.group_by_clauses {
            clause.validate()?;
        }
        if self.aggregates.iter().any(|a| a.field.is_empty() || a.name.is_empty()) {
            return Err(QueryError::EmptyField("aggregate"));
        }
        if self.sort_clauses.iter().any(|s| s.field.is_empty()) {
            return Err(QueryError::EmptyField("sort"));
        }
        if self.limit == Some(0) {
            return Err(QueryError::ZeroLimit);
        }
        if self.transforms.iter().any(|t| t.name.is_empty()) {
            return Err(QueryError::EmptyTransformName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_query() -> Query {
        Query::new().select_from("acceptanceTest", "records")
    }

    #[test]
    fn test_missing_data_source_fails_fast() {
        assert_eq!(Query::new().validate(), Err(QueryError::MissingDataSource));
        assert!(base_query().validate().is_ok());
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert_eq!(base_query().limit(0).validate(), Err(QueryError::ZeroLimit));
        assert!(base_query().limit(1).offset(0).validate().is_ok());
    }

    #[test]
    fn test_generated_aggregate_names_are_stable() {
        let first = base_query().aggregate(AggregateFunction::Max, "salary");
        let second = base_query().aggregate(AggregateFunction::Max, "salary");
        assert_eq!(first.aggregates[0].name, "max_salary");
        assert_eq!(first.aggregates, second.aggregates);

        let counted = base_query().aggregate(AggregateFunction::Count, ALL_FIELDS);
        assert_eq!(counted.aggregates[0].name, "count_all");
        assert!(counted.aggregates[0].counts_records());
    }

    #[test]
    fn test_call_order_is_preserved() {
        let query = base_query()
            .group_by(["state"])
            .group_by([GroupByFunctionClause::new(GroupByFunction::Month, "hiredate", "hire_month")])
            .sort_by([("state", SortDirection::Ascending), ("hire_month", SortDirection::Descending)]);

        let names: Vec<_> = query.group_by_clauses.iter().map(|g| g.output_name()).collect();
        assert_eq!(names, vec!["state", "hire_month"]);
        assert_eq!(query.sort_clauses[1].direction, SortDirection::Descending);
    }

    #[test]
    fn test_builder_values_are_independent() {
        let base = base_query();
        let filtered = base.clone().where_clause(WhereClause::eq("state", "DC"));
        assert!(base.where_clause.is_none());
        assert!(filtered.where_clause.is_some());
    }

    #[test]
    fn test_ignore_specific_keys() {
        let query = base_query().ignore_filter_keys(["a", "b"]);
        assert!(query.ignore_filters.ignores(&FilterKey::from("a")));
        assert!(!query.ignore_filters.ignores(&FilterKey::from("c")));
        assert!(base_query().ignore_filters().ignore_filters.ignores(&FilterKey::from("c")));
    }

    #[test]
    fn test_query_round_trips_through_json() {
        let query = base_query()
            .where_clause(WhereClause::eq("state", "DC"))
            .aggregate_as(AggregateFunction::Count, ALL_FIELDS, "counter")
            .selection_only();
        let text = serde_json::to_string(&query).unwrap();
        let decoded: Query = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, query);
    }
}
