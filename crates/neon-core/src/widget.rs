//! Helpers shared by widget controllers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::query::{Filter, FilterKey, Operator, WhereClause};

/// Unique id for one widget instance, usable as its filter key
pub fn instance_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// One editable `field operator value` line of a filter table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRow {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl FilterRow {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn to_clause(&self) -> WhereClause {
        WhereClause::compare(self.field.clone(), self.operator, self.value.clone())
    }
}

/// Rows of a filter-builder widget, compiled into a single filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTable {
    filter_key: FilterKey,
    rows: Vec<FilterRow>,
}

impl FilterTable {
    pub fn new(filter_key: impl Into<FilterKey>) -> Self {
        Self {
            filter_key: filter_key.into(),
            rows: Vec::new(),
        }
    }

    pub fn filter_key(&self) -> &FilterKey {
        &self.filter_key
    }

    pub fn operator_options() -> &'static [Operator] {
        &Operator::ALL
    }

    pub fn rows(&self) -> &[FilterRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_row(&mut self, row: FilterRow) {
        self.rows.push(row);
    }

    pub fn get_row(&self, index: usize) -> Option<&FilterRow> {
        self.rows.get(index)
    }

    /// Removes and returns the row at `index`, if any
    pub fn remove_row(&mut self, index: usize) -> Option<FilterRow> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    /// Puts `row` at `index`; an index past the end appends
    pub fn set_row(&mut self, index: usize, row: FilterRow) -> Option<FilterRow> {
        match self.rows.get_mut(index) {
            Some(slot) => Some(std::mem::replace(slot, row)),
            None => {
                self.rows.push(row);
                None
            }
        }
    }

    /// Puts `row` back at `index`, shifting later rows
    pub fn insert_row(&mut self, index: usize, row: FilterRow) {
        let index = index.min(self.rows.len());
        self.rows.insert(index, row);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Filter on `database.table` matching the AND (or OR) of every row
    pub fn build_filter(&self, database: &str, table: &str, and_clauses: bool) -> Filter {
        let filter = Filter::select_from(database, table);
        let mut clauses: Vec<WhereClause> = self.rows.iter().map(FilterRow::to_clause).collect();
        match clauses.len() {
            0 => filter,
            1 => filter.where_clause(clauses.remove(0)),
            _ if and_clauses => filter.where_clause(WhereClause::and(clauses)),
            _ => filter.where_clause(WhereClause::or(clauses)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FilterTable {
        let mut table = FilterTable::new("filterBuilder-1");
        table.add_row(FilterRow::new("state", Operator::Eq, "DC"));
        table.add_row(FilterRow::new("salary", Operator::Gt, 85000));
        table
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = instance_id("heatMap");
        let b = instance_id("heatMap");
        assert!(a.starts_with("heatMap-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_build_filter_joins_rows() {
        let table = table();
        let and = table.build_filter("acceptanceTest", "records", true);
        assert_eq!(
            and.where_clause,
            Some(WhereClause::and([
                WhereClause::eq("state", "DC"),
                WhereClause::compare("salary", Operator::Gt, 85000),
            ]))
        );
        let or = table.build_filter("acceptanceTest", "records", false);
        assert!(matches!(or.where_clause, Some(WhereClause::Or { .. })));
    }

    #[test]
    fn test_empty_table_builds_unrestricted_filter() {
        let filter = FilterTable::new("k").build_filter("acceptanceTest", "records", true);
        assert!(filter.where_clause.is_none());
    }

    #[test]
    fn test_row_editing() {
        let mut table = table();
        let removed = table.remove_row(0).unwrap();
        assert_eq!(removed.field, "state");
        assert!(table.remove_row(5).is_none());

        table.insert_row(0, removed.clone());
        assert_eq!(table.get_row(0), Some(&removed));

        let previous = table.set_row(1, FilterRow::new("city", Operator::Ne, "Norfolk"));
        assert_eq!(previous.map(|r| r.field), Some("salary".to_string()));
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
    }
}
