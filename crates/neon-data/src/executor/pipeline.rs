//! Row pipeline of the in-memory executor
//!
//! Stages run in a fixed order: restrict, group and aggregate, sort, project,
//! distinct, offset, limit. Transforms are applied by the caller afterwards.

use ahash::AHashSet;
use chrono::{Datelike, Timelike};
use indexmap::IndexMap;
use serde_json::Value;

use neon_core::query::{AggregateClause, GroupByClause, GroupByFunction, SortClause, ALL_FIELDS};
use neon_core::{AggregateFunction, DataSource, EffectiveFilter, Query, SortDirection};

use super::predicate::matches;
use super::value::{compare_fields, compare_values, field_value, parse_timestamp};
use crate::store::Row;
use crate::DataError;

pub(crate) fn run(
    table: &[Row],
    data_source: &DataSource,
    query: &Query,
    restriction: &EffectiveFilter,
    id_field: &str,
) -> Result<Vec<Row>, DataError> {
    check_fields_exist(table, data_source, query)?;

    let selected: Vec<&Row> = match restriction {
        EffectiveFilter::Nothing => Vec::new(),
        EffectiveFilter::Clauses(clauses) => table
            .iter()
            .filter(|row| query.where_clause.as_ref().map_or(true, |clause| matches(row, clause)))
            .filter(|row| clauses.iter().all(|clause| matches(row, clause)))
            .collect(),
    };

    let mut rows = if query.is_grouped() {
        group(&selected, query)
    } else {
        selected.into_iter().cloned().collect()
    };

    sort(&mut rows, &query.sort_clauses);

    if query.is_grouped() {
        rows = rows.into_iter().map(|row| project_group(row, query)).collect();
    } else {
        let keep_id = !query.is_distinct;
        rows = rows
            .into_iter()
            .map(|row| project(row, &query.fields, id_field, keep_id))
            .collect();
    }
    if query.is_distinct {
        rows = distinct(rows)?;
    }

    Ok(rows
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect())
}

/// Grouping and aggregate fields must occur in at least one row of a non-empty table
fn check_fields_exist(table: &[Row], data_source: &DataSource, query: &Query) -> Result<(), DataError> {
    if table.is_empty() {
        return Ok(());
    }
    let group_fields = query.group_by_clauses.iter().map(GroupByClause::source_field);
    let aggregate_fields = query
        .aggregates
        .iter()
        .filter(|aggregate| aggregate.field != ALL_FIELDS)
        .map(|aggregate| aggregate.field.as_str());

    for field in group_fields.chain(aggregate_fields) {
        if !table.iter().any(|row| field_value(row, field).is_some()) {
            return Err(DataError::UnknownField {
                database: data_source.database.clone(),
                table: data_source.table.clone(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn group(rows: &[&Row], query: &Query) -> Vec<Row> {
    let mut groups: IndexMap<String, (Vec<Value>, Vec<&Row>)> = IndexMap::new();
    if query.group_by_clauses.is_empty() {
        // an ungrouped aggregate always yields exactly one row
        groups.insert(String::new(), (Vec::new(), rows.to_vec()));
    } else {
        for row in rows {
            let key: Vec<Value> = query.group_by_clauses.iter().map(|clause| group_value(row, clause)).collect();
            let fingerprint = Value::Array(key.clone()).to_string();
            groups.entry(fingerprint).or_insert_with(|| (key, Vec::new())).1.push(*row);
        }
    }

    groups
        .into_values()
        .map(|(key, members)| {
            let mut out = Row::new();
            for (clause, value) in query.group_by_clauses.iter().zip(key) {
                out.insert(clause.output_name().to_string(), value);
            }
            for aggregate in &query.aggregates {
                out.insert(aggregate.name.clone(), aggregate_value(&members, aggregate));
            }
            out
        })
        .collect()
}

fn group_value(row: &Row, clause: &GroupByClause) -> Value {
    let raw = field_value(row, clause.source_field()).cloned().unwrap_or(Value::Null);
    match clause {
        GroupByClause::Field { .. } => raw,
        GroupByClause::Function(function) => parse_timestamp(&raw)
            .map(|ts| {
                let part = match function.function {
                    GroupByFunction::Year => ts.year() as i64,
                    GroupByFunction::Month => ts.month() as i64,
                    GroupByFunction::DayOfMonth => ts.day() as i64,
                    GroupByFunction::DayOfWeek => ts.weekday().number_from_sunday() as i64,
                    GroupByFunction::Hour => ts.hour() as i64,
                    GroupByFunction::Minute => ts.minute() as i64,
                    GroupByFunction::Second => ts.second() as i64,
                };
                Value::from(part)
            })
            .unwrap_or(Value::Null),
    }
}

fn aggregate_value(rows: &[&Row], aggregate: &AggregateClause) -> Value {
    if aggregate.counts_records() {
        return Value::from(rows.len());
    }
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| field_value(row, &aggregate.field))
        .filter(|value| !value.is_null())
        .collect();

    match aggregate.function {
        AggregateFunction::Count => Value::from(values.len()),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFunction::Min => values
            .into_iter()
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateFunction::Max => values
            .into_iter()
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// Integer sum while every input is an integer and nothing overflows, float sum otherwise
fn sum(values: &[&Value]) -> Value {
    let integers: Option<i64> = values
        .iter()
        .filter(|v| v.is_number())
        .try_fold(0i64, |acc, v| v.as_i64().and_then(|n| acc.checked_add(n)));
    match integers {
        Some(total) => Value::from(total),
        None => Value::from(values.iter().filter_map(|v| v.as_f64()).sum::<f64>()),
    }
}

fn sort(rows: &mut [Row], clauses: &[SortClause]) {
    if clauses.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        clauses
            .iter()
            .map(|clause| {
                let ordering = compare_fields(a, b, &clause.field);
                match clause.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Group keys named in `fields` (all of them without a selection) plus every aggregate output
fn project_group(row: Row, query: &Query) -> Row {
    let keep_all_keys = query.fields.is_empty() || query.fields.iter().any(|f| f == ALL_FIELDS);
    row.into_iter()
        .filter(|(name, _)| {
            keep_all_keys
                || query.fields.iter().any(|f| f == name)
                || query.aggregates.iter().any(|aggregate| aggregate.name == *name)
        })
        .collect()
}

/// Listed fields in listed order; the id field leads unless `keep_id` is off
fn project(row: Row, fields: &[String], id_field: &str, keep_id: bool) -> Row {
    let everything = fields.is_empty() || fields.iter().any(|f| f == ALL_FIELDS);
    if everything {
        if keep_id {
            return row;
        }
        return row.into_iter().filter(|(name, _)| name != id_field).collect();
    }

    let mut out = Row::new();
    if keep_id {
        if let Some(id) = row.get(id_field) {
            out.insert(id_field.to_string(), id.clone());
        }
    }
    for field in fields {
        if let Some(value) = field_value(&row, field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

fn distinct(rows: Vec<Row>) -> Result<Vec<Row>, DataError> {
    let mut seen = AHashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if seen.insert(serde_json::to_string(&row)?) {
            out.push(row);
        }
    }
    Ok(out)
}
