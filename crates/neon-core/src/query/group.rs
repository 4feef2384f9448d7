//! Group-by clauses, including keys derived from temporal fields

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Functions that derive a grouping key from a date field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupByFunction {
    Year,
    Month,
    DayOfMonth,
    DayOfWeek,
    Hour,
    Minute,
    Second,
}

impl GroupByFunction {
    pub const ALL: [GroupByFunction; 7] = [
        GroupByFunction::Year,
        GroupByFunction::Month,
        GroupByFunction::DayOfMonth,
        GroupByFunction::DayOfWeek,
        GroupByFunction::Hour,
        GroupByFunction::Minute,
        GroupByFunction::Second,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GroupByFunction::Year => "year",
            GroupByFunction::Month => "month",
            GroupByFunction::DayOfMonth => "dayOfMonth",
            GroupByFunction::DayOfWeek => "dayOfWeek",
            GroupByFunction::Hour => "hour",
            GroupByFunction::Minute => "minute",
            GroupByFunction::Second => "second",
        }
    }
}

impl fmt::Display for GroupByFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupByFunction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| *c != '_').collect();
        GroupByFunction::ALL
            .iter()
            .copied()
            .find(|func| func.name().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| QueryError::Parse {
                position: 0,
                message: format!("unknown group by function '{}'", s),
            })
    }
}

/// A grouping key computed by applying `function` to `field`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByFunctionClause {
    pub function: GroupByFunction,
    pub field: String,
    pub name: String,
}

impl GroupByFunctionClause {
    pub fn new(function: GroupByFunction, field: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            function,
            field: field.into(),
            name: name.into(),
        }
    }
}

/// Either a raw field or a derived key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GroupByClause {
    Field { field: String },
    Function(GroupByFunctionClause),
}

impl GroupByClause {
    /// Name of the key in the grouped output row
    pub fn output_name(&self) -> &str {
        match self {
            GroupByClause::Field { field } => field,
            GroupByClause::Function(clause) => &clause.name,
        }
    }

    /// Field read from the source records
    pub fn source_field(&self) -> &str {
        match self {
            GroupByClause::Field { field } => field,
            GroupByClause::Function(clause) => &clause.field,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), QueryError> {
        if self.source_field().is_empty() || self.output_name().is_empty() {
            return Err(QueryError::EmptyField("group by"));
        }
        Ok(())
    }
}

impl From<&str> for GroupByClause {
    fn from(field: &str) -> Self {
        GroupByClause::Field { field: field.to_string() }
    }
}

impl From<String> for GroupByClause {
    fn from(field: String) -> Self {
        GroupByClause::Field { field }
    }
}

impl From<GroupByFunctionClause> for GroupByClause {
    fn from(clause: GroupByFunctionClause) -> Self {
        GroupByClause::Function(clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names_parse_loosely() {
        assert_eq!("MONTH".parse::<GroupByFunction>().unwrap(), GroupByFunction::Month);
        assert_eq!("day_of_week".parse::<GroupByFunction>().unwrap(), GroupByFunction::DayOfWeek);
        assert!("fortnight".parse::<GroupByFunction>().is_err());
    }

    #[test]
    fn test_output_and_source_names() {
        let raw = GroupByClause::from("state");
        assert_eq!(raw.output_name(), "state");

        let derived = GroupByClause::from(GroupByFunctionClause::new(
            GroupByFunction::Month,
            "hiredate",
            "hire_month",
        ));
        assert_eq!(derived.output_name(), "hire_month");
        assert_eq!(derived.source_field(), "hiredate");
    }
}
