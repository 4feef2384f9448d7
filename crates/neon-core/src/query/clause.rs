//! Where clauses: comparisons, boolean combinators and geographic radius tests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// Comparison operators for simple where clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notin")]
    NotIn,
}

impl Operator {
    /// All operators, in the order a filter builder offers them
    pub const ALL: [Operator; 8] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::In,
        Operator::NotIn,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "in",
            Operator::NotIn => "notin",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.symbol().eq_ignore_ascii_case(s))
            .ok_or_else(|| QueryError::Parse {
                position: 0,
                message: format!("unknown operator '{}'", s),
            })
    }
}

/// Units accepted by `WithinDistance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Meter,
    #[serde(rename = "km")]
    Kilometer,
    Mile,
}

impl DistanceUnit {
    /// Length of one unit in meters
    pub fn meters(&self) -> f64 {
        match self {
            DistanceUnit::Meter => 1.0,
            DistanceUnit::Kilometer => 1_000.0,
            DistanceUnit::Mile => 1_609.344,
        }
    }
}

/// A point on the globe, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A single `field <operator> value` comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleWhereClause {
    pub field: String,
    pub operator: Operator,
    /// `Value::Null` compares against null-or-missing
    pub value: Value,
}

/// Matches records whose location field lies within `distance` of `center`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithinDistanceClause {
    pub location_field: String,
    pub center: LatLon,
    pub distance: f64,
    pub distance_unit: DistanceUnit,
}

impl WithinDistanceClause {
    pub fn distance_in_meters(&self) -> f64 {
        self.distance * self.distance_unit.meters()
    }
}

/// Boolean expression tree applied to records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WhereClause {
    #[serde(rename = "where")]
    Simple(SimpleWhereClause),
    And { clauses: Vec<WhereClause> },
    Or { clauses: Vec<WhereClause> },
    WithinDistance(WithinDistanceClause),
}

impl WhereClause {
    /// `field <operator> value`
    pub fn compare(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        WhereClause::Simple(SimpleWhereClause {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Ne, value)
    }

    /// Conjunction of the given clauses
    pub fn and(clauses: impl IntoIterator<Item = WhereClause>) -> Self {
        WhereClause::And {
            clauses: clauses.into_iter().collect(),
        }
    }

    /// Disjunction of the given clauses
    pub fn or(clauses: impl IntoIterator<Item = WhereClause>) -> Self {
        WhereClause::Or {
            clauses: clauses.into_iter().collect(),
        }
    }

    pub fn within_distance(
        location_field: impl Into<String>,
        center: LatLon,
        distance: f64,
        distance_unit: DistanceUnit,
    ) -> Self {
        WhereClause::WithinDistance(WithinDistanceClause {
            location_field: location_field.into(),
            center,
            distance,
            distance_unit,
        })
    }

    /// Every field name referenced anywhere in the tree
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            WhereClause::Simple(simple) => out.push(&simple.field),
            WhereClause::WithinDistance(within) => out.push(&within.location_field),
            WhereClause::And { clauses } | WhereClause::Or { clauses } => {
                for clause in clauses {
                    clause.collect_fields(out);
                }
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), QueryError> {
        if self.fields().iter().any(|f| f.is_empty()) {
            return Err(QueryError::EmptyField("where clause"));
        }
        Ok(())
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClause::Simple(simple) => {
                write!(f, "{} {} {}", simple.field, simple.operator, simple.value)
            }
            WhereClause::WithinDistance(within) => write!(
                f,
                "{} within {} {:?} of ({}, {})",
                within.location_field,
                within.distance,
                within.distance_unit,
                within.center.latitude,
                within.center.longitude
            ),
            WhereClause::And { clauses } | WhereClause::Or { clauses } => {
                let joiner = if matches!(self, WhereClause::And { .. }) { " and " } else { " or " };
                let parts: Vec<String> = clauses.iter().map(|c| format!("({})", c)).collect();
                f.write_str(&parts.join(joiner))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("NOTIN".parse::<Operator>().unwrap(), Operator::NotIn);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_fields_are_collected_from_nested_clauses() {
        let clause = WhereClause::and([
            WhereClause::compare("salary", Operator::Ge, 100000),
            WhereClause::or([WhereClause::eq("state", "VA"), WhereClause::eq("state", "DC")]),
        ]);
        assert_eq!(clause.fields(), vec!["salary", "state", "state"]);
    }

    #[test]
    fn test_null_comparison_serializes_as_null() {
        let clause = WhereClause::eq("lastname", Value::Null);
        let encoded = serde_json::to_value(&clause).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "where", "field": "lastname", "operator": "=", "value": null})
        );
    }

    #[test]
    fn test_distance_units() {
        let clause = WithinDistanceClause {
            location_field: "location".into(),
            center: LatLon::new(11.95, 19.5),
            distance: 2.0,
            distance_unit: DistanceUnit::Kilometer,
        };
        assert_eq!(clause.distance_in_meters(), 2_000.0);
    }
}
