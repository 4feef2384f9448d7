use geo::{HaversineDistance, Point};
use serde_json::Value;

use neon_core::query::{LatLon, SimpleWhereClause, WithinDistanceClause};
use neon_core::{Operator, WhereClause};

use super::value::{compare_values, field_value, is_null_or_missing, same_kind, values_equal};
use crate::store::Row;

/// Whether `row` satisfies `clause`
pub(crate) fn matches(row: &Row, clause: &WhereClause) -> bool {
    match clause {
        WhereClause::Simple(simple) => matches_simple(row, simple),
        WhereClause::And { clauses } => clauses.iter().all(|c| matches(row, c)),
        WhereClause::Or { clauses } => clauses.iter().any(|c| matches(row, c)),
        WhereClause::WithinDistance(within) => matches_within(row, within),
    }
}

fn matches_simple(row: &Row, clause: &SimpleWhereClause) -> bool {
    if clause.value.is_null() {
        let missing = is_null_or_missing(row, &clause.field);
        return match clause.operator {
            Operator::Eq | Operator::In => missing,
            Operator::Ne | Operator::NotIn => !missing,
            // ranges never match null
            _ => false,
        };
    }
    let actual = field_value(row, &clause.field).unwrap_or(&Value::Null);
    match clause.operator {
        Operator::Eq => equals(actual, &clause.value),
        Operator::Ne => !equals(actual, &clause.value),
        Operator::In => contains(&clause.value, actual),
        Operator::NotIn => !contains(&clause.value, actual),
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            // only like compares with like
            if actual.is_null() || !same_kind(actual, &clause.value) {
                return false;
            }
            let ordering = compare_values(actual, &clause.value);
            match clause.operator {
                Operator::Lt => ordering.is_lt(),
                Operator::Le => ordering.is_le(),
                Operator::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
    }
}

/// Equality where an array field matches any of its elements
fn equals(actual: &Value, expected: &Value) -> bool {
    if values_equal(actual, expected) {
        return true;
    }
    match actual {
        Value::Array(items) if !expected.is_array() => items.iter().any(|item| values_equal(item, expected)),
        _ => false,
    }
}

fn contains(candidates: &Value, actual: &Value) -> bool {
    match candidates {
        Value::Array(candidates) => candidates.iter().any(|candidate| equals(actual, candidate)),
        single => equals(actual, single),
    }
}

fn matches_within(row: &Row, clause: &WithinDistanceClause) -> bool {
    let Some(location) = field_value(row, &clause.location_field).and_then(location_of) else {
        return false;
    };
    let center = Point::new(clause.center.longitude, clause.center.latitude);
    let point = Point::new(location.longitude, location.latitude);
    point.haversine_distance(&center) <= clause.distance_in_meters()
}

/// Position stored as `[lon, lat]`, `{lat, lon}`, `{latitude, longitude}` or a GeoJSON point
pub(crate) fn location_of(value: &Value) -> Option<LatLon> {
    match value {
        Value::Array(pair) if pair.len() == 2 => Some(LatLon::new(pair[1].as_f64()?, pair[0].as_f64()?)),
        Value::Object(object) => {
            if let Some(coordinates) = object.get("coordinates") {
                return location_of(coordinates);
            }
            let latitude = object.get("lat").or_else(|| object.get("latitude"))?.as_f64()?;
            let longitude = object
                .get("lon")
                .or_else(|| object.get("lng"))
                .or_else(|| object.get("longitude"))?
                .as_f64()?;
            Some(LatLon::new(latitude, longitude))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neon_core::query::DistanceUnit;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(row) => row,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_null_matches_missing_fields() {
        let missing = row(json!({"firstname": "Tom"}));
        let null = row(json!({"firstname": "Bob", "lastname": null}));
        let present = row(json!({"firstname": "Ann", "lastname": "White"}));
        let is_null = WhereClause::eq("lastname", Value::Null);
        let not_null = WhereClause::ne("lastname", Value::Null);

        assert!(matches(&missing, &is_null) && matches(&null, &is_null));
        assert!(!matches(&present, &is_null));
        assert!(matches(&present, &not_null));
        assert!(!matches(&missing, &not_null) && !matches(&null, &not_null));
    }

    #[test]
    fn test_ranges_skip_other_kinds() {
        let text = row(json!({"salary": "lots"}));
        let number = row(json!({"salary": 90000}));
        let gt = WhereClause::compare("salary", Operator::Gt, 85000);
        assert!(!matches(&text, &gt));
        assert!(matches(&number, &gt));
        assert!(!matches(&row(json!({})), &WhereClause::compare("salary", Operator::Lt, 1)));
    }

    #[test]
    fn test_in_and_array_fields() {
        let r = row(json!({"state": "MD", "tags": ["manager", "remote"]}));
        assert!(matches(&r, &WhereClause::compare("state", Operator::In, json!(["MD", "DC"]))));
        assert!(matches(&r, &WhereClause::compare("state", Operator::NotIn, json!(["VA", "DC"]))));
        assert!(matches(&r, &WhereClause::eq("tags", "remote")));
        assert!(!matches(&r, &WhereClause::eq("tags", "intern")));
    }

    #[test]
    fn test_within_distance_accepts_location_shapes() {
        let center = LatLon::new(11.95, 19.5);
        let clause = WhereClause::within_distance("location", center, 35.0, DistanceUnit::Mile);
        for location in [
            json!([19.6, 12.0]),
            json!({"lat": 12.0, "lon": 19.6}),
            json!({"type": "Point", "coordinates": [19.6, 12.0]}),
        ] {
            assert!(matches(&row(json!({ "location": location })), &clause));
        }
        assert!(!matches(&row(json!({"location": [-77.04, 38.9]})), &clause));
        assert!(!matches(&row(json!({"location": "nowhere"})), &clause));
    }
}
