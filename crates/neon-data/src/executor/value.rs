//! Ordering and field access over JSON values

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::store::Row;

/// Value of `field`, following dotted paths into nested objects
pub(crate) fn field_value<'a>(row: &'a Row, field: &str) -> Option<&'a Value> {
    if let Some(value) = row.get(field) {
        return Some(value);
    }
    let mut parts = field.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Whether `field` is absent or null
pub(crate) fn is_null_or_missing(row: &Row, field: &str) -> bool {
    field_value(row, field).map_or(true, Value::is_null)
}

/// Strings in RFC 3339 or plain `YYYY-MM-DD[THH:MM:SS]` form
pub(crate) fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Timestamp carried by `value`; numbers are epoch milliseconds
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp_str(text),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Whether two values are of the same kind and so can be range-compared
pub(crate) fn same_kind(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// Total order over JSON values
///
/// Numbers compare numerically and timestamp strings chronologically, ahead
/// of other strings. Values of different kinds order as null < bool < number
/// < string < array < object.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        // timestamps order before plain strings
        (Value::String(x), Value::String(y)) => match (parse_timestamp_str(x), parse_timestamp_str(y)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => x.cmp(y),
        },
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| compare_values(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .len()
            .cmp(&y.len())
            .then_with(|| a.to_string().cmp(&b.to_string())),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Ordering of two rows under optional missing fields; absent sorts like null
pub(crate) fn compare_fields(a: &Row, b: &Row, field: &str) -> Ordering {
    let null = Value::Null;
    compare_values(field_value(a, field).unwrap_or(&null), field_value(b, field).unwrap_or(&null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(compare_values(&json!(9), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert!(values_equal(&json!(1), &json!(1.0)));
    }

    #[test]
    fn test_timestamps_compare_chronologically() {
        let a = json!("2011-10-15T12:00:00Z");
        let b = json!("2011-10-15T08:00:00-05:00");
        assert_eq!(compare_values(&a, &b), Ordering::Less);
        assert!(values_equal(&json!("2012-06-03"), &json!("2012-06-03T00:00:00Z")));
    }

    #[test]
    fn test_mixed_string_columns_sort_consistently() {
        let mut values = vec![
            json!("2012-06-03S"),
            json!("2012-06-03T00:00:00Z"),
            json!("apple"),
            json!("2012-06-03"),
            json!("2011-01-01"),
        ];
        values.sort_by(compare_values);
        assert_eq!(values[0], json!("2011-01-01"));
        assert!(values_equal(&values[1], &values[2]));
        assert_eq!(&values[3..], &[json!("2012-06-03S"), json!("apple")]);
        assert_eq!(compare_values(&json!("2012-06-03"), &json!("2012-06-03S")), Ordering::Less);
        assert_eq!(compare_values(&json!("2012-06-03S"), &json!("2012-06-03T00:00:00Z")), Ordering::Greater);
    }

    #[test]
    fn test_kinds_are_ranked() {
        let ordered = [json!(null), json!(false), json!(-5), json!("a"), json!([1]), json!({"a": 1})];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less, "{:?}", pair);
        }
    }

    #[test]
    fn test_dotted_field_lookup() {
        let row = json!({"address": {"city": "Norfolk"}, "a.b": 1});
        let row = row.as_object().unwrap();
        assert_eq!(field_value(row, "address.city"), Some(&json!("Norfolk")));
        assert_eq!(field_value(row, "a.b"), Some(&json!(1)));
        assert!(is_null_or_missing(row, "address.zip"));
    }

    #[test]
    fn test_epoch_millis_are_timestamps() {
        let parsed = parse_timestamp(&json!(0)).unwrap();
        assert_eq!(parsed.to_rfc3339(), "1970-01-01T00:00:00+00:00");
        assert!(parse_timestamp(&json!("not a date")).is_none());
    }
}
