//! Null value handling for CSV loading

use serde::{Serialize, Deserialize};
use serde_json::Value;

/// Null value configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NullConfig {
    /// Patterns to treat as null
    pub patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,

    /// Case sensitive matching
    pub case_sensitive: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                String::new(),      // Empty string
                "-".to_string(),
                "N/A".to_string(),
                "null".to_string(),
                "None".to_string(),
            ],
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Check if a value should be treated as null
    pub fn is_null(&self, value: &str) -> bool {
        let test_value = if self.trim_whitespace {
            value.trim()
        } else {
            value
        };

        self.patterns.iter().any(|pattern| {
            if self.case_sensitive {
                test_value == pattern
            } else {
                test_value.eq_ignore_ascii_case(pattern)
            }
        })
    }

    /// Add a null pattern
    pub fn add_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    /// JSON value of one raw cell: null, bool, integer, float or text, in that order
    pub fn cell_value(&self, raw: &str) -> Value {
        if self.is_null(raw) {
            return Value::Null;
        }
        let cell = if self.trim_whitespace { raw.trim() } else { raw };

        if cell.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if cell.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(int) = cell.parse::<i64>() {
            return Value::from(int);
        }
        match cell.parse::<f64>() {
            Ok(float) if float.is_finite() => Value::from(float),
            _ => Value::String(cell.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patterns_ignore_case_and_whitespace() {
        let config = NullConfig::default();
        assert!(config.is_null("  n/a "));
        assert!(config.is_null(""));
        assert!(!config.is_null("Nonesuch"));
    }

    #[test]
    fn test_cell_inference() {
        let mut config = NullConfig::default();
        config.add_pattern("?");
        assert_eq!(config.cell_value("?"), Value::Null);
        assert_eq!(config.cell_value("TRUE"), json!(true));
        assert_eq!(config.cell_value(" 42 "), json!(42));
        assert_eq!(config.cell_value("2.5"), json!(2.5));
        assert_eq!(config.cell_value("inf"), json!("inf"));
        assert_eq!(config.cell_value("2012-06-03"), json!("2012-06-03"));
    }
}
