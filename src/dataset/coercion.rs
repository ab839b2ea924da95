//! Cell coercion and column role inference.
//!
//! Roles are decided column-wide: every present cell must satisfy a
//! candidate role or the column falls through to the next one, in the order
//! boolean → numeric → datetime → categorical/text.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::{CellValue, ColumnRole};

/// Canonical text form for datetime cells. Lexicographic order matches
/// chronological order for four-digit years.
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Thresholds separating categorical from free-text columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleThresholds {
    pub max_distinct: usize,
    pub max_ratio: f64,
}

impl Default for RoleThresholds {
    fn default() -> Self {
        Self {
            max_distinct: 50,
            max_ratio: 0.2,
        }
    }
}

pub fn is_missing(raw: &str) -> bool {
    raw.trim().is_empty()
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn canonical_datetime(dt: &NaiveDateTime) -> String {
    dt.format(CANONICAL_DATETIME_FORMAT).to_string()
}

/// Infers the role of a column from its raw cells.
///
/// `cells` includes missing cells; the full length feeds the categorical ratio.
pub fn infer_role(cells: &[String], thresholds: &RoleThresholds) -> ColumnRole {
    let present: Vec<&str> = cells
        .iter()
        .map(String::as_str)
        .filter(|c| !is_missing(c))
        .collect();

    // No witness values: none of the typed roles can be confirmed.
    if present.is_empty() {
        return ColumnRole::Categorical;
    }
    if present.iter().all(|c| parse_bool(c).is_some()) {
        return ColumnRole::Boolean;
    }
    if present.iter().all(|c| parse_number(c).is_some()) {
        return ColumnRole::Numeric;
    }
    if present.iter().all(|c| parse_datetime(c).is_some()) {
        return ColumnRole::Datetime;
    }

    let distinct = present.iter().collect::<HashSet<_>>().len();
    let ratio_limit = thresholds.max_ratio * cells.len() as f64;
    if distinct <= thresholds.max_distinct || (distinct as f64) <= ratio_limit {
        ColumnRole::Categorical
    } else {
        ColumnRole::Text
    }
}

/// Converts one raw cell into the typed value for `role`.
pub fn coerce_cell(raw: &str, role: ColumnRole) -> CellValue {
    if is_missing(raw) {
        return CellValue::Null;
    }
    let typed = match role {
        ColumnRole::Boolean => parse_bool(raw).map(CellValue::Bool),
        ColumnRole::Numeric => parse_number(raw).map(CellValue::Number),
        ColumnRole::Datetime => parse_datetime(raw).map(|dt| CellValue::Text(canonical_datetime(&dt))),
        ColumnRole::Categorical | ColumnRole::Text => Some(CellValue::Text(raw.to_string())),
    };
    // A cell that does not fit its column's role is kept as text rather than
    // dropped; inference guarantees this does not happen for typed roles.
    typed.unwrap_or_else(|| CellValue::Text(raw.to_string()))
}

pub fn coerce_column(cells: &[String], role: ColumnRole) -> Vec<CellValue> {
    cells.iter().map(|c| coerce_cell(c, role)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_boolean_takes_priority_over_numeric() {
        let thresholds = RoleThresholds::default();
        assert_eq!(infer_role(&col(&["1", "0", "1"]), &thresholds), ColumnRole::Boolean);
        assert_eq!(infer_role(&col(&["Yes", "no", ""]), &thresholds), ColumnRole::Boolean);
        assert_eq!(infer_role(&col(&["1", "2", ""]), &thresholds), ColumnRole::Numeric);
    }

    #[test]
    fn test_single_bad_cell_demotes_column() {
        let thresholds = RoleThresholds::default();
        assert_eq!(infer_role(&col(&["1.5", "2", "n/a"]), &thresholds), ColumnRole::Categorical);
        assert_eq!(
            infer_role(&col(&["2024-01-01", "2024-02-01", "soon"]), &thresholds),
            ColumnRole::Categorical
        );
    }

    #[test]
    fn test_datetime_detection() {
        let thresholds = RoleThresholds::default();
        let cells = col(&["2024-01-05", "2024-01-06T10:30:00", "01/07/2024", ""]);
        assert_eq!(infer_role(&cells, &thresholds), ColumnRole::Datetime);
        assert_eq!(
            coerce_cell("2024-01-05", ColumnRole::Datetime),
            CellValue::Text("2024-01-05T00:00:00".to_string())
        );
        assert_eq!(
            coerce_cell("2024-01-05T10:00:00+02:00", ColumnRole::Datetime),
            CellValue::Text("2024-01-05T08:00:00".to_string())
        );
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number(" -1e3 "), Some(-1000.0));
    }

    #[test]
    fn test_categorical_versus_text() {
        let thresholds = RoleThresholds {
            max_distinct: 3,
            max_ratio: 0.2,
        };
        let few = col(&["a", "b", "a", "c", "b", "a"]);
        assert_eq!(infer_role(&few, &thresholds), ColumnRole::Categorical);

        let many = col(&["a", "b", "c", "d", "e", "f"]);
        assert_eq!(infer_role(&many, &thresholds), ColumnRole::Text);

        // Ratio rule admits high-cardinality columns on long datasets.
        let mut long: Vec<String> = (0..100).map(|i| format!("k{}", i % 4)).collect();
        long.push("unique".to_string());
        assert_eq!(infer_role(&long, &thresholds), ColumnRole::Categorical);
    }

    #[test]
    fn test_all_missing_column() {
        let cells = col(&["", "  ", ""]);
        assert_eq!(infer_role(&cells, &RoleThresholds::default()), ColumnRole::Categorical);
        assert!(coerce_column(&cells, ColumnRole::Categorical).iter().all(CellValue::is_null));
    }
}
