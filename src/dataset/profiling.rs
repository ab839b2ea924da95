//! Per-column statistics.
//!
//! Profiles are derived data: they are computed once from the typed columns
//! when a dataset is built and never patched afterwards.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::dataset::coercion::parse_datetime;
use crate::types::{CellKey, CellValue, ColumnRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileOptions {
    pub sample_size: usize,
    pub top_values: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            sample_size: 5,
            top_values: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatetimeStats {
    pub min: String,
    pub max: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnStats {
    Numeric(NumericStats),
    Datetime(DatetimeStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopValue {
    pub value: CellValue,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub role: ColumnRole,
    pub dtype: String,
    pub non_null_count: usize,
    pub missing_count: usize,
    pub missing_proportion: f64,
    pub distinct_count: usize,
    pub sample_values: Vec<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ColumnStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_values: Option<Vec<TopValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub memory_usage_bytes: usize,
}

pub fn profile_column(
    name: &str,
    role: ColumnRole,
    values: &[CellValue],
    options: &ProfileOptions,
) -> ColumnProfile {
    let row_count = values.len();
    let present: Vec<&CellValue> = values.iter().filter(|v| !v.is_null()).collect();
    let non_null_count = present.len();
    let missing_count = row_count - non_null_count;
    let missing_proportion = if row_count == 0 {
        0.0
    } else {
        missing_count as f64 / row_count as f64
    };
    let distinct_count = present.iter().map(|v| v.key()).collect::<HashSet<_>>().len();
    let sample_values = present
        .iter()
        .take(options.sample_size)
        .map(|v| (*v).clone())
        .collect();

    let stats = match role {
        ColumnRole::Numeric => numeric_stats(&present).map(ColumnStats::Numeric),
        ColumnRole::Datetime => datetime_stats(&present).map(ColumnStats::Datetime),
        _ => None,
    };

    let top_values = match role {
        ColumnRole::Categorical | ColumnRole::Boolean | ColumnRole::Text => {
            Some(top_value_counts(&present, options.top_values))
        }
        _ => None,
    };

    ColumnProfile {
        name: name.to_string(),
        role,
        dtype: dtype_label(role, &present).to_string(),
        non_null_count,
        missing_count,
        missing_proportion,
        distinct_count,
        sample_values,
        stats,
        top_values,
    }
}

fn dtype_label(role: ColumnRole, present: &[&CellValue]) -> &'static str {
    match role {
        ColumnRole::Numeric => {
            let integral = present
                .iter()
                .all(|v| matches!(v, CellValue::Number(n) if n.fract() == 0.0));
            if integral {
                "int64"
            } else {
                "float64"
            }
        }
        ColumnRole::Boolean => "bool",
        ColumnRole::Datetime => "datetime64",
        ColumnRole::Categorical => "category",
        ColumnRole::Text => "string",
    }
}

fn numeric_stats(present: &[&CellValue]) -> Option<NumericStats> {
    let mut col: Vec<f64> = present
        .iter()
        .filter_map(|v| match v {
            CellValue::Number(n) => Some(*n),
            _ => None,
        })
        .collect();
    if col.is_empty() {
        return None;
    }
    col.sort_by(f64::total_cmp);

    let count = col.len();
    let mean = col.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (col[count / 2 - 1] + col[count / 2]) / 2.0
    } else {
        col[count / 2]
    };

    Some(NumericStats {
        min: col[0],
        max: col[count - 1],
        mean,
        median,
        std_dev: population_std_dev(&col, mean),
    })
}

fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn datetime_stats(present: &[&CellValue]) -> Option<DatetimeStats> {
    let mut bounds: Option<(chrono::NaiveDateTime, &str, chrono::NaiveDateTime, &str)> = None;
    for value in present {
        let CellValue::Text(text) = value else {
            continue;
        };
        let Some(dt) = parse_datetime(text) else {
            continue;
        };
        bounds = Some(match bounds {
            None => (dt, text.as_str(), dt, text.as_str()),
            Some((lo, lo_text, hi, hi_text)) => {
                let (lo, lo_text) = if dt < lo { (dt, text.as_str()) } else { (lo, lo_text) };
                let (hi, hi_text) = if dt > hi { (dt, text.as_str()) } else { (hi, hi_text) };
                (lo, lo_text, hi, hi_text)
            }
        });
    }
    bounds.map(|(_, min, _, max)| DatetimeStats {
        min: min.to_string(),
        max: max.to_string(),
    })
}

/// The `limit` most frequent values; ties keep first-seen order.
fn top_value_counts(present: &[&CellValue], limit: usize) -> Vec<TopValue> {
    let mut index: HashMap<CellKey, usize> = HashMap::new();
    let mut tallies: Vec<(&CellValue, usize)> = Vec::new();
    for value in present {
        let key = value.key();
        if let Some(pos) = index.get(&key).copied() {
            tallies[pos].1 += 1;
        } else {
            index.insert(key, tallies.len());
            tallies.push((*value, 1));
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    tallies.sort_by(|a, b| b.1.cmp(&a.1));

    let total = present.len();
    tallies
        .into_iter()
        .take(limit)
        .map(|(value, count)| TopValue {
            value: value.clone(),
            count,
            percentage: if total == 0 { 0.0 } else { count as f64 / total as f64 },
        })
        .collect()
}

/// Best-effort footprint: per-cell estimates plus column names.
pub fn estimate_memory(columns: &[String], values: &[Vec<CellValue>]) -> usize {
    let names: usize = columns.iter().map(|c| c.len()).sum();
    let cells: usize = values
        .iter()
        .flat_map(|col| col.iter())
        .map(CellValue::estimated_size)
        .sum();
    names + cells
}
