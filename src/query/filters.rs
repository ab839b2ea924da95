//! Row filters: a conjunction of equality and inclusive range predicates.
//!
//! Filter literals arrive as raw JSON and are coerced with the role of the
//! column they target before any row is visited, so unknown columns and bad
//! range bounds fail fast.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::coercion::{canonical_datetime, parse_bool, parse_datetime, parse_number};
use crate::dataset::{Dataset, Record};
use crate::types::{format_number, AppError, AppResult, CellValue, ColumnRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterDefinition {
    Equals {
        column: String,
        #[serde(default)]
        value: Value,
    },
    Range {
        column: String,
        #[serde(default)]
        min: Option<Value>,
        #[serde(default)]
        max: Option<Value>,
    },
}

impl FilterDefinition {
    pub fn column(&self) -> &str {
        match self {
            FilterDefinition::Equals { column, .. } | FilterDefinition::Range { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Bound {
    Number(f64),
    Datetime(NaiveDateTime),
    Bool(bool),
    Text(String),
}

#[derive(Debug)]
enum Predicate {
    /// `None` target never matches.
    Equals { index: usize, target: Option<CellValue> },
    Range {
        index: usize,
        min: Option<Bound>,
        max: Option<Bound>,
    },
}

impl Predicate {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Equals { index, target } => match target {
                Some(target) => record.get(*index) == target,
                None => false,
            },
            Predicate::Range { index, min, max } => {
                let cell = record.get(*index);
                if cell.is_null() {
                    return false;
                }
                let above_min = match min {
                    Some(bound) => matches!(compare(cell, bound), Some(Ordering::Greater | Ordering::Equal)),
                    None => true,
                };
                let below_max = match max {
                    Some(bound) => matches!(compare(cell, bound), Some(Ordering::Less | Ordering::Equal)),
                    None => true,
                };
                above_min && below_max
            }
        }
    }
}

/// Returns the records passing every filter, in row order.
pub fn apply_filters<'a>(dataset: &'a Dataset, filters: &[FilterDefinition]) -> AppResult<Vec<&'a Record>> {
    let predicates = filters
        .iter()
        .map(|f| compile(dataset, f))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(dataset
        .rows
        .iter()
        .filter(|record| predicates.iter().all(|p| p.matches(record)))
        .collect())
}

fn compile(dataset: &Dataset, filter: &FilterDefinition) -> AppResult<Predicate> {
    let index = dataset.column_index(filter.column())?;
    let role = dataset.role(index);
    match filter {
        FilterDefinition::Equals { value, .. } => Ok(Predicate::Equals {
            index,
            target: equals_target(value, role),
        }),
        FilterDefinition::Range { column, min, max } => Ok(Predicate::Range {
            index,
            min: min.as_ref().map(|v| range_bound(v, role, column)).transpose()?,
            max: max.as_ref().map(|v| range_bound(v, role, column)).transpose()?,
        }),
    }
}

fn literal_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn literal_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn literal_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_f64().map(format_number),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn equals_target(value: &Value, role: ColumnRole) -> Option<CellValue> {
    match role {
        ColumnRole::Numeric => literal_number(value).map(CellValue::Number),
        ColumnRole::Boolean => literal_bool(value).map(CellValue::Bool),
        ColumnRole::Datetime => match value {
            Value::String(s) => parse_datetime(s).map(|dt| CellValue::Text(canonical_datetime(&dt))),
            _ => None,
        },
        ColumnRole::Categorical | ColumnRole::Text => literal_text(value).map(CellValue::Text),
    }
}

fn range_bound(value: &Value, role: ColumnRole, column: &str) -> AppResult<Bound> {
    let bound = match role {
        ColumnRole::Numeric => literal_number(value).map(Bound::Number),
        ColumnRole::Boolean => literal_bool(value).map(Bound::Bool),
        ColumnRole::Datetime => match value {
            Value::String(s) => parse_datetime(s).map(Bound::Datetime),
            _ => None,
        },
        ColumnRole::Categorical | ColumnRole::Text => literal_text(value).map(Bound::Text),
    };
    bound.ok_or_else(|| {
        AppError::InvalidRequest(format!(
            "range bound {value} cannot be compared with {role} column '{column}'"
        ))
    })
}

fn compare(cell: &CellValue, bound: &Bound) -> Option<Ordering> {
    match (cell, bound) {
        (CellValue::Number(n), Bound::Number(b)) => n.partial_cmp(b),
        (CellValue::Bool(v), Bound::Bool(b)) => Some(v.cmp(b)),
        (CellValue::Text(s), Bound::Datetime(b)) => parse_datetime(s).map(|dt| dt.cmp(b)),
        (CellValue::Text(s), Bound::Text(b)) => Some(s.as_str().cmp(b.as_str())),
        _ => None,
    }
}
