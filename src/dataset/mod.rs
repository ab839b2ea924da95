//! Dataset construction: parse → infer roles → coerce → profile.
//!
//! Both the direct upload and the chunked upload funnel through
//! [`build_content`], so the same text always yields the same rows and
//! profiles regardless of how it arrived.

pub mod coercion;
pub mod parser;
pub mod profiling;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::types::{AppError, AppResult, CellValue, ColumnRole};
use coercion::RoleThresholds;
use parser::ParseOptions;
use profiling::{ColumnProfile, DatasetProfile, ProfileOptions};

/// One row, positionally aligned with the dataset's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record(Vec<CellValue>);

impl Record {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> &CellValue {
        self.0.get(index).unwrap_or(&CellValue::Null)
    }

    pub fn values(&self) -> &[CellValue] {
        &self.0
    }

    /// JSON object keyed by column name, in column order.
    pub fn to_json(&self, columns: &[String]) -> Value {
        let mut map = Map::with_capacity(columns.len());
        for (name, value) in columns.iter().zip(self.0.iter()) {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub parse: ParseOptions,
    pub thresholds: RoleThresholds,
    pub profile: ProfileOptions,
}

/// Rows and profile of a dataset, before it is given an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetContent {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub profile: DatasetProfile,
}

pub fn build_content(text: &str, options: &BuildOptions) -> AppResult<DatasetContent> {
    let table = parser::parse_csv(text, &options.parse)?;

    let mut typed_columns: Vec<Vec<CellValue>> = Vec::with_capacity(table.columns.len());
    let mut profiles: Vec<ColumnProfile> = Vec::with_capacity(table.columns.len());
    for (name, cells) in table.columns.iter().zip(table.cells.iter()) {
        let role = coercion::infer_role(cells, &options.thresholds);
        let values = coercion::coerce_column(cells, role);
        profiles.push(profiling::profile_column(name, role, &values, &options.profile));
        typed_columns.push(values);
    }

    let memory_usage_bytes = profiling::estimate_memory(&table.columns, &typed_columns);

    // Column-major → row-major.
    let mut column_iters: Vec<_> = typed_columns.into_iter().map(Vec::into_iter).collect();
    let mut rows = Vec::with_capacity(table.row_count);
    for _ in 0..table.row_count {
        let values = column_iters
            .iter_mut()
            .map(|it| it.next().unwrap_or(CellValue::Null))
            .collect();
        rows.push(Record::new(values));
    }

    Ok(DatasetContent {
        profile: DatasetProfile {
            row_count: table.row_count,
            column_count: table.columns.len(),
            columns: profiles,
            memory_usage_bytes,
        },
        columns: table.columns,
        rows,
    })
}

/// A registered, immutable dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub profile: DatasetProfile,
}

impl Dataset {
    pub fn new(name: impl Into<String>, filename: Option<String>, content: DatasetContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            filename,
            created_at: Utc::now(),
            columns: content.columns,
            rows: content.rows,
            profile: content.profile,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> AppResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| AppError::UnknownColumn(column.to_string()))
    }

    pub fn role(&self, index: usize) -> ColumnRole {
        self.profile
            .columns
            .get(index)
            .map(|p| p.role)
            .unwrap_or(ColumnRole::Text)
    }

    pub fn rows_as_json<'a>(&self, rows: impl IntoIterator<Item = &'a Record>) -> Vec<Value> {
        rows.into_iter().map(|r| r.to_json(&self.columns)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_scenario_dataset() {
        let content = build_content("a,b\n1,x\n2,y\n,z\n", &BuildOptions::default()).unwrap();
        assert_eq!(content.rows.len(), 3);
        assert_eq!(content.profile.row_count, 3);

        let a = &content.profile.columns[0];
        assert_eq!(a.role, ColumnRole::Numeric);
        assert_eq!(a.missing_count, 1);
        assert_eq!(a.non_null_count, 2);

        let b = &content.profile.columns[1];
        assert_eq!(b.role, ColumnRole::Categorical);
        assert_eq!(b.distinct_count, 3);
        assert_eq!(b.missing_count, 0);

        assert_eq!(content.rows[1].get(0), &CellValue::Number(2.0));
        assert_eq!(content.rows[2].get(0), &CellValue::Null);
    }

    #[test]
    fn test_record_json_keeps_column_order() {
        let content = build_content("z,a\n1,x\n", &BuildOptions::default()).unwrap();
        let json = content.rows[0].to_json(&content.columns);
        assert_eq!(serde_json::to_string(&json).unwrap(), r#"{"z":1,"a":"x"}"#);
    }

    #[test]
    fn test_same_text_same_content() {
        let text = "id,flag,when\n1,yes,2024-01-01\n2,no,2024-02-01\n";
        let first = build_content(text, &BuildOptions::default()).unwrap();
        let second = build_content(text, &BuildOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_column_lookup() {
        let content = build_content("a\n1\n", &BuildOptions::default()).unwrap();
        let dataset = Dataset::new("d", None, content);
        assert_eq!(dataset.column_index("a").unwrap(), 0);
        assert!(matches!(dataset.column_index("b"), Err(AppError::UnknownColumn(_))));
    }
}
