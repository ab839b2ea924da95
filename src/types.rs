// Type definitions, enums and the engine error taxonomy

use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize, Serializer};

/// Inferred semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
    Text,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Numeric => write!(f, "numeric"),
            ColumnRole::Categorical => write!(f, "categorical"),
            ColumnRole::Datetime => write!(f, "datetime"),
            ColumnRole::Boolean => write!(f, "boolean"),
            ColumnRole::Text => write!(f, "text"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Scatter,
    Histogram,
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartType::Bar => write!(f, "bar"),
            ChartType::Scatter => write!(f, "scatter"),
            ChartType::Histogram => write!(f, "histogram"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Count,
    Sum,
    Avg,
}

/// A typed cell. The variant is decided once per column from its role.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

/// Hashable identity of a cell, used for distinct counts and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Number(u64),
    Text(String),
    Bool(bool),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn key(&self) -> CellKey {
        match self {
            // -0.0 and 0.0 are the same value
            CellValue::Number(n) if *n == 0.0 => CellKey::Number(0.0f64.to_bits()),
            CellValue::Number(n) => CellKey::Number(n.to_bits()),
            CellValue::Text(s) => CellKey::Text(s.clone()),
            CellValue::Bool(b) => CellKey::Bool(*b),
            CellValue::Null => CellKey::Null,
        }
    }

    /// Numeric reading of the cell for chart axes: numbers as-is, booleans as
    /// 1/0, text when it parses as a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => crate::dataset::coercion::parse_number(s),
            CellValue::Null => None,
        }
    }

    /// Rough in-memory footprint, used for the dataset memory estimate.
    pub fn estimated_size(&self) -> usize {
        let base = std::mem::size_of::<CellValue>();
        match self {
            CellValue::Text(s) => base + s.len(),
            _ => base,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Number(n) => number_to_json(*n),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => Ok(()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(n) => match as_exact_integer(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Null => serializer.serialize_none(),
        }
    }
}

// Largest magnitude where every integer is exactly representable in an f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn as_exact_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        Some(n as i64)
    } else {
        None
    }
}

/// Renders a number the way it serializes: integral values without a
/// trailing `.0`.
pub fn format_number(n: f64) -> String {
    match as_exact_integer(n) {
        Some(i) => i.to_string(),
        None => n.to_string(),
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    match as_exact_integer(n) {
        Some(i) => serde_json::Value::from(i),
        None => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown upload session: {0}")]
    UnknownSession(String),

    #[error("Upload session {0} is already closed")]
    SessionClosed(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Missing axis: {0}")]
    MissingAxis(String),

    #[error("Upload payload is empty")]
    EmptyPayload,

    #[error("Upload exceeds the maximum of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Maximum number of upload sessions reached")]
    SessionLimitReached,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Parse(_) => "PARSE_ERROR",
            AppError::UnknownDataset(_) => "UNKNOWN_DATASET",
            AppError::UnknownSession(_) => "UNKNOWN_SESSION",
            AppError::SessionClosed(_) => "SESSION_CLOSED",
            AppError::UnknownColumn(_) => "UNKNOWN_COLUMN",
            AppError::MissingAxis(_) => "MISSING_AXIS",
            AppError::EmptyPayload => "EMPTY_PAYLOAD",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::SessionLimitReached => "SESSION_LIMIT_REACHED",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Parse(_)
            | AppError::UnknownColumn(_)
            | AppError::MissingAxis(_)
            | AppError::EmptyPayload
            | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownDataset(_) | AppError::UnknownSession(_) => StatusCode::NOT_FOUND,
            AppError::SessionClosed(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::SessionLimitReached => StatusCode::TOO_MANY_REQUESTS,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Structured failure as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.body() }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
