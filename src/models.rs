use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::config::Config;
use crate::dataset::profiling::DatasetProfile;
use crate::dataset::Dataset;
use crate::engine::DataEngine;
use crate::query::FilterDefinition;

pub use crate::query::{ChartConfig, ChartResponse};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: DataEngine,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitRequest {
    #[validate(length(min = 1, message = "datasetName must not be empty"))]
    pub dataset_name: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    /// May be left empty when the id comes from the URL path.
    #[serde(default)]
    #[validate(length(min = 1, message = "uploadId must not be empty"))]
    pub upload_id: String,
    #[serde(default)]
    pub chunk_text: String,
    #[serde(default)]
    pub chunk_index: Option<u64>,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadDatasetRequest {
    #[validate(length(min = 1, message = "datasetName must not be empty"))]
    pub dataset_name: String,
    #[serde(default)]
    pub csv_text: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_uri: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "datasetId must not be empty"))]
    pub dataset_id: String,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "datasetId must not be empty"))]
    pub dataset_id: String,
    pub config: ChartConfig,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub dataset_id: String,
    pub dataset_name: String,
    pub row_count: usize,
    pub column_count: usize,
    pub created_at: String,
    pub filename: Option<String>,
    pub profile: DatasetProfile,
}

impl From<&Dataset> for DatasetSummary {
    fn from(dataset: &Dataset) -> Self {
        Self {
            dataset_id: dataset.id.clone(),
            dataset_name: dataset.name.clone(),
            row_count: dataset.profile.row_count,
            column_count: dataset.profile.column_count,
            created_at: dataset.created_at.to_rfc3339(),
            filename: dataset.filename.clone(),
            profile: dataset.profile.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    pub datasets: Vec<DatasetSummary>,
    pub active_dataset_id: Option<String>,
    pub supports_chunk_upload: bool,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitResponse {
    pub upload_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDatasetResponse {
    pub dataset: DatasetSummary,
    pub preview: Vec<Value>,
    pub columns: Vec<String>,
}

/// Progress of a chunked upload. The dataset fields are only present once
/// `is_finalized` is true.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkStatus {
    pub upload_id: String,
    pub received_bytes: usize,
    pub chunk_index: Option<u64>,
    pub is_finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub dataset_id: String,
    pub total_rows: usize,
    pub rows: Vec<Value>,
    pub columns: Vec<String>,
    pub applied_filters: Vec<FilterDefinition>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub datasets: usize,
    pub upload_sessions: usize,
    pub timestamp: String,
}
