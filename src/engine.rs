//! The dataset engine: the six operations exposed to clients.
//!
//! `DataEngine` owns the dataset registry and the upload session manager and
//! is cheap to clone; every clone shares the same stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::EngineConfig;
use crate::data_registry::DatasetRegistry;
use crate::dataset::parser::{parse_delimiter, ParseOptions};
use crate::dataset::{build_content, BuildOptions, Dataset};
use crate::models::{
    ChartRequest, DatasetSummary, OpenResponse, PreviewRequest, PreviewResponse, UploadChunkRequest,
    UploadChunkStatus, UploadDatasetRequest, UploadDatasetResponse, UploadInitRequest, UploadInitResponse,
};
use crate::query::{apply_filters, build_chart, ChartResponse};
use crate::types::{AppError, AppResult};
use crate::upload::{UploadSession, UploadSessionManager};

#[derive(Clone)]
pub struct DataEngine {
    config: Arc<EngineConfig>,
    registry: DatasetRegistry,
    sessions: UploadSessionManager,
}

fn check<T: Validate>(request: &T) -> AppResult<()> {
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))
}

impl DataEngine {
    pub fn new(config: EngineConfig) -> Self {
        let sessions = UploadSessionManager::new(
            config.max_upload_sessions,
            i64::try_from(config.session_idle_timeout_secs).unwrap_or(i64::MAX),
        );
        Self {
            config: Arc::new(config),
            registry: DatasetRegistry::default(),
            sessions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &UploadSessionManager {
        &self.sessions
    }

    pub async fn open(&self) -> OpenResponse {
        let datasets = self
            .registry
            .list_recent(self.config.recent_datasets_limit)
            .await
            .iter()
            .map(|d| DatasetSummary::from(d.as_ref()))
            .collect();

        OpenResponse {
            datasets,
            active_dataset_id: self.registry.active_id().await,
            supports_chunk_upload: true,
            max_upload_bytes: self.config.max_upload_bytes,
        }
    }

    pub async fn upload_init(&self, request: UploadInitRequest) -> AppResult<UploadInitResponse> {
        check(&request)?;
        let parse = ParseOptions {
            has_header: request.has_header,
            delimiter: parse_delimiter(request.delimiter.as_deref())?,
        };

        self.sessions.reap_idle().await;

        let session = UploadSession::new(request.dataset_name, request.filename, parse);
        let upload_id = self.sessions.open_session(session).await?;
        info!(upload_id = %upload_id, "Upload session opened");

        Ok(UploadInitResponse { upload_id })
    }

    pub async fn upload_chunk(&self, request: UploadChunkRequest) -> AppResult<UploadChunkStatus> {
        check(&request)?;
        let shared = self.sessions.get(&request.upload_id).await?;

        // Held until the chunk (and any finalization) is done.
        let mut session = shared.lock().await;

        if let Err(err) = session.append(&request.chunk_text, request.chunk_index, self.config.max_upload_bytes) {
            warn!(upload_id = %request.upload_id, error = %err, "Chunk rejected");
            return Err(err);
        }
        debug!(
            upload_id = %request.upload_id,
            chunk_index = ?request.chunk_index,
            received_bytes = session.received_bytes,
            "Chunk received"
        );

        let mut status = UploadChunkStatus {
            upload_id: request.upload_id.clone(),
            received_bytes: session.received_bytes,
            chunk_index: request.chunk_index,
            is_finalized: false,
            dataset: None,
            preview: None,
            columns: None,
        };

        if !request.is_final {
            return Ok(status);
        }

        let text = session.begin_finalize()?;
        let options = self.config.build_options(session.parse.clone());
        let result = self
            .build_and_register(text, session.dataset_name.clone(), session.filename.clone(), options)
            .await;

        match result {
            Ok(dataset) => {
                session.complete();
                info!(
                    upload_id = %request.upload_id,
                    dataset_id = %dataset.id,
                    chunks = session.chunks_received,
                    "Chunked upload finalized"
                );
                status.is_finalized = true;
                status.preview = Some(self.preview_rows(&dataset));
                status.columns = Some(dataset.columns.clone());
                status.dataset = Some(DatasetSummary::from(dataset.as_ref()));
                Ok(status)
            }
            Err(err) => {
                session.fail();
                warn!(upload_id = %request.upload_id, error = %err, "Chunked upload failed");
                Err(err)
            }
        }
    }

    pub async fn upload(&self, request: UploadDatasetRequest) -> AppResult<UploadDatasetResponse> {
        check(&request)?;
        let parse = ParseOptions {
            has_header: request.has_header,
            delimiter: parse_delimiter(request.delimiter.as_deref())?,
        };

        let (text, source_name) = self.read_source(&request).await?;
        let filename = request.filename.clone().or(source_name);
        let options = self.config.build_options(parse);

        let dataset = self
            .build_and_register(text, request.dataset_name, filename, options)
            .await?;

        Ok(UploadDatasetResponse {
            preview: self.preview_rows(&dataset),
            columns: dataset.columns.clone(),
            dataset: DatasetSummary::from(dataset.as_ref()),
        })
    }

    pub async fn preview(&self, request: PreviewRequest) -> AppResult<PreviewResponse> {
        check(&request)?;
        let limit = request.limit.unwrap_or(self.config.preview_default_limit);
        if limit == 0 || limit > self.config.preview_max_limit {
            return Err(AppError::InvalidRequest(format!(
                "limit must be within 1..={}",
                self.config.preview_max_limit
            )));
        }

        let dataset = self.dataset(&request.dataset_id).await?;
        let filtered = apply_filters(&dataset, &request.filters)?;
        let rows = dataset.rows_as_json(filtered.iter().skip(request.offset).take(limit).copied());

        Ok(PreviewResponse {
            dataset_id: dataset.id.clone(),
            total_rows: filtered.len(),
            rows,
            columns: dataset.columns.clone(),
            applied_filters: request.filters,
            limit,
            offset: request.offset,
        })
    }

    pub async fn chart(&self, request: ChartRequest) -> AppResult<ChartResponse> {
        check(&request)?;
        let dataset = self.dataset(&request.dataset_id).await?;
        let filtered = apply_filters(&dataset, &request.filters)?;
        build_chart(&dataset, &filtered, &request.config, &self.config.chart_options())
    }

    pub async fn reap_idle_sessions(&self) -> usize {
        self.sessions.reap_idle().await
    }

    async fn dataset(&self, dataset_id: &str) -> AppResult<Arc<Dataset>> {
        self.registry
            .get(dataset_id)
            .await
            .ok_or_else(|| AppError::UnknownDataset(dataset_id.to_string()))
    }

    fn preview_rows(&self, dataset: &Dataset) -> Vec<serde_json::Value> {
        dataset.rows_as_json(dataset.rows.iter().take(self.config.upload_preview_rows))
    }

    /// Parses and profiles off the async runtime, then registers the result.
    /// Nothing is registered unless the whole build succeeds.
    async fn build_and_register(
        &self,
        text: String,
        name: String,
        filename: Option<String>,
        options: BuildOptions,
    ) -> AppResult<Arc<Dataset>> {
        let content = tokio::task::spawn_blocking(move || build_content(&text, &options))
            .await
            .map_err(|e| AppError::Internal(format!("dataset build task failed: {e}")))??;

        let dataset = self.registry.insert(Dataset::new(name, filename, content)).await;
        info!(
            dataset_id = %dataset.id,
            name = %dataset.name,
            rows = dataset.row_count(),
            columns = dataset.columns.len(),
            "Dataset registered"
        );
        Ok(dataset)
    }

    /// Resolves the upload source: inline text, then a local path, then a
    /// `file://` URI. Returns the text and, for files, the file name.
    async fn read_source(&self, request: &UploadDatasetRequest) -> AppResult<(String, Option<String>)> {
        if let Some(text) = &request.csv_text {
            self.check_size(text.len())?;
            return Ok((text.clone(), None));
        }

        let path = if let Some(path) = &request.file_path {
            PathBuf::from(path)
        } else if let Some(uri) = &request.file_uri {
            let path = uri.strip_prefix("file://").ok_or_else(|| {
                AppError::InvalidRequest(format!("unsupported fileUri scheme: {uri}"))
            })?;
            PathBuf::from(path)
        } else {
            return Err(AppError::InvalidRequest(
                "one of csvText, filePath or fileUri is required".to_string(),
            ));
        };

        let text = self.read_file(&path).await?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok((text, name))
    }

    async fn read_file(&self, path: &Path) -> AppResult<String> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::InvalidRequest(format!("file not found: {}", path.display()))
            }
            _ => AppError::Io(e),
        })?;
        self.check_size(usize::try_from(metadata.len()).unwrap_or(usize::MAX))?;

        let bytes = tokio::fs::read(path).await?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::Parse(format!("{} is not valid UTF-8", path.display())))
    }

    fn check_size(&self, len: usize) -> AppResult<()> {
        if len > self.config.max_upload_bytes {
            return Err(AppError::PayloadTooLarge {
                limit: self.config.max_upload_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellValue, ColumnRole};
    use serde_json::json;
    use std::io::Write;

    const SCENARIO: &str = "a,b\n1,x\n2,y\n,z\n";

    fn engine() -> DataEngine {
        DataEngine::new(EngineConfig::default())
    }

    fn upload_request(text: &str) -> UploadDatasetRequest {
        UploadDatasetRequest {
            dataset_name: "scenario".to_string(),
            csv_text: Some(text.to_string()),
            has_header: true,
            ..Default::default()
        }
    }

    fn init_request() -> UploadInitRequest {
        serde_json::from_value(json!({"datasetName": "chunked", "filename": "c.csv"})).unwrap()
    }

    fn chunk(upload_id: &str, text: &str, index: u64, is_final: bool) -> UploadChunkRequest {
        UploadChunkRequest {
            upload_id: upload_id.to_string(),
            chunk_text: text.to_string(),
            chunk_index: Some(index),
            is_final,
        }
    }

    #[tokio::test]
    async fn test_open_on_empty_engine() {
        let open = engine().open().await;
        assert!(open.datasets.is_empty());
        assert!(open.active_dataset_id.is_none());
        assert!(open.supports_chunk_upload);
        assert_eq!(open.max_upload_bytes, 50 * 1024 * 1024);

        let value = serde_json::to_value(&open).unwrap();
        assert!(value["activeDatasetId"].is_null());
    }

    #[tokio::test]
    async fn test_direct_upload_and_preview() {
        let engine = engine();
        let uploaded = engine.upload(upload_request(SCENARIO)).await.unwrap();
        assert_eq!(uploaded.dataset.row_count, 3);
        assert_eq!(uploaded.columns, vec!["a", "b"]);
        assert_eq!(uploaded.preview.len(), 3);
        assert_eq!(uploaded.dataset.profile.columns[0].role, ColumnRole::Numeric);

        let preview = engine
            .preview(PreviewRequest {
                dataset_id: uploaded.dataset.dataset_id.clone(),
                limit: Some(1),
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(preview.total_rows, 3);
        assert_eq!(preview.rows, vec![json!({"a": 2, "b": "y"})]);

        let open = engine.open().await;
        assert_eq!(open.active_dataset_id, Some(uploaded.dataset.dataset_id));
        assert_eq!(open.datasets.len(), 1);
    }

    #[tokio::test]
    async fn test_preview_limit_bounds() {
        let engine = engine();
        let uploaded = engine.upload(upload_request(SCENARIO)).await.unwrap();
        let err = engine
            .preview(PreviewRequest {
                dataset_id: uploaded.dataset.dataset_id,
                limit: Some(201),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = engine
            .preview(PreviewRequest {
                dataset_id: "missing".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownDataset(_)));
    }

    #[tokio::test]
    async fn test_chunked_upload_lifecycle() {
        let engine = engine();
        let upload_id = engine.upload_init(init_request()).await.unwrap().upload_id;

        let first = engine.upload_chunk(chunk(&upload_id, "a,b\n1,x\n", 0, false)).await.unwrap();
        assert!(!first.is_finalized);
        assert_eq!(first.received_bytes, 8);
        assert!(first.dataset.is_none());

        let last = engine.upload_chunk(chunk(&upload_id, "2,y\n,z\n", 1, true)).await.unwrap();
        assert!(last.is_finalized);
        assert!(last.received_bytes > first.received_bytes);
        let dataset = last.dataset.unwrap();
        assert_eq!(dataset.row_count, 3);
        assert_eq!(dataset.filename.as_deref(), Some("c.csv"));
        assert_eq!(last.columns.unwrap(), vec!["a", "b"]);

        let err = engine.upload_chunk(chunk(&upload_id, "3,w\n", 2, false)).await.unwrap_err();
        assert!(matches!(err, AppError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_failed_finalize_leaves_store_unchanged() {
        let engine = engine();
        let upload_id = engine.upload_init(init_request()).await.unwrap().upload_id;
        let err = engine.upload_chunk(chunk(&upload_id, "a,b\n1,2\n3\n", 0, true)).await.unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
        assert!(engine.registry().is_empty().await);

        let err = engine.upload_chunk(chunk(&upload_id, "4,5\n", 1, true)).await.unwrap_err();
        assert!(matches!(err, AppError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let err = engine().upload_chunk(chunk("nope", "a\n", 0, true)).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let engine = DataEngine::new(EngineConfig {
            max_upload_bytes: 8,
            ..EngineConfig::default()
        });
        let err = engine.upload(upload_request(SCENARIO)).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { limit: 8 }));

        let upload_id = engine.upload_init(init_request()).await.unwrap().upload_id;
        engine.upload_chunk(chunk(&upload_id, "a,b\n", 0, false)).await.unwrap();
        let err = engine.upload_chunk(chunk(&upload_id, "1,x\n2,y\n", 1, false)).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { .. }));
        let err = engine.upload_chunk(chunk(&upload_id, "", 2, true)).await.unwrap_err();
        assert!(matches!(err, AppError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_upload_from_file_path_and_uri() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let expected_name = file.path().file_name().unwrap().to_string_lossy().into_owned();

        let engine = engine();
        let by_path = engine
            .upload(UploadDatasetRequest {
                dataset_name: "file".to_string(),
                file_path: Some(path.clone()),
                has_header: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_path.dataset.filename, Some(expected_name));
        assert_eq!(by_path.dataset.row_count, 3);

        let by_uri = engine
            .upload(UploadDatasetRequest {
                dataset_name: "uri".to_string(),
                file_uri: Some(format!("file://{path}")),
                has_header: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_uri.dataset.profile, by_path.dataset.profile);

        let err = engine
            .upload(UploadDatasetRequest {
                dataset_name: "remote".to_string(),
                file_uri: Some("https://example.com/data.csv".to_string()),
                has_header: true,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_upload_requires_source_and_name() {
        let engine = engine();
        let err = engine
            .upload(UploadDatasetRequest {
                dataset_name: "nothing".to_string(),
                has_header: true,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let mut request = upload_request(SCENARIO);
        request.dataset_name.clear();
        assert!(matches!(engine.upload(request).await, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_chart_with_filters() {
        let engine = engine();
        let uploaded = engine.upload(upload_request(SCENARIO)).await.unwrap();
        let request: ChartRequest = serde_json::from_value(json!({
            "datasetId": uploaded.dataset.dataset_id,
            "config": {"chartType": "bar", "x": "b"},
            "filters": [{"type": "range", "column": "a", "min": 1}]
        }))
        .unwrap();
        let response = engine.chart(request).await.unwrap();
        let series = response.series.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].category, CellValue::Text("x".to_string()));
    }

    #[tokio::test]
    async fn test_session_limit() {
        let engine = DataEngine::new(EngineConfig {
            max_upload_sessions: 1,
            ..EngineConfig::default()
        });
        engine.upload_init(init_request()).await.unwrap();
        let err = engine.upload_init(init_request()).await.unwrap_err();
        assert!(matches!(err, AppError::SessionLimitReached));
        assert_eq!(engine.reap_idle_sessions().await, 0);
    }
}
