//! REST-style routes over the dataset engine.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::extract::ApiJson;
use crate::models::{
    AppState, ChartRequest, ChartResponse, OpenResponse, PreviewRequest, PreviewResponse,
    UploadChunkRequest, UploadChunkStatus, UploadDatasetRequest, UploadDatasetResponse,
    UploadInitRequest, UploadInitResponse,
};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/datasets", get(open).post(upload))
        .route("/api/datasets/{id}/preview", post(preview))
        .route("/api/datasets/{id}/chart", post(chart))
        .route("/api/uploads", post(upload_init))
        .route("/api/uploads/{id}/chunks", post(upload_chunk))
        .with_state(state)
}

async fn open(State(state): State<AppState>) -> Json<OpenResponse> {
    Json(state.engine.open().await)
}

async fn upload(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UploadDatasetRequest>,
) -> AppResult<Json<UploadDatasetResponse>> {
    info!("Direct upload: {}", request.dataset_name);
    Ok(Json(state.engine.upload(request).await?))
}

async fn upload_init(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UploadInitRequest>,
) -> AppResult<Json<UploadInitResponse>> {
    Ok(Json(state.engine.upload_init(request).await?))
}

async fn upload_chunk(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    ApiJson(mut request): ApiJson<UploadChunkRequest>,
) -> AppResult<Json<UploadChunkStatus>> {
    request.upload_id = upload_id;
    Ok(Json(state.engine.upload_chunk(request).await?))
}

async fn preview(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
    ApiJson(mut request): ApiJson<PreviewRequest>,
) -> AppResult<Json<PreviewResponse>> {
    request.dataset_id = dataset_id;
    Ok(Json(state.engine.preview(request).await?))
}

async fn chart(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
    ApiJson(mut request): ApiJson<ChartRequest>,
) -> AppResult<Json<ChartResponse>> {
    request.dataset_id = dataset_id;
    Ok(Json(state.engine.chart(request).await?))
}
