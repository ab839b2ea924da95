//! API Routes
//!
//! - `/api/health` - Liveness with dataset and session counts
//! - `/api/tools` - Tool catalogue and `POST /api/tools/{name}` invocation
//! - `/api/datasets`, `/api/uploads` - REST-style dataset operations

pub mod datasets;
pub mod extract;
pub mod health;
pub mod tools;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

// Headroom for the JSON envelope around an upload payload.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let body_limit = state
        .config
        .engine
        .max_upload_bytes
        .saturating_add(BODY_LIMIT_SLACK);
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(tools::router(state.clone()))
        .merge(datasets::router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::DataEngine;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = Config::default();
        let engine = DataEngine::new(config.engine.clone());
        create_router(AppState { config, engine })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_raw(app: &Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["datasets"], 0);
    }

    #[tokio::test]
    async fn test_rest_upload_preview_chart() {
        let app = app();
        let (status, uploaded) = send(
            &app,
            "POST",
            "/api/datasets",
            Some(json!({"datasetName": "scenario", "csvText": "a,b\n1,x\n2,y\n,z\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = uploaded["dataset"]["datasetId"].as_str().unwrap().to_string();
        assert_eq!(uploaded["dataset"]["profile"]["columns"][0]["role"], "numeric");

        let (status, preview) = send(
            &app,
            "POST",
            &format!("/api/datasets/{id}/preview"),
            Some(json!({"filters": [{"type": "range", "column": "a", "min": 2}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["totalRows"], 1);
        assert_eq!(preview["rows"], json!([{"a": 2, "b": "y"}]));

        let (status, chart) = send(
            &app,
            "POST",
            &format!("/api/datasets/{id}/chart"),
            Some(json!({"config": {"chartType": "histogram", "x": "a", "binCount": 2}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chart["bins"].as_array().unwrap().len(), 2);

        let (_, open) = send(&app, "GET", "/api/datasets", None).await;
        assert_eq!(open["activeDatasetId"], id.as_str());
    }

    #[tokio::test]
    async fn test_rest_chunked_upload() {
        let app = app();
        let (status, init) = send(&app, "POST", "/api/uploads", Some(json!({"datasetName": "c"}))).await;
        assert_eq!(status, StatusCode::OK);
        let upload_id = init["uploadId"].as_str().unwrap().to_string();
        let uri = format!("/api/uploads/{upload_id}/chunks");

        let (_, first) = send(&app, "POST", &uri, Some(json!({"chunkText": "a\n1\n", "chunkIndex": 0}))).await;
        assert_eq!(first["isFinalized"], false);
        assert!(first.get("dataset").is_none());

        let (_, last) = send(
            &app,
            "POST",
            &uri,
            Some(json!({"chunkText": "2\n", "chunkIndex": 1, "isFinal": true})),
        )
        .await;
        assert_eq!(last["isFinalized"], true);
        assert_eq!(last["dataset"]["rowCount"], 2);

        let (status, err) = send(&app, "POST", &uri, Some(json!({"chunkText": "3\n"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"]["code"], "SESSION_CLOSED");
    }

    #[tokio::test]
    async fn test_error_responses() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/datasets/missing/preview",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "UNKNOWN_DATASET");

        let (status, body) = send(
            &app,
            "POST",
            "/api/uploads/nope/chunks",
            Some(json!({"chunkText": "a"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "UNKNOWN_SESSION");
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_error_envelope() {
        let app = app();
        let (status, body) = send_raw(&app, "/api/datasets", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");

        let (status, body) = send_raw(&app, "/api/uploads", r#"{"datasetName": 7}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_chart_without_x_is_unknown_column() {
        let app = app();
        let (_, uploaded) = send(
            &app,
            "POST",
            "/api/datasets",
            Some(json!({"datasetName": "nox", "csvText": "a\n1\n2\n"})),
        )
        .await;
        let id = uploaded["dataset"]["datasetId"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/datasets/{id}/chart"),
            Some(json!({"config": {"chartType": "histogram"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNKNOWN_COLUMN");

        let (status, body) = send(
            &app,
            "POST",
            "/api/tools/chart",
            Some(json!({"datasetId": id, "config": {"chartType": "bar"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNKNOWN_COLUMN");
    }

    #[tokio::test]
    async fn test_tool_invocation_envelope() {
        let app = app();
        let (status, tools) = send(&app, "GET", "/api/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tools.as_array().unwrap().len(), 6);

        let (status, opened) = send(&app, "POST", "/api/tools/open", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["success"], true);
        assert_eq!(opened["result"]["supportsChunkUpload"], true);
        assert!(opened["result"]["activeDatasetId"].is_null());

        let (status, uploaded) = send(
            &app,
            "POST",
            "/api/tools/upload",
            Some(json!({"datasetName": "t", "csvText": "k\na\nb\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = uploaded["result"]["dataset"]["datasetId"].as_str().unwrap().to_string();

        let (status, failed) = send(
            &app,
            "POST",
            "/api/tools/chart",
            Some(json!({"datasetId": id, "config": {"chartType": "bar", "x": "zzz"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"]["code"], "UNKNOWN_COLUMN");
        assert!(failed["executionTimeMs"].is_u64());

        let (status, unknown) = send(&app, "POST", "/api/tools/drop_table", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(unknown["error"]["code"], "INVALID_REQUEST");
    }
}
