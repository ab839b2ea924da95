//! Tool invocation surface.
//!
//! `POST /api/tools/{name}` takes the tool's JSON arguments as the body and
//! answers with a uniform envelope, so clients can drive every engine
//! operation through a single endpoint.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::models::AppState;
use crate::types::{AppError, AppResult, ErrorBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Open,
    Upload,
    UploadInit,
    UploadChunk,
    Preview,
    Chart,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Open,
        Tool::Upload,
        Tool::UploadInit,
        Tool::UploadChunk,
        Tool::Preview,
        Tool::Chart,
    ];

    /// Accepts both snake_case and camelCase names.
    pub fn from_name(name: &str) -> Option<Tool> {
        match name {
            "open" => Some(Tool::Open),
            "upload" => Some(Tool::Upload),
            "upload_init" | "uploadInit" => Some(Tool::UploadInit),
            "upload_chunk" | "uploadChunk" => Some(Tool::UploadChunk),
            "preview" => Some(Tool::Preview),
            "chart" => Some(Tool::Chart),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Open => "open",
            Tool::Upload => "upload",
            Tool::UploadInit => "upload_init",
            Tool::UploadChunk => "upload_chunk",
            Tool::Preview => "preview",
            Tool::Chart => "chart",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::Open => "List recent datasets and upload capabilities",
            Tool::Upload => "Upload a dataset from csvText, filePath or fileUri",
            Tool::UploadInit => "Start a chunked upload session",
            Tool::UploadChunk => "Append a chunk to an upload session; isFinal registers the dataset",
            Tool::Preview => "Filtered, paginated rows of a dataset",
            Tool::Chart => "Bar, scatter or histogram aggregates of a dataset",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub execution_time_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ToolResponse {
    fn success(result: Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_time_ms,
            timestamp: chrono::Utc::now(),
        }
    }

    fn error(error: &AppError, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.body()),
            execution_time_ms,
            timestamp: chrono::Utc::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/tools/{name}", post(invoke_tool))
        .with_state(state)
}

async fn list_tools() -> Json<Vec<ToolDescriptor>> {
    Json(
        Tool::ALL
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name(),
                description: tool.description(),
            })
            .collect(),
    )
}

async fn invoke_tool(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> Response {
    let start = std::time::Instant::now();

    let result = match Tool::from_name(&name) {
        Some(tool) => {
            info!("Tool call: {}", tool.name());
            dispatch(&state, tool, &body).await
        }
        None => Err(AppError::InvalidRequest(format!("unknown tool: {name}"))),
    };
    let elapsed = start.elapsed().as_millis() as u64;

    match result {
        Ok(value) => (StatusCode::OK, Json(ToolResponse::success(value, elapsed))).into_response(),
        Err(err) => {
            warn!(tool = %name, code = err.code(), "Tool call failed: {}", err);
            (err.status(), Json(ToolResponse::error(&err, elapsed))).into_response()
        }
    }
}

fn arguments<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| AppError::InvalidRequest(format!("invalid arguments: {e}")))
}

fn to_value<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

async fn dispatch(state: &AppState, tool: Tool, body: &[u8]) -> AppResult<Value> {
    let engine = &state.engine;
    match tool {
        Tool::Open => to_value(engine.open().await),
        Tool::Upload => to_value(engine.upload(arguments(body)?).await?),
        Tool::UploadInit => to_value(engine.upload_init(arguments(body)?).await?),
        Tool::UploadChunk => to_value(engine.upload_chunk(arguments(body)?).await?),
        Tool::Preview => to_value(engine.preview(arguments(body)?).await?),
        Tool::Chart => to_value(engine.chart(arguments(body)?).await?),
    }
}
