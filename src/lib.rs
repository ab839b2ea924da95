// Data Explorer - tabular dataset profiling, filtering and chart aggregation

pub mod config;
pub mod data_registry;
pub mod dataset;
pub mod engine;
pub mod middleware;
pub mod models;
pub mod query;
pub mod routes;
pub mod types;
pub mod upload;
pub mod utils;

// Re-exports for convenience
pub use crate::config::{Config, EngineConfig};
pub use crate::engine::DataEngine;
pub use crate::models::AppState;
pub use crate::types::{AppError, AppResult};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
