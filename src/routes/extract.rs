//! Request extractors shared by the REST routes.

use axum::extract::FromRequest;

use crate::types::AppError;

/// `Json` whose rejections become `INVALID_REQUEST` error bodies.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
