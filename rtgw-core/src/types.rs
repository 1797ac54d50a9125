//! Convenience type aliases for common handler return types.

use axum::http::StatusCode;
use axum::Json;

use crate::error::HttpError;

/// Flexible result alias — any response type with [`HttpError`].
pub type ApiResult<T> = Result<T, HttpError>;

/// The most common handler return type — `Result<Json<T>, HttpError>`.
pub type JsonResult<T> = Result<Json<T>, HttpError>;

/// Shorthand for endpoints that return only a status code (e.g. DELETE).
pub type StatusResult = Result<StatusCode, HttpError>;
