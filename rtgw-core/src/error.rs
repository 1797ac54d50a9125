use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Helper to create a JSON error response with a standard `{ "error", "message" }` body.
fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": error, "message": message.into() });
    (status, Json(body)).into_response()
}

/// Top-level HTTP error taxonomy shared by every crate in the gateway.
///
/// Each variant carries the status code it maps to (spec §7) and a
/// human-readable message for the `{error, message}` body.
pub enum HttpError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    PayloadTooLarge(String),
    RateLimited(String),
    IntegrityFailed(String),
    NotFound(String),
    Internal(String),
}

impl HttpError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            HttpError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m),
            HttpError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m),
            HttpError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m),
            HttpError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", m),
            HttpError::RateLimited(m) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", m),
            HttpError::IntegrityFailed(m) => (StatusCode::BAD_REQUEST, "integrity_failed", m),
            HttpError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            HttpError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", m),
        }
    }

    /// The status code this error maps to, without building a response.
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        error_response(status, error, message.to_string())
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (status, error, message) = self.parts();
        write!(f, "{status} {error}: {message}")
    }
}

impl std::fmt::Debug for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for HttpError {}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::Internal(err.to_string())
    }
}

/// Generate `From<E> for HttpError` implementations that map error types to
/// a specific `HttpError` variant.
///
/// ```ignore
/// rtgw_core::map_error! {
///     serde_json::Error => BadRequest,
/// }
/// ```
#[macro_export]
macro_rules! map_error {
    ( $( $err_ty:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$err_ty> for $crate::error::HttpError {
                fn from(err: $err_ty) -> Self {
                    $crate::error::HttpError::$variant(err.to_string())
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn error_parts(err: HttpError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401() {
        let (status, body) = error_parts(HttpError::Unauthorized("no token".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "no token");
    }

    #[tokio::test]
    async fn rate_limited_maps_to_429() {
        let (status, _) = error_parts(HttpError::RateLimited("too many".into())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn payload_too_large_maps_to_413() {
        let (status, _) = error_parts(HttpError::PayloadTooLarge("10MiB".into())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn display_includes_status_and_message() {
        let s = HttpError::Forbidden("nope".into()).to_string();
        assert!(s.contains("403"));
        assert!(s.contains("nope"));
    }
}
