use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Security-layer error taxonomy (spec §7), shared by the token verifier,
/// session store, and security middleware chain.
#[derive(Debug)]
pub enum SecurityError {
    /// Missing or unparsable bearer credential.
    MissingCredential,
    /// The token is malformed or its signature does not verify.
    InvalidToken(String),
    /// The token has expired.
    TokenExpired,
    /// Claim validation failed (issuer/audience/role).
    ValidationFailed(String),
    /// Authenticated, but not permitted to perform the action.
    Forbidden(String),
    /// Session id and CSRF token do not match, or are missing.
    CsrfMismatch,
    /// HMAC integrity signature missing, invalid, or stale.
    IntegrityFailed(String),
    /// Malformed request body or filter.
    Validation(String),
}

impl SecurityError {
    pub fn status(&self) -> StatusCode {
        match self {
            SecurityError::MissingCredential
            | SecurityError::InvalidToken(_)
            | SecurityError::TokenExpired
            | SecurityError::ValidationFailed(_) => StatusCode::UNAUTHORIZED,
            SecurityError::Forbidden(_) | SecurityError::CsrfMismatch => StatusCode::FORBIDDEN,
            SecurityError::IntegrityFailed(_) | SecurityError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            SecurityError::MissingCredential => "missing_credential",
            SecurityError::InvalidToken(_) => "invalid_token",
            SecurityError::TokenExpired => "token_expired",
            SecurityError::ValidationFailed(_) => "validation_failed",
            SecurityError::Forbidden(_) => "forbidden",
            SecurityError::CsrfMismatch => "csrf_mismatch",
            SecurityError::IntegrityFailed(_) => "integrity_failed",
            SecurityError::Validation(_) => "validation",
        }
    }

    /// A message safe to return to the caller. Authentication failures are
    /// deliberately generic; the rest carry their detail.
    pub fn public_message(&self) -> String {
        match self {
            SecurityError::MissingCredential
            | SecurityError::InvalidToken(_)
            | SecurityError::TokenExpired
            | SecurityError::ValidationFailed(_) => "Unauthorized".to_string(),
            SecurityError::Forbidden(m) => m.clone(),
            SecurityError::CsrfMismatch => "CSRF token mismatch".to_string(),
            SecurityError::IntegrityFailed(m) => m.clone(),
            SecurityError::Validation(m) => m.clone(),
        }
    }
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.public_message(), self.slug())
    }
}

impl std::error::Error for SecurityError {}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.slug(), "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

impl From<SecurityError> for rtgw_core::HttpError {
    fn from(err: SecurityError) -> Self {
        match err.status() {
            StatusCode::FORBIDDEN => rtgw_core::HttpError::Forbidden(err.public_message()),
            StatusCode::BAD_REQUEST => rtgw_core::HttpError::BadRequest(err.public_message()),
            _ => rtgw_core::HttpError::Unauthorized(err.public_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_maps_to_401() {
        assert_eq!(SecurityError::MissingCredential.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn csrf_mismatch_maps_to_403() {
        assert_eq!(SecurityError::CsrfMismatch.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn integrity_failed_maps_to_400() {
        assert_eq!(
            SecurityError::IntegrityFailed("stale timestamp".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn auth_failures_hide_detail_behind_generic_message() {
        let err = SecurityError::InvalidToken("bad signature: xyz".into());
        assert_eq!(err.public_message(), "Unauthorized");
    }
}
