//! Security response headers — crypto/browser hardening headers applied to
//! every HTTP and WebSocket-upgrade response (C4 step 1).
//!
//! # Default headers
//!
//! | Header | Value |
//! |--------|-------|
//! | `X-Content-Type-Options` | `nosniff` |
//! | `X-Frame-Options` | `DENY` |
//! | `Strict-Transport-Security` | `max-age=31536000; includeSubDomains` |
//! | `X-XSS-Protection` | `0` |
//! | `Referrer-Policy` | `strict-origin-when-cross-origin` |
//!
//! `Server` and other headers that identify the implementation are stripped
//! rather than added.
//!
//! # Usage
//!
//! ```ignore
//! let app = Router::new().layer(axum::middleware::from_fn_with_state(
//!     SecureHeaders::default(),
//!     secure_headers_middleware,
//! ));
//! ```

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// The fixed set of headers added to every response, plus the set of
/// headers stripped before the response leaves the process.
#[derive(Clone)]
pub struct SecureHeaders {
    headers: Arc<Vec<(HeaderName, HeaderValue)>>,
    strip: Arc<Vec<HeaderName>>,
}

impl SecureHeaders {
    /// Create a builder for custom header configuration.
    pub fn builder() -> SecureHeadersBuilder {
        SecureHeadersBuilder::new()
    }

    /// Returns a reference to the headers that will be added to responses.
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    /// Apply this configuration to a response in place.
    pub fn apply(&self, response: &mut Response) {
        for name in self.strip.iter() {
            response.headers_mut().remove(name);
        }
        for (name, value) in self.headers.iter() {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
}

impl Default for SecureHeaders {
    fn default() -> Self {
        SecureHeadersBuilder::new().build()
    }
}

/// Tower/axum middleware that applies [`SecureHeaders`] to every response.
///
/// Wire with `axum::middleware::from_fn_with_state(secure_headers, secure_headers_middleware)`
/// as the first layer in the security chain (C4 step 1).
pub async fn secure_headers_middleware(
    State(headers): State<SecureHeaders>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    headers.apply(&mut response);
    response
}

/// Builder for [`SecureHeaders`].
pub struct SecureHeadersBuilder {
    content_type_options: bool,
    frame_options: Option<String>,
    hsts: bool,
    hsts_max_age: u64,
    hsts_include_subdomains: bool,
    xss_protection: bool,
    referrer_policy: Option<String>,
    content_security_policy: Option<String>,
    permissions_policy: Option<String>,
    strip_server_header: bool,
}

impl SecureHeadersBuilder {
    fn new() -> Self {
        Self {
            content_type_options: true,
            frame_options: Some("DENY".to_string()),
            hsts: true,
            hsts_max_age: 31536000,
            hsts_include_subdomains: true,
            xss_protection: true,
            referrer_policy: Some("strict-origin-when-cross-origin".to_string()),
            content_security_policy: None,
            permissions_policy: None,
            strip_server_header: true,
        }
    }

    /// Enable or disable `X-Content-Type-Options: nosniff`.
    pub fn content_type_options(mut self, enabled: bool) -> Self {
        self.content_type_options = enabled;
        self
    }

    /// Set the `X-Frame-Options` value (e.g. `"DENY"`, `"SAMEORIGIN"`).
    pub fn frame_options(mut self, value: impl Into<String>) -> Self {
        self.frame_options = Some(value.into());
        self
    }

    /// Disable `X-Frame-Options`.
    pub fn no_frame_options(mut self) -> Self {
        self.frame_options = None;
        self
    }

    /// Enable or disable `Strict-Transport-Security`.
    pub fn hsts(mut self, enabled: bool) -> Self {
        self.hsts = enabled;
        self
    }

    /// Set the `max-age` value for HSTS (in seconds).
    pub fn hsts_max_age(mut self, seconds: u64) -> Self {
        self.hsts_max_age = seconds;
        self
    }

    /// Enable or disable `includeSubDomains` in the HSTS header.
    pub fn hsts_include_subdomains(mut self, include: bool) -> Self {
        self.hsts_include_subdomains = include;
        self
    }

    /// Enable or disable the `X-XSS-Protection` header.
    pub fn xss_protection(mut self, enabled: bool) -> Self {
        self.xss_protection = enabled;
        self
    }

    /// Set `Referrer-Policy`.
    pub fn referrer_policy(mut self, value: impl Into<String>) -> Self {
        self.referrer_policy = Some(value.into());
        self
    }

    /// Set `Content-Security-Policy`.
    pub fn content_security_policy(mut self, value: impl Into<String>) -> Self {
        self.content_security_policy = Some(value.into());
        self
    }

    /// Set `Permissions-Policy`.
    pub fn permissions_policy(mut self, value: impl Into<String>) -> Self {
        self.permissions_policy = Some(value.into());
        self
    }

    /// Whether to strip the `Server` response header (default: `true`).
    pub fn strip_server_header(mut self, strip: bool) -> Self {
        self.strip_server_header = strip;
        self
    }

    /// Build the [`SecureHeaders`] configuration.
    pub fn build(self) -> SecureHeaders {
        let mut headers = Vec::new();

        if self.content_type_options {
            headers.push((
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            ));
        }

        if let Some(ref fo) = self.frame_options {
            if let Ok(val) = HeaderValue::from_str(fo) {
                headers.push((HeaderName::from_static("x-frame-options"), val));
            }
        }

        if self.hsts {
            let value = if self.hsts_include_subdomains {
                format!("max-age={}; includeSubDomains", self.hsts_max_age)
            } else {
                format!("max-age={}", self.hsts_max_age)
            };
            if let Ok(val) = HeaderValue::from_str(&value) {
                headers.push((HeaderName::from_static("strict-transport-security"), val));
            }
        }

        if self.xss_protection {
            headers.push((
                HeaderName::from_static("x-xss-protection"),
                HeaderValue::from_static("0"),
            ));
        }

        if let Some(ref rp) = self.referrer_policy {
            if let Ok(val) = HeaderValue::from_str(rp) {
                headers.push((HeaderName::from_static("referrer-policy"), val));
            }
        }

        if let Some(ref csp) = self.content_security_policy {
            if let Ok(val) = HeaderValue::from_str(csp) {
                headers.push((HeaderName::from_static("content-security-policy"), val));
            }
        }

        if let Some(ref pp) = self.permissions_policy {
            if let Ok(val) = HeaderValue::from_str(pp) {
                headers.push((HeaderName::from_static("permissions-policy"), val));
            }
        }

        let strip = if self.strip_server_header {
            vec![HeaderName::from_static("server")]
        } else {
            Vec::new()
        };

        SecureHeaders {
            headers: Arc::new(headers),
            strip: Arc::new(strip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_headers_include_hsts_and_frame_deny() {
        let h = SecureHeaders::default();
        let names: Vec<_> = h.headers().iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"strict-transport-security"));
        assert!(names.contains(&"x-frame-options"));
        assert!(names.contains(&"x-content-type-options"));
    }

    #[test]
    fn apply_strips_server_header_by_default() {
        let h = SecureHeaders::default();
        let mut response = Response::new(axum::body::Body::empty());
        response
            .headers_mut()
            .insert("server", HeaderValue::from_static("teacher/1.0"));
        h.apply(&mut response);
        assert!(!response.headers().contains_key("server"));
    }

    #[test]
    fn custom_csp_is_applied() {
        let h = SecureHeadersBuilder::new()
            .content_security_policy("default-src 'self'")
            .build();
        let mut response = Response::new(axum::body::Body::empty());
        h.apply(&mut response);
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'self'"
        );
    }
}
