//! Security Middleware Chain (C4): the fixed, ordered sequence of filters
//! applied to every HTTP request before the gateway's own handlers run
//! (spec §4.4). Implemented as one function, rather than eleven
//! independently stacked `tower::Layer`s, so the order that is part of the
//! contract stays visible and testable as a unit: moving step 5 before
//! step 2 would let an oversized payload reach the sanitizer before the
//! size limit rejects it.
//!
//! Step 1 (crypto response headers) is `rtgw_core::secure_headers`,
//! layered outside this function since it only touches the outgoing
//! response. Step 11 (security logging) happens here, after `next` runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use rtgw_core::HttpError;
use rtgw_security::access_control::reject_path_traversal;
use rtgw_security::sanitize::sanitize_json;
use rtgw_security::{integrity, scanner, ssrf, Principal, SecurityError};

use crate::state::AppState;

/// Body bytes beyond this bound are never buffered, even speculatively;
/// `to_bytes` is capped at `body_size_max + 1` so an oversized streamed
/// body is caught without reading it in full.
fn state_changing(method: &Method) -> bool {
    matches!(method, &Method::POST | &Method::PUT | &Method::PATCH | &Method::DELETE)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// The chain's single entry point. Register as the innermost `.layer()`
/// on every router that fronts non-WebSocket HTTP endpoints; the
/// WebSocket upgrade handler runs its own compact variant (spec §4.8)
/// instead of this one.
pub async fn security_chain_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let source = addr.ip().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // Step 2: body size limit (413).
    let (parts, body) = req.into_parts();
    let limit = state.config.body_size_max as usize;
    let body_bytes = match to_bytes(body, limit.saturating_add(1)).await {
        Ok(bytes) if bytes.len() > limit => {
            return HttpError::PayloadTooLarge(format!(
                "request body exceeds {limit} bytes"
            ))
            .into_response();
        }
        Ok(bytes) => bytes,
        Err(_) => {
            return HttpError::PayloadTooLarge(format!(
                "request body exceeds {limit} bytes"
            ))
            .into_response();
        }
    };

    // Step 3: rate limit, keyed purely by source address (429).
    if !state.preauth_rate_limit.try_acquire(&state.rate_limits, &source) {
        return HttpError::RateLimited("Too many requests, please try again later".into())
            .into_response();
    }

    // Step 4: component filter — known scanner signatures (403).
    let user_agent = parts
        .headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if scanner::is_known_scanner(user_agent) {
        return SecurityError::Forbidden("request denied".into()).into_response();
    }

    // Step 5: input sanitize — parsed body (empty/non-JSON bodies sanitize
    // to an empty object; handlers that need the sanitized value read it
    // from the request extension inserted below rather than re-parsing
    // the raw body, which is preserved untouched for step 9's integrity
    // check).
    let parsed_body: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Object(Default::default()))
    };
    let sanitized_body = sanitize_json(parsed_body);

    // Step 6: SSRF filter over the sanitized body's `url`/`callback` fields (400).
    if let Err(err) = ssrf::check_body(&sanitized_body) {
        return err.into_response();
    }

    // Step 7: authentication — attach Principal on success, anonymous otherwise.
    let bearer = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let principal = match state.verifier.verify_optional(bearer) {
        Ok(principal) => principal,
        Err(_) => Principal::anonymous(),
    };

    // Step 8: session/CSRF, required for state-changing methods only (403).
    if state_changing(&method) {
        let session_id = parts
            .headers
            .get("x-session-id")
            .and_then(|v| v.to_str().ok());
        let csrf_token = parts
            .headers
            .get("x-csrf-token")
            .and_then(|v| v.to_str().ok());
        match (session_id, csrf_token) {
            (Some(sid), Some(token)) => {
                if state.sessions.get(sid).is_none() || !state.sessions.validate_csrf(sid, token) {
                    let response = SecurityError::CsrfMismatch.into_response();
                    log_if_security_relevant(response.status().as_u16(), &source, &path, &principal);
                    return response;
                }
            }
            _ => {
                let response = SecurityError::CsrfMismatch.into_response();
                log_if_security_relevant(response.status().as_u16(), &source, &path, &principal);
                return response;
            }
        }
    }

    // Step 9: integrity — only enforced when both a signing secret is
    // configured and the request carries a signature header (400).
    if let Some(secret) = state.config.integrity_secret.as_ref() {
        if let Some(signature) = parts
            .headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
        {
            let timestamp = parts
                .headers
                .get("x-timestamp")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if let Err(err) = integrity::verify(
                secret.expose(),
                &body_bytes,
                timestamp,
                signature,
                integrity::DEFAULT_SKEW,
            ) {
                return err.into_response();
            }
        }
    }

    // Step 10: access control — traversal guard is unconditional, then the
    // role-based rule set (admin bypasses both the table and nothing else;
    // the traversal guard applies to every caller).
    if let Err(err) = reject_path_traversal(&path) {
        return err.into_response();
    }
    if let Err(err) = state.access_control.evaluate(&principal, &path) {
        let response = err.into_response();
        log_if_security_relevant(response.status().as_u16(), &source, &path, &principal);
        return response;
    }

    let mut req = Request::from_parts(parts, Body::from(body_bytes));
    req.extensions_mut().insert(SanitizedBody(sanitized_body));
    req.extensions_mut().insert(principal.clone());

    let response = next.run(req).await;

    // Step 11: security logging — only for responses the spec calls out.
    log_if_security_relevant(response.status().as_u16(), &source, &path, &principal);

    response
}

/// The sanitized request body, available to handlers via
/// `Extension<SanitizedBody>` instead of re-parsing the raw bytes.
#[derive(Clone)]
pub struct SanitizedBody(pub serde_json::Value);

fn log_if_security_relevant(status: u16, source: &str, path: &str, principal: &Principal) {
    if matches!(status, 401 | 403 | 429) {
        warn!(
            timestamp = now_unix(),
            source,
            path,
            status,
            principal = if principal.is_anonymous() {
                "anonymous"
            } else {
                principal.user_id.as_str()
            },
            "security event"
        );
    }
}
