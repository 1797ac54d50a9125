//! The application-wide state threaded through the HTTP security chain,
//! the WebSocket accept handler, and the health/metrics routers.

use std::sync::Arc;

use rtgw_core::config::GatewayConfig;
use rtgw_core::health::HealthState;
use rtgw_ratelimit::{PreAuthRateLimitGuard, RateLimitRegistry};
use rtgw_security::{AccessControlPolicy, SessionStore, TokenVerifier};

use crate::gateway::Gateway;

/// Everything a request handler or middleware step might need, cloned
/// cheaply (every field is an `Arc` or already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<TokenVerifier>,
    pub sessions: Arc<SessionStore>,
    pub rate_limits: RateLimitRegistry,
    pub preauth_rate_limit: PreAuthRateLimitGuard,
    pub access_control: Arc<AccessControlPolicy>,
    pub gateway: Arc<Gateway>,
    pub health: Arc<HealthState>,
}
