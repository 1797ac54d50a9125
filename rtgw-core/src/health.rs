//! Health and lifecycle: liveness/readiness/startup probes plus the
//! `STARTING -> STARTED -> READY -> SHUTTING_DOWN` state machine (C11).
//!
//! # Endpoints
//!
//! | Path                 | Description                                      |
//! |-----------------------|--------------------------------------------------|
//! | `GET /health`         | Aggregated status — 200 if UP, 503 if DOWN        |
//! | `GET /health/live`    | Liveness probe — 200 unless the process is wedged |
//! | `GET /health/ready`   | Readiness probe — 200 only once lifecycle is READY and all readiness-affecting checks pass |
//! | `GET /health/startup` | Startup probe — 200 once lifecycle has left STARTING |
//!
//! # Example
//!
//! ```ignore
//! use rtgw_core::health::{HealthIndicator, HealthStatus};
//!
//! struct PrincipalStoreHealth { store: Arc<dyn PrincipalStore> }
//!
//! impl HealthIndicator for PrincipalStoreHealth {
//!     fn name(&self) -> &str { "principal_store" }
//!     async fn check(&self) -> HealthStatus {
//!         match self.store.ping().await {
//!             Ok(_) => HealthStatus::Up,
//!             Err(e) => HealthStatus::Down(e.to_string()),
//!         }
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down(String),
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }
}

/// A named health indicator registered against the gateway's health state.
///
/// Indicators back soft dependencies (principal store, metric sink, etc.):
/// a `Down` indicator degrades readiness without affecting liveness unless
/// `affects_readiness` is overridden to `false`.
pub trait HealthIndicator: Send + Sync + 'static {
    /// The name of this health check (e.g. `"principal_store"`).
    fn name(&self) -> &str;

    /// Perform the health check.
    fn check(&self) -> impl std::future::Future<Output = HealthStatus> + Send;

    /// Whether this check affects the readiness probe (default: `true`).
    fn affects_readiness(&self) -> bool {
        true
    }
}

/// A single check result in the health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthCheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckStatus {
    Up,
    Down,
}

/// Aggregated health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthCheckStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

/// Object-safe wrapper for [`HealthIndicator`], so a heterogeneous set of
/// indicators can be stored behind `Box<dyn _>`.
#[doc(hidden)]
pub trait HealthIndicatorErased: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn check(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = HealthStatus> + Send + '_>>;
    fn affects_readiness(&self) -> bool;
}

impl<T: HealthIndicator> HealthIndicatorErased for T {
    fn name(&self) -> &str {
        HealthIndicator::name(self)
    }

    fn check(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = HealthStatus> + Send + '_>> {
        Box::pin(HealthIndicator::check(self))
    }

    fn affects_readiness(&self) -> bool {
        HealthIndicator::affects_readiness(self)
    }
}

/// Builder for assembling health checks into a [`HealthState`].
pub struct HealthBuilder {
    checks: Vec<Box<dyn HealthIndicatorErased>>,
    cache_ttl: Option<Duration>,
}

impl HealthBuilder {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            cache_ttl: None,
        }
    }

    /// Register a health check.
    pub fn check<H: HealthIndicator>(mut self, indicator: H) -> Self {
        self.checks.push(Box::new(indicator));
        self
    }

    /// Cache check results for the given duration before re-running them.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Build the [`HealthState`], bound to a [`Lifecycle`].
    pub fn build(self, lifecycle: Arc<Lifecycle>) -> Arc<HealthState> {
        Arc::new(HealthState {
            checks: self.checks,
            start_time: Instant::now(),
            cache_ttl: self.cache_ttl,
            cache: tokio::sync::RwLock::new(None),
            lifecycle,
        })
    }
}

impl Default for HealthBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The gateway's process-lifetime state (C11): `STARTING -> STARTED ->
/// READY -> SHUTTING_DOWN`. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Starting = 0,
    Started = 1,
    Ready = 2,
    ShuttingDown = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Started,
            2 => LifecycleState::Ready,
            _ => LifecycleState::ShuttingDown,
        }
    }
}

/// Atomic handle on the process [`LifecycleState`], shared across the
/// health handlers, the gateway's connection table, and the shutdown path.
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(LifecycleState::Starting as u8),
        })
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `STARTED` (router assembled, not yet accepting readiness).
    pub fn mark_started(&self) {
        self.state
            .store(LifecycleState::Started as u8, Ordering::SeqCst);
    }

    /// Move to `READY` (all startup checks have passed, traffic accepted).
    pub fn mark_ready(&self) {
        self.state
            .store(LifecycleState::Ready as u8, Ordering::SeqCst);
    }

    /// Move to `SHUTTING_DOWN` (readiness probe starts failing, connection
    /// draining begins).
    pub fn mark_shutting_down(&self) {
        self.state
            .store(LifecycleState::ShuttingDown as u8, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.get() == LifecycleState::Ready
    }

    pub fn has_left_starting(&self) -> bool {
        self.get() != LifecycleState::Starting
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Starting as u8),
        }
    }
}

/// Shared state for health check handlers.
pub struct HealthState {
    checks: Vec<Box<dyn HealthIndicatorErased>>,
    start_time: Instant,
    cache_ttl: Option<Duration>,
    cache: tokio::sync::RwLock<Option<(HealthResponse, Instant)>>,
    lifecycle: Arc<Lifecycle>,
}

impl HealthState {
    async fn run_checks(&self, readiness_only: bool) -> HealthResponse {
        let mut checks = Vec::with_capacity(self.checks.len());
        let mut all_up = true;

        for indicator in &self.checks {
            if readiness_only && !indicator.affects_readiness() {
                continue;
            }
            let start = Instant::now();
            let status = indicator.check().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (check_status, reason) = match &status {
                HealthStatus::Up => (HealthCheckStatus::Up, None),
                HealthStatus::Down(r) => {
                    all_up = false;
                    (HealthCheckStatus::Down, Some(r.clone()))
                }
            };
            checks.push(HealthCheck {
                name: indicator.name().to_string(),
                status: check_status,
                reason,
                duration_ms: Some(duration_ms),
            });
        }

        HealthResponse {
            status: if all_up {
                HealthCheckStatus::Up
            } else {
                HealthCheckStatus::Down
            },
            checks,
            uptime_seconds: Some(self.start_time.elapsed().as_secs()),
        }
    }

    pub async fn aggregate(&self) -> HealthResponse {
        if let Some(ttl) = self.cache_ttl {
            let cache = self.cache.read().await;
            if let Some((ref response, ref timestamp)) = *cache {
                if timestamp.elapsed() < ttl {
                    return response.clone();
                }
            }
        }

        let response = self.run_checks(false).await;

        if self.cache_ttl.is_some() {
            let mut cache = self.cache.write().await;
            *cache = Some((response.clone(), Instant::now()));
        }

        response
    }

    /// Aggregate only checks that affect readiness, gated on lifecycle state.
    pub async fn aggregate_readiness(&self) -> HealthResponse {
        if !self.lifecycle.is_ready() {
            return HealthResponse {
                status: HealthCheckStatus::Down,
                checks: vec![HealthCheck {
                    name: "lifecycle".to_string(),
                    status: HealthCheckStatus::Down,
                    reason: Some(format!("{:?}", self.lifecycle.get())),
                    duration_ms: None,
                }],
                uptime_seconds: Some(self.start_time.elapsed().as_secs()),
            };
        }
        self.run_checks(true).await
    }
}

/// Handler: GET /health — aggregated status, independent of lifecycle.
pub(crate) async fn health_handler(
    state: State<Arc<HealthState>>,
) -> impl IntoResponse {
    let response = state.aggregate().await;
    let status_code = if response.status == HealthCheckStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, axum::Json(response))
}

/// Handler: GET /health/live — always 200 once the process can answer HTTP.
pub(crate) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handler: GET /health/ready — 200 only once lifecycle is READY and all
/// readiness-affecting checks pass.
pub(crate) async fn readiness_handler(
    state: State<Arc<HealthState>>,
) -> impl IntoResponse {
    let response = state.aggregate_readiness().await;
    let status_code = if response.status == HealthCheckStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, axum::Json(response))
}

/// Handler: GET /health/startup — 200 once lifecycle has left STARTING.
pub(crate) async fn startup_handler(state: State<Arc<HealthState>>) -> impl IntoResponse {
    if state.lifecycle.has_left_starting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Build the standard health router (`/health`, `/health/live`,
/// `/health/ready`, `/health/startup`) bound to the given state.
pub fn health_router(state: Arc<HealthState>) -> axum::Router {
    use axum::routing::get;
    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/health/startup", get(startup_handler))
        .with_state(state)
}
