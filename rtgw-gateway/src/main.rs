//! The realtime gateway binary: wires the HTTP surface named in spec §6
//! (`/health*`, `/metrics`, `/ws`) on top of the shared ambient stack —
//! tracing, CORS, panic recovery, request-id propagation, and Prometheus
//! request instrumentation — and drives the C11 lifecycle through startup
//! and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tracing::info;

use rtgw_core::config::GatewayConfig;
use rtgw_core::health::{HealthBuilder, Lifecycle};
use rtgw_core::layers::{catch_panic_layer, default_cors, default_trace, init_tracing};
use rtgw_core::request_id::request_id_middleware;
use rtgw_core::secure_headers::{secure_headers_middleware, SecureHeaders};
use rtgw_events::GatewayBus;
use rtgw_metrics::{metrics_handler, MetricsConfig, PrometheusLayer};
use rtgw_ratelimit::{InMemoryRateLimiter, PreAuthRateLimitGuard, RateLimit, RateLimitRegistry};
use rtgw_security::{AccessControlPolicy, KeySource, SecurityConfig, SessionStore, TokenVerifier};

use rtgw_gateway::dispatcher;
use rtgw_gateway::gateway::Gateway;
use rtgw_gateway::state::AppState;

/// Session sweeper cadence: run well inside the idle timeout so an expired
/// session never outlives it by more than this margin.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Arc::new(GatewayConfig::from_env().map_err(|err| {
        tracing::error!(%err, "failed to load configuration");
        err
    })?);

    let verifier = Arc::new(TokenVerifier::new(
        KeySource::hmac_secret(config.jwt_secret.expose()),
        SecurityConfig::hs256(),
    ));

    let sessions = SessionStore::new(config.session_idle, config.csrf_rotation);
    sessions.spawn_sweeper(SWEEP_INTERVAL);

    let rate_limits = RateLimitRegistry::new(InMemoryRateLimiter::new());
    let preauth_rate_limit =
        PreAuthRateLimitGuard::new(RateLimit::new(config.rate_limit_max, config.rate_limit_window.as_secs()));

    // No REST adapters are mounted by this binary (spec §1: GraphQL/REST
    // adapters are external collaborators), so there is no path prefix yet
    // that needs a role floor; the table starts empty and the traversal
    // guard (always unconditional) still applies to every path.
    let access_control = Arc::new(AccessControlPolicy::default());

    let bus = GatewayBus::new();
    let gateway = Arc::new(Gateway::new(bus, config.ping_interval));
    dispatcher::install(gateway.clone()).await;
    tokio::spawn(gateway.clone().run_heartbeat());

    let lifecycle = Lifecycle::new();
    lifecycle.mark_started();
    let health = HealthBuilder::new().build(lifecycle.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        verifier,
        sessions,
        rate_limits,
        preauth_rate_limit,
        access_control,
        gateway: gateway.clone(),
        health: health.clone(),
    });

    let secure_headers = SecureHeaders::default();

    // `security_chain_middleware` (C4: rate limit, scanner filter, sanitize,
    // SSRF, CSRF, integrity, access control) is not layered on this router.
    // It fronts non-WebSocket REST endpoints, and this binary serves none —
    // `/ws` authenticates via `Gateway::upgrade_handler` directly, and
    // `/health*`/`/metrics` are unauthenticated infra probes. The chain stays
    // dormant here until a REST surface is mounted; see `chain.rs` and
    // DESIGN.md for where it's exercised today.
    let app = Router::new()
        .route("/ws", get(Gateway::upgrade_handler))
        .route("/metrics", get(metrics_handler))
        .merge(rtgw_core::health::health_router(health))
        .layer(PrometheusLayer::new(MetricsConfig::default()))
        .layer(axum::middleware::from_fn_with_state(
            secure_headers,
            secure_headers_middleware,
        ))
        .layer(default_trace())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(catch_panic_layer())
        .layer(default_cors())
        .with_state(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "realtime gateway listening");

    lifecycle.mark_ready();

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle.mark_shutting_down();
    gateway.shutdown(config.graceful_shutdown_timeout).await;

    info!("realtime gateway stopped");
    Ok(())
}

/// Waits for Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for sigterm")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
