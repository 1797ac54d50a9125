//! The process's Prometheus registry and the metrics it exports (spec §6):
//! `websocket_connections_active`, `websocket_outbound_drops_total`,
//! `http_requests_total`, `http_request_duration_seconds`, plus an
//! in-flight-request gauge used by [`crate::layer::PrometheusLayer`].
//!
//! Metrics are created once behind a [`OnceLock`] and registered into a
//! private [`Registry`] rather than the `prometheus` crate's global
//! default registry, so a process can in principle stand up more than one
//! gateway instance (e.g. in tests) without metric name collisions.

use std::sync::OnceLock;

use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};

/// Paths excluded from HTTP request tracking (e.g. `/metrics` itself).
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub exclude_paths: Vec<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            exclude_paths: vec!["/metrics".to_string(), "/health".to_string()],
        }
    }
}

struct Metrics {
    registry: Registry,
    in_flight: IntGauge,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    websocket_connections_active: IntGauge,
    websocket_outbound_drops_total: IntCounterVec,
}

fn metrics() -> &'static Metrics {
    static METRICS: OnceLock<Metrics> = OnceLock::new();
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let in_flight = IntGauge::new(
            "http_requests_in_flight",
            "Number of HTTP requests currently being handled",
        )
        .expect("metric construction is infallible for a static, valid name");
        registry
            .register(Box::new(in_flight.clone()))
            .expect("metric registered exactly once at process start");

        let http_requests_total = IntCounterVec::new(
            prometheus::Opts::new("http_requests_total", "Total HTTP requests handled"),
            &["method", "route", "status"],
        )
        .expect("metric construction is infallible for a static, valid name");
        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("metric registered exactly once at process start");

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request handling duration in seconds",
            ),
            &["method", "route", "status"],
        )
        .expect("metric construction is infallible for a static, valid name");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("metric registered exactly once at process start");

        let websocket_connections_active = IntGauge::new(
            "websocket_connections_active",
            "Number of WebSocket connections currently established",
        )
        .expect("metric construction is infallible for a static, valid name");
        registry
            .register(Box::new(websocket_connections_active.clone()))
            .expect("metric registered exactly once at process start");

        let websocket_outbound_drops_total = IntCounterVec::new(
            prometheus::Opts::new(
                "websocket_outbound_drops_total",
                "Outbound frames dropped because a connection's queue was full",
            ),
            &["reason"],
        )
        .expect("metric construction is infallible for a static, valid name");
        registry
            .register(Box::new(websocket_outbound_drops_total.clone()))
            .expect("metric registered exactly once at process start");

        Metrics {
            registry,
            in_flight,
            http_requests_total,
            http_request_duration_seconds,
            websocket_connections_active,
            websocket_outbound_drops_total,
        }
    })
}

pub fn inc_in_flight() {
    metrics().in_flight.inc();
}

pub fn dec_in_flight() {
    metrics().in_flight.dec();
}

/// Record a completed HTTP request: increments the counter and observes
/// the histogram for the `(method, route, status)` label set.
pub fn record_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    let labels = [method, route, status.as_str()];
    metrics()
        .http_requests_total
        .with_label_values(&labels)
        .inc();
    metrics()
        .http_request_duration_seconds
        .with_label_values(&labels)
        .observe(duration_secs);
}

/// A WebSocket connection was established. Call on every successful upgrade.
pub fn inc_ws_connections() {
    metrics().websocket_connections_active.inc();
}

/// A WebSocket connection was closed, for any reason. Call exactly once
/// per connection that previously called [`inc_ws_connections`].
pub fn dec_ws_connections() {
    metrics().websocket_connections_active.dec();
}

/// An outbound frame was dropped for a single connection's full queue
/// (spec §7 backpressure). `reason` is a short label, e.g. `"queue_full"`.
pub fn inc_ws_drops(reason: &str) {
    metrics()
        .websocket_outbound_drops_total
        .with_label_values(&[reason])
        .inc();
}

/// Render the current registry in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let families = metrics().registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .expect("encoding a gathered metric family never fails");
    String::from_utf8(buffer).expect("prometheus text output is always valid utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_gauge_tracks_increments_and_decrements() {
        inc_in_flight();
        inc_in_flight();
        let before = encode_metrics();
        assert!(before.contains("http_requests_in_flight 2"));
        dec_in_flight();
        let after = encode_metrics();
        assert!(after.contains("http_requests_in_flight 1"));
    }

    #[test]
    fn record_request_populates_counter_and_histogram() {
        record_request("GET", "/widgets/{id}", 200, 0.01);
        let text = encode_metrics();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains(r#"method="GET""#));
        assert!(text.contains(r#"route="/widgets/{id}""#));
        assert!(text.contains(r#"status="200""#));
        assert!(text.contains("http_request_duration_seconds"));
    }

    #[test]
    fn websocket_gauge_and_drop_counter_exported() {
        inc_ws_connections();
        inc_ws_drops("queue_full");
        let text = encode_metrics();
        assert!(text.contains("websocket_connections_active"));
        assert!(text.contains("websocket_outbound_drops_total"));
        assert!(text.contains(r#"reason="queue_full""#));
        dec_ws_connections();
    }

    #[test]
    fn default_config_excludes_metrics_and_health_paths() {
        let config = MetricsConfig::default();
        assert!(config.exclude_paths.contains(&"/metrics".to_string()));
        assert!(config.exclude_paths.contains(&"/health".to_string()));
    }
}
