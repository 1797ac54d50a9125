//! Prometheus metrics for the gateway (C12 Observability, ambient stack):
//! a Tower layer tracking HTTP request counts/durations, a `/metrics`
//! handler exporting them in Prometheus text format, and the WebSocket
//! gauges/counters the gateway's connection lifecycle feeds directly.

pub mod handler;
pub mod layer;
mod metrics;

pub use handler::metrics_handler;
pub use layer::{PrometheusLayer, PrometheusService};
pub use metrics::{
    dec_in_flight, dec_ws_connections, encode_metrics, inc_in_flight, inc_ws_connections,
    inc_ws_drops, record_request, MetricsConfig,
};
