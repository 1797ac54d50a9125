//! Shared HTTP plumbing for the realtime gateway: errors, health/lifecycle,
//! security headers, configuration, and request-id propagation.

pub mod config;
pub mod error;
pub mod health;
pub mod layers;
pub mod request_id;
pub mod secure_headers;
pub mod types;

pub use error::HttpError;
pub use health::{HealthBuilder, HealthIndicator, HealthStatus, Lifecycle, LifecycleState};
pub use secure_headers::SecureHeaders;
