//! Process configuration, parsed once at startup from the environment and
//! handed around as an `Arc<GatewayConfig>`.
//!
//! Mirrors the reference stack's preference for a single typed config
//! struct over scattered `std::env::var` calls, but without the YAML/`.env`
//! layered resolver: every value named here is a plain environment
//! variable, per spec §6.

use std::fmt;
use std::time::Duration;

/// A config value that must never appear in `Debug` output or logs.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***redacted***")
    }
}

/// Error produced while resolving configuration from the environment.
#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required environment variable {key}"),
            ConfigError::Invalid { key, reason } => {
                write!(f, "invalid value for {key}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Gateway-wide configuration, resolved once at process startup.
pub struct GatewayConfig {
    /// Shared secret (HS256) or PEM-encoded public key (RS256) used by the
    /// token verifier. Required.
    pub jwt_secret: Secret,
    /// Sliding rate-limit window (default 15 min).
    pub rate_limit_window: Duration,
    /// Requests allowed per source within the window (default 1000).
    pub rate_limit_max: u64,
    /// Maximum accepted request body size in bytes (default 10 MiB).
    pub body_size_max: u64,
    /// Heartbeat interval T_ping (default 30 s).
    pub ping_interval: Duration,
    /// Total shutdown drain budget T_drain (default 25 s).
    pub graceful_shutdown_timeout: Duration,
    /// Shared secret for the optional HMAC-SHA256 integrity header.
    pub integrity_secret: Option<Secret>,
    /// Session idle timeout T_sess (default 30 min).
    pub session_idle: Duration,
    /// CSRF token rotation interval (default: matches session idle).
    pub csrf_rotation: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("body_size_max", &self.body_size_max)
            .field("ping_interval", &self.ping_interval)
            .field("graceful_shutdown_timeout", &self.graceful_shutdown_timeout)
            .field("integrity_secret", &self.integrity_secret)
            .field("session_idle", &self.session_idle)
            .field("csrf_rotation", &self.csrf_rotation)
            .finish()
    }
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("`{v}` is not a valid integer"),
        }),
        Err(_) => Ok(default),
    }
}

impl GatewayConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: "must not be empty".into(),
            });
        }

        let rate_limit_window_ms = env_u64("RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000)?;
        let rate_limit_max = env_u64("RATE_LIMIT_MAX", 1000)?;
        let body_size_max = env_u64("BODY_SIZE_MAX", 10 * 1024 * 1024)?;
        let ping_interval_ms = env_u64("PING_INTERVAL_MS", 30_000)?;
        let graceful_shutdown_timeout_ms = env_u64("GRACEFUL_SHUTDOWN_TIMEOUT_MS", 25_000)?;
        let session_idle_ms = env_u64("SESSION_IDLE_MS", 30 * 60 * 1000)?;
        let csrf_rotation_ms = env_u64("CSRF_ROTATION_MS", session_idle_ms)?;
        let integrity_secret = std::env::var("INTEGRITY_SECRET").ok().filter(|s| !s.is_empty());

        Ok(Self {
            jwt_secret: Secret(jwt_secret),
            rate_limit_window: Duration::from_millis(rate_limit_window_ms),
            rate_limit_max,
            body_size_max,
            ping_interval: Duration::from_millis(ping_interval_ms),
            graceful_shutdown_timeout: Duration::from_millis(graceful_shutdown_timeout_ms),
            integrity_secret: integrity_secret.map(Secret),
            session_idle: Duration::from_millis(session_idle_ms),
            csrf_rotation: Duration::from_millis(csrf_rotation_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "JWT_SECRET",
            "RATE_LIMIT_WINDOW_MS",
            "RATE_LIMIT_MAX",
            "BODY_SIZE_MAX",
            "PING_INTERVAL_MS",
            "GRACEFUL_SHUTDOWN_TIMEOUT_MS",
            "INTEGRITY_SECRET",
            "SESSION_IDLE_MS",
            "CSRF_ROTATION_MS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_jwt_secret_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(matches!(
            GatewayConfig::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn defaults_match_spec() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("JWT_SECRET", "test-secret");
        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.rate_limit_window, Duration::from_secs(15 * 60));
        assert_eq!(config.rate_limit_max, 1000);
        assert_eq!(config.body_size_max, 10 * 1024 * 1024);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.graceful_shutdown_timeout, Duration::from_secs(25));
        assert_eq!(config.session_idle, Duration::from_secs(30 * 60));
        std::env::remove_var("JWT_SECRET");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("JWT_SECRET", "super-secret-value");
        std::env::set_var("INTEGRITY_SECRET", "another-secret");
        let config = GatewayConfig::from_env().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(!debug.contains("another-secret"));
        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("INTEGRITY_SECRET");
    }
}
