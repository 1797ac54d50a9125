//! Session Store (C2): a process-wide mapping from session id to [`Session`]
//! plus a mapping from session id to its current CSRF token.
//!
//! Grounded in the reference stack's `TtlCache` (a `DashMap` wrapped with
//! lazy expiry), but sessions carry their own `expires_at`/`invalidated`
//! state rather than a single cache-wide TTL, so the store manages a
//! `DashMap<SessionId, Session>` directly and runs its own sweeper.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rand::RngCore;

use crate::error::SecurityError;

pub type SessionId = String;

/// Server-side handle for CSRF binding (spec §3).
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub last_touched: u64,
    pub invalidated: bool,
}

#[derive(Debug, Clone)]
struct CsrfEntry {
    token: String,
    expires_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Generate an unforgeable, cryptographically strong 256-bit token,
/// hex-encoded.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time byte comparison, used for CSRF token validation so that
/// no token is distinguishable from another by timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Process-wide session + CSRF store (C2).
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    csrf: DashMap<SessionId, CsrfEntry>,
    session_idle: Duration,
    csrf_ttl: Duration,
    grace: Duration,
}

impl SessionStore {
    pub fn new(session_idle: Duration, csrf_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            csrf: DashMap::new(),
            session_idle,
            csrf_ttl,
            grace: Duration::from_secs(60),
        })
    }

    /// Create a new session for `user_id`, returning its id.
    pub fn create(&self, user_id: &str) -> SessionId {
        let id = random_token();
        let now = now_secs();
        self.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                user_id: user_id.to_string(),
                created_at: now,
                expires_at: now + self.session_idle.as_secs(),
                last_touched: now,
                invalidated: false,
            },
        );
        id
    }

    /// Fetch a session by id, touching its `last_touched`/`expires_at` if
    /// still valid. Returns `None` if absent, expired, or invalidated.
    pub fn get(&self, id: &str) -> Option<Session> {
        let mut entry = self.sessions.get_mut(id)?;
        let now = now_secs();
        if entry.invalidated || entry.expires_at < now {
            return None;
        }
        entry.last_touched = now;
        entry.expires_at = now + self.session_idle.as_secs();
        Some(entry.clone())
    }

    /// Mark a session invalidated (explicit logout). Idempotent.
    pub fn invalidate(&self, id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.invalidated = true;
        }
    }

    /// Issue a fresh CSRF token bound to `id`, replacing any existing one.
    pub fn issue_csrf(&self, id: &str) -> Result<String, SecurityError> {
        if self.get(id).is_none() {
            return Err(SecurityError::Validation("unknown or expired session".into()));
        }
        let token = random_token();
        self.csrf.insert(
            id.to_string(),
            CsrfEntry {
                token: token.clone(),
                expires_at: now_secs() + self.csrf_ttl.as_secs(),
            },
        );
        Ok(token)
    }

    /// Validate a CSRF token against the one bound to `id`, constant-time.
    pub fn validate_csrf(&self, id: &str, token: &str) -> bool {
        let Some(entry) = self.csrf.get(id) else {
            return false;
        };
        if entry.expires_at < now_secs() {
            return false;
        }
        constant_time_eq(&entry.token, token)
    }

    /// Remove expired or stale-invalidated records. Invalidated records are
    /// kept for a grace period so a racing request mid-flight still sees a
    /// coherent (if rejected) session.
    pub fn sweep(&self) {
        let now = now_secs();
        let grace = self.grace.as_secs();
        self.sessions.retain(|_, session| {
            if session.expires_at < now {
                return false;
            }
            if session.invalidated && now.saturating_sub(session.last_touched) > grace {
                return false;
            }
            true
        });
        self.csrf.retain(|id, entry| {
            entry.expires_at >= now && self.sessions.contains_key(id)
        });
    }

    /// Spawn the background sweeper task (runs every `interval`).
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_round_trips() {
        let store = SessionStore::new(Duration::from_secs(1800), Duration::from_secs(1800));
        let id = store.create("user-1");
        let session = store.get(&id).unwrap();
        assert_eq!(session.user_id, "user-1");
        assert!(!session.invalidated);
    }

    #[test]
    fn invalidate_makes_session_unreachable() {
        let store = SessionStore::new(Duration::from_secs(1800), Duration::from_secs(1800));
        let id = store.create("user-1");
        store.invalidate(&id);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn csrf_round_trip_succeeds_for_the_bound_session_only() {
        let store = SessionStore::new(Duration::from_secs(1800), Duration::from_secs(1800));
        let id_a = store.create("user-a");
        let id_b = store.create("user-b");
        let token_a = store.issue_csrf(&id_a).unwrap();

        assert!(store.validate_csrf(&id_a, &token_a));
        assert!(!store.validate_csrf(&id_b, &token_a));
        assert!(!store.validate_csrf(&id_a, "wrong-token"));
    }

    #[test]
    fn sweep_removes_expired_sessions() {
        let store = SessionStore::new(Duration::from_secs(0), Duration::from_secs(1800));
        let id = store.create("user-1");
        store.sweep();
        assert!(store.sessions.is_empty() || store.get(&id).is_none());
    }

    #[test]
    fn csrf_tokens_are_unforgeable_random_values() {
        let store = SessionStore::new(Duration::from_secs(1800), Duration::from_secs(1800));
        let id = store.create("user-1");
        let token_1 = store.issue_csrf(&id).unwrap();
        let token_2 = store.issue_csrf(&id).unwrap();
        assert_ne!(token_1, token_2);
        assert_eq!(token_1.len(), 64);
    }
}
