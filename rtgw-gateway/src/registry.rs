//! Subscription Registry (C6): the bidirectional index between topics and
//! connections, plus the canonical subscription-key derivation.
//!
//! Both indices (`by_key`, `by_connection`) live inside a single
//! `std::sync::RwLock`-protected struct rather than two independently
//! locked maps, per spec §4.6/§9: a writer must see and mutate both
//! indices atomically, or a disconnect racing a subscribe could leave them
//! disagreeing. Readers (the Dispatcher's fan-out lookup) take the shared
//! read lock; every mutation takes the exclusive write lock.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use rtgw_security::policy::{Filters, Topic};

use crate::connection::ConnectionId;

pub type SubscriptionKey = String;

/// Canonicalize a filter map by sorted key order and serialize as
/// `topic:{k1=v1,k2=v2,...}` (spec §4.6). `Filters` is already a
/// `BTreeMap`, so iteration order is the sorted order by construction. An
/// empty filter map yields the wildcard key `topic:{}`.
pub fn subscription_key(topic: Topic, filters: &Filters) -> SubscriptionKey {
    let body = filters
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{topic}:{{{body}}}")
}

fn wildcard_key(topic: Topic) -> SubscriptionKey {
    format!("{topic}:{{}}")
}

struct Indices {
    by_key: HashMap<SubscriptionKey, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<SubscriptionKey>>,
}

/// The bidirectional subscription index (C6).
pub struct SubscriptionRegistry {
    indices: RwLock<Indices>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(Indices {
                by_key: HashMap::new(),
                by_connection: HashMap::new(),
            }),
        }
    }

    /// Register `connection` for `(topic, filters)`. Idempotent: a second
    /// call with logically equal filters does not duplicate entries.
    /// Returns the canonical subscription key.
    pub fn subscribe(&self, connection: ConnectionId, topic: Topic, filters: &Filters) -> SubscriptionKey {
        let key = subscription_key(topic, filters);
        let mut indices = self.indices.write().expect("registry lock poisoned");
        indices.by_key.entry(key.clone()).or_default().insert(connection);
        indices
            .by_connection
            .entry(connection)
            .or_default()
            .insert(key.clone());
        key
    }

    /// Remove `connection`'s subscription to `(topic, filters)`, if any.
    /// Idempotent.
    pub fn unsubscribe(&self, connection: ConnectionId, topic: Topic, filters: &Filters) {
        let key = subscription_key(topic, filters);
        let mut indices = self.indices.write().expect("registry lock poisoned");
        self.remove_key_for_connection(&mut indices, connection, &key);
    }

    fn remove_key_for_connection(&self, indices: &mut Indices, connection: ConnectionId, key: &SubscriptionKey) {
        if let Some(conns) = indices.by_key.get_mut(key) {
            conns.remove(&connection);
            if conns.is_empty() {
                indices.by_key.remove(key);
            }
        }
        if let Some(keys) = indices.by_connection.get_mut(&connection) {
            keys.remove(key);
            if keys.is_empty() {
                indices.by_connection.remove(&connection);
            }
        }
    }

    /// Remove every subscription belonging to `connection`, atomically
    /// under a single lock acquisition (spec §9's disconnect-cleanup note).
    pub fn disconnect(&self, connection: ConnectionId) {
        let mut indices = self.indices.write().expect("registry lock poisoned");
        let Some(keys) = indices.by_connection.remove(&connection) else {
            return;
        };
        for key in keys {
            if let Some(conns) = indices.by_key.get_mut(&key) {
                conns.remove(&connection);
                if conns.is_empty() {
                    indices.by_key.remove(&key);
                }
            }
        }
    }

    /// Union of connections subscribed to the exact `(topic, filters)` key
    /// and to the wildcard key for `topic` (spec §4.6, §4.10).
    pub fn candidates(&self, topic: Topic, filters: &Filters) -> HashSet<ConnectionId> {
        let exact = subscription_key(topic, filters);
        let wildcard = wildcard_key(topic);
        let indices = self.indices.read().expect("registry lock poisoned");
        let mut out = HashSet::new();
        if let Some(conns) = indices.by_key.get(&exact) {
            out.extend(conns.iter().copied());
        }
        if wildcard != exact {
            if let Some(conns) = indices.by_key.get(&wildcard) {
                out.extend(conns.iter().copied());
            }
        }
        out
    }

    /// Number of distinct subscription keys a connection holds. Test/debug
    /// helper.
    pub fn subscription_count(&self, connection: ConnectionId) -> usize {
        let indices = self.indices.read().expect("registry lock poisoned");
        indices
            .by_connection
            .get(&connection)
            .map(|keys| keys.len())
            .unwrap_or(0)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(pairs: &[(&str, &str)]) -> Filters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn subscription_key_is_stable_under_insertion_order() {
        let a = filters(&[("teamId", "t1"), ("userId", "u1")]);
        let b = filters(&[("userId", "u1"), ("teamId", "t1")]);
        assert_eq!(subscription_key(Topic::MetricUpdated, &a), subscription_key(Topic::MetricUpdated, &b));
    }

    #[test]
    fn empty_filters_produce_the_wildcard_key() {
        assert_eq!(subscription_key(Topic::TeamUpdated, &Filters::new()), "team_updated:{}");
    }

    #[test]
    fn candidates_union_exact_and_wildcard() {
        let registry = SubscriptionRegistry::new();
        let exact_conn = ConnectionId::new();
        let wildcard_conn = ConnectionId::new();
        registry.subscribe(exact_conn, Topic::MetricUpdated, &filters(&[("userId", "u1")]));
        registry.subscribe(wildcard_conn, Topic::MetricUpdated, &Filters::new());

        let candidates = registry.candidates(Topic::MetricUpdated, &filters(&[("userId", "u1")]));
        assert!(candidates.contains(&exact_conn));
        assert!(candidates.contains(&wildcard_conn));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let conn = ConnectionId::new();
        let f = filters(&[("userId", "u1")]);
        registry.subscribe(conn, Topic::AlertCreated, &f);
        registry.subscribe(conn, Topic::AlertCreated, &f);
        assert_eq!(registry.subscription_count(conn), 1);
        assert_eq!(registry.candidates(Topic::AlertCreated, &f).len(), 1);
    }

    #[test]
    fn subscribe_then_unsubscribe_leaves_no_trace() {
        let registry = SubscriptionRegistry::new();
        let conn = ConnectionId::new();
        let f = filters(&[("teamId", "t1")]);
        registry.subscribe(conn, Topic::TeamUpdated, &f);
        registry.unsubscribe(conn, Topic::TeamUpdated, &f);
        assert_eq!(registry.subscription_count(conn), 0);
        assert!(registry.candidates(Topic::TeamUpdated, &f).is_empty());
    }

    #[test]
    fn disconnect_atomically_purges_every_index_entry() {
        let registry = SubscriptionRegistry::new();
        let conn = ConnectionId::new();
        registry.subscribe(conn, Topic::MetricUpdated, &filters(&[("userId", "u1")]));
        registry.subscribe(conn, Topic::TeamUpdated, &filters(&[("teamId", "t1")]));
        registry.disconnect(conn);
        assert_eq!(registry.subscription_count(conn), 0);
        assert!(registry.candidates(Topic::MetricUpdated, &filters(&[("userId", "u1")])).is_empty());
        assert!(registry.candidates(Topic::TeamUpdated, &filters(&[("teamId", "t1")])).is_empty());
    }

    #[test]
    fn disconnect_of_unknown_connection_is_a_no_op() {
        let registry = SubscriptionRegistry::new();
        registry.disconnect(ConnectionId::new());
    }
}
