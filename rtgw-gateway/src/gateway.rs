//! Gateway (C8): owns the Connection table, authenticates upgrades, routes
//! inbound frames, drives the heartbeat loop, and orchestrates shutdown.
//!
//! `Subscribing` from spec §4.8's state diagram is folded into `Ready` (see
//! `connection.rs`): both accept inbound frames identically.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use futures_util::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{info, warn};

use rtgw_security::policy::Topic;
use rtgw_security::{Principal, SecurityError};

use crate::connection::{
    BackpressurePolicy, ConnectionHandle, ConnectionId, ConnectionState, DEFAULT_QUEUE_CAPACITY,
};
use crate::frames::{ClientFrame, ServerFrame, UserInfo};
use crate::registry::SubscriptionRegistry;
use crate::state::AppState;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Query parameters accepted on the `/ws` upgrade (spec §6): the bearer
/// token may travel as a query parameter when a client can't set headers.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// The Gateway's connection table plus its collaborators (C8). Cloned
/// cheaply into every task that needs to enqueue frames or broadcast.
pub struct Gateway {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    registry: SubscriptionRegistry,
    bus: rtgw_events::GatewayBus,
    ping_interval: Duration,
    backpressure: BackpressurePolicy,
}

impl Gateway {
    pub fn new(bus: rtgw_events::GatewayBus, ping_interval: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            registry: SubscriptionRegistry::new(),
            bus,
            ping_interval,
            backpressure: BackpressurePolicy::default(),
        }
    }

    pub fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// The principal behind a live connection, if it still exists. Used by
    /// the Dispatcher (C10) to re-authorize a candidate at delivery time.
    pub fn principal_of(&self, id: ConnectionId) -> Option<Principal> {
        self.connections.get(&id).map(|entry| entry.principal.clone())
    }

    pub fn bus(&self) -> &rtgw_events::GatewayBus {
        &self.bus
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub fn test_insert(&self, id: ConnectionId, handle: Arc<ConnectionHandle>) {
        self.connections.insert(id, handle);
    }

    /// Axum handler for `GET /ws`: authenticate, upgrade, and hand off to
    /// [`Gateway::handle_socket`].
    pub async fn upgrade_handler(
        State(state): State<Arc<AppState>>,
        Query(query): Query<WsQuery>,
        ConnectInfo(_addr): ConnectInfo<SocketAddr>,
        headers: axum::http::HeaderMap,
        ws: WebSocketUpgrade,
    ) -> Response {
        let bearer = query
            .token
            .as_deref()
            .map(str::to_string)
            .or_else(|| {
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(str::to_string)
            });

        let Some(token) = bearer else {
            return close_before_upgrade(1008, "authentication required");
        };

        let principal = match state.verifier.verify(&token) {
            Ok(principal) => principal,
            Err(SecurityError::MissingCredential) => {
                return close_before_upgrade(1008, "authentication required");
            }
            Err(_) => return close_before_upgrade(1008, "invalid or expired token"),
        };

        let gateway = state.gateway.clone();
        ws.on_upgrade(move |socket| async move {
            gateway.handle_socket(socket, principal).await;
        })
    }

    /// Drives one accepted connection end to end: registers it, emits
    /// `connection_established`, reads inbound frames until the socket
    /// closes, then cleans up (spec §4.8 Accept + Route inbound).
    async fn handle_socket(self: Arc<Self>, socket: WebSocket, principal: Principal) {
        let (sink, mut stream) = socket.split();
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let id = ConnectionId::new();
        let handle = Arc::new(ConnectionHandle::new(id, principal.clone(), tx, self.backpressure));
        handle.set_state(ConnectionState::Ready);

        self.connections.insert(id, handle.clone());
        rtgw_metrics::inc_ws_connections();

        let writer = tokio::spawn(crate::connection::run_writer(rx, sink, WRITE_TIMEOUT));

        handle.enqueue(ServerFrame::ConnectionEstablished {
            connection_id: id.to_string(),
            user: UserInfo {
                id: principal.user_id.clone(),
                name: principal.display_name.clone(),
                role: principal.role.to_string(),
            },
            timestamp: now_iso8601(),
        });

        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(_) => break,
            };
            match message {
                Message::Text(text) => self.route_inbound(&handle, &text).await,
                Message::Pong(_) => handle.set_alive(true),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Binary(_) => {}
            }
            if handle.state() == ConnectionState::Closing {
                break;
            }
        }

        self.disconnect(id).await;
        let _ = writer.await;
    }

    /// Parse and route one inbound text frame (spec §4.8 Route inbound).
    async fn route_inbound(&self, handle: &Arc<ConnectionHandle>, raw: &str) {
        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                handle.enqueue(ServerFrame::error("Invalid message format", now_iso8601()));
                return;
            }
        };

        match frame {
            ClientFrame::Subscribe(tf) => self.handle_subscribe(handle, tf).await,
            ClientFrame::Unsubscribe(tf) => self.handle_unsubscribe(handle, tf),
            ClientFrame::Ping(_) => {
                handle.set_alive(true);
                handle.enqueue(ServerFrame::Pong {
                    timestamp: now_iso8601(),
                });
            }
        }
    }

    async fn handle_subscribe(&self, handle: &Arc<ConnectionHandle>, tf: crate::frames::TopicFilters) {
        let Some(topic) = Topic::parse(&tf.topic) else {
            handle.enqueue(ServerFrame::error("Invalid message format", now_iso8601()));
            return;
        };
        if !rtgw_security::authorize(&handle.principal, topic, &tf.filters) {
            handle.enqueue(ServerFrame::error(
                "Insufficient permissions for this subscription",
                now_iso8601(),
            ));
            return;
        }
        let key = self.registry.subscribe(handle.id, topic, &tf.filters);
        handle.enqueue(ServerFrame::SubscriptionConfirmed {
            topic: tf.topic,
            filters: tf.filters,
            subscription_key: key,
        });
    }

    fn handle_unsubscribe(&self, handle: &Arc<ConnectionHandle>, tf: crate::frames::TopicFilters) {
        if let Some(topic) = Topic::parse(&tf.topic) {
            self.registry.unsubscribe(handle.id, topic, &tf.filters);
        }
        handle.enqueue(ServerFrame::UnsubscriptionConfirmed {
            topic: tf.topic,
            filters: tf.filters,
        });
    }

    /// Remove a connection from the table and purge its subscriptions
    /// (spec §3's atomicity invariant — the registry purges both indices
    /// under one lock acquisition).
    async fn disconnect(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            self.registry.disconnect(id);
            rtgw_metrics::dec_ws_connections();
        }
    }

    /// The standard two-cycle liveness test (spec §4.8, §5): every
    /// `ping_interval`, a connection already marked dead from the prior
    /// cycle is closed; everyone else is marked dead and sent a ping, to be
    /// revived by the next pong.
    pub async fn run_heartbeat(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.ping_interval);
        loop {
            ticker.tick().await;
            let mut dead = Vec::new();
            for entry in self.connections.iter() {
                let handle = entry.value();
                if !handle.is_alive() {
                    handle.enqueue_close(1001, "heartbeat timeout");
                    dead.push(*entry.key());
                } else {
                    handle.set_alive(false);
                    handle.enqueue_ping();
                }
            }
            for id in dead {
                self.disconnect(id).await;
            }
        }
    }

    fn find_by(&self, predicate: impl Fn(&Principal) -> bool) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .filter(|entry| predicate(&entry.value().principal))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Direct write to every connection belonging to `user_id`, bypassing
    /// the subscription registry (spec §4.8 broadcast helper).
    pub fn broadcast_to_user(&self, user_id: &str, frame: ServerFrame) {
        for handle in self.find_by(|p| p.user_id == user_id) {
            if handle.enqueue(frame.clone()) == crate::connection::EnqueueOutcome::Dropped {
                rtgw_metrics::inc_ws_drops("queue_full");
            }
        }
    }

    /// Direct write to every connection whose principal belongs to
    /// `team_id`, bypassing the subscription registry.
    pub fn broadcast_to_team(&self, team_id: &str, frame: ServerFrame) {
        for handle in self.find_by(|p| p.has_team(team_id)) {
            if handle.enqueue(frame.clone()) == crate::connection::EnqueueOutcome::Dropped {
                rtgw_metrics::inc_ws_drops("queue_full");
            }
        }
    }

    /// Dispatcher entry point: enqueue `frame` on `connection_id` if it is
    /// still live, recording a drop counter on a full queue.
    pub fn deliver(&self, connection_id: ConnectionId, frame: ServerFrame) {
        if let Some(handle) = self.connections.get(&connection_id) {
            match handle.enqueue(frame) {
                crate::connection::EnqueueOutcome::Dropped => {
                    rtgw_metrics::inc_ws_drops("queue_full");
                }
                crate::connection::EnqueueOutcome::Terminate => {
                    warn!(connection = %connection_id, "strict backpressure: terminating connection");
                    handle.enqueue_close(1011, "outbound queue overflow");
                }
                _ => {}
            }
        }
    }

    /// Shutdown orchestration (spec §9's fixed order): the caller is
    /// expected to have already stopped accepting new upgrades and
    /// cancelled the heartbeat timer before calling this. Sends close 1001
    /// to every connection and waits up to `drain_budget` before returning.
    pub async fn shutdown(&self, drain_budget: Duration) {
        for entry in self.connections.iter() {
            entry.value().enqueue_close(1001, "server shutting down");
        }
        let deadline = tokio::time::Instant::now() + drain_budget;
        while tokio::time::Instant::now() < deadline && !self.connections.is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let remaining = self.connections.len();
        if remaining > 0 {
            warn!(remaining, "shutdown drain budget exceeded, hard-terminating");
        }
        self.connections.clear();
        self.bus.clear().await;
        info!("gateway shutdown complete");
    }
}

fn close_before_upgrade(code: u16, reason: &'static str) -> Response {
    (
        axum::http::StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "error": "unauthorized", "message": reason, "close_code": code })),
    )
        .into_response()
}
