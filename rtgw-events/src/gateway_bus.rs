//! The gateway's PubSub Bus (C5): a process-local typed topic bus.
//!
//! Keyed by the closed [`Topic`] enumeration, with exactly one production
//! consumer: the Dispatcher (C10). Delivery is **at-most-once,
//! fire-and-forget, and synchronous with respect to the
//! producer** — `publish` awaits every subscriber in registration order
//! before returning, so within a single topic, events observed by a given
//! subscriber preserve publisher order. A subscriber that wants to queue
//! and return immediately is responsible for doing so itself (the
//! Dispatcher enqueues onto each Connection's outbound FIFO rather than
//! blocking on socket writes).
//!
//! A handler that panics is caught at the call site so a single bad
//! subscriber can't poison the bus for the others.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::error;

use rtgw_security::policy::Topic;

/// A single message on the bus.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub topic: Topic,
    pub payload: Value,
    /// Producer-assigned timestamp (ISO-8601), carried verbatim into the
    /// `subscription_data` frame rather than re-stamped by the dispatcher.
    pub timestamp: String,
}

impl GatewayEvent {
    pub fn new(topic: Topic, payload: Value, timestamp: impl Into<String>) -> Self {
        Self {
            topic,
            payload,
            timestamp: timestamp.into(),
        }
    }
}

type Subscriber =
    Arc<dyn Fn(Arc<GatewayEvent>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Topic-keyed, publisher-order-preserving pub/sub bus.
#[derive(Clone, Default)]
pub struct GatewayBus {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
}

impl GatewayBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`. Handlers for the same topic are
    /// invoked in registration order on every `publish`.
    pub async fn subscribe<F, Fut>(&self, topic: Topic, handler: F)
    where
        F: Fn(Arc<GatewayEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped: Subscriber = Arc::new(move |event| Box::pin(handler(event)));
        let mut subs = self.subscribers.write().await;
        subs.entry(topic).or_default().push(wrapped);
    }

    /// Publish `payload` to every subscriber of `topic`, awaiting each in
    /// turn so publisher order is preserved for a given topic. Never
    /// propagates a subscriber's panic to the caller.
    pub async fn publish(&self, topic: Topic, payload: Value, timestamp: impl Into<String>) {
        let event = Arc::new(GatewayEvent::new(topic, payload, timestamp));
        let subs = self.subscribers.read().await;
        if let Some(handlers) = subs.get(&topic) {
            for handler in handlers {
                let fut = handler(event.clone());
                if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                    error!(topic = topic.as_str(), "gateway bus subscriber panicked");
                }
            }
        }
    }

    /// Remove every registered subscriber. Intended for shutdown and tests.
    pub async fn clear(&self) {
        self.subscribers.write().await.clear();
    }
}
