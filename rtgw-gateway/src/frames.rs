//! The WebSocket JSON frame taxonomy (spec §6): the two closed sets of
//! messages the gateway accepts from and emits to clients.

use rtgw_security::policy::Filters;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame accepted from a client connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe(TopicFilters),
    Unsubscribe(TopicFilters),
    Ping(Empty),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicFilters {
    pub topic: String,
    #[serde(default)]
    pub filters: Filters,
}

/// `{}` — the `ping` frame carries no data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Empty {}

/// A minimal public-facing view of a [`rtgw_security::Principal`], carried
/// in the `connection_established` frame.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub role: String,
}

/// A frame emitted to a client connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished {
        #[serde(rename = "connectionId")]
        connection_id: String,
        user: UserInfo,
        timestamp: String,
    },
    SubscriptionConfirmed {
        topic: String,
        filters: Filters,
        #[serde(rename = "subscriptionKey")]
        subscription_key: String,
    },
    UnsubscriptionConfirmed {
        topic: String,
        filters: Filters,
    },
    SubscriptionData {
        topic: String,
        payload: Value,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    Error {
        message: String,
        timestamp: String,
    },
}

impl ServerFrame {
    /// Serialize to the single-line JSON text the writer puts on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame always serializes")
    }

    pub fn error(message: impl Into<String>, timestamp: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }
}
