//! The realtime WebSocket gateway: the HTTP security chain (C4) that
//! fronts every route, the subscription registry (C6), the per-connection
//! actor pair (C7), the connection table and heartbeat (C8), the wire
//! frame taxonomy (C6 data types), and the dispatcher (C10) that bridges
//! the PubSub Bus (C5) to live connections.

pub mod chain;
pub mod connection;
pub mod dispatcher;
pub mod frames;
pub mod gateway;
pub mod registry;
pub mod state;

pub use chain::{security_chain_middleware, SanitizedBody};
pub use connection::{
    BackpressurePolicy, ConnectionHandle, ConnectionId, ConnectionState, EnqueueOutcome,
};
pub use frames::{ClientFrame, ServerFrame, TopicFilters, UserInfo};
pub use gateway::{Gateway, WsQuery};
pub use registry::{SubscriptionKey, SubscriptionRegistry};
pub use state::AppState;
