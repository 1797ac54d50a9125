//! Connection (C7): one live WebSocket, modeled as a reader task and a
//! writer task cooperating through a single bounded, single-producer
//! queue. The writer is the only task ever permitted to write the socket
//! (spec §5) — enforced structurally here by giving only the writer task
//! ownership of the sink half.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use futures_util::stream::SplitSink;
use axum::extract::ws::WebSocket;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use rtgw_security::Principal;

use crate::frames::ServerFrame;

/// Process-local, opaque connection identifier (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default bound on a Connection's outbound queue (Q_max, spec §5).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Policy applied when a Connection's outbound queue is full (spec §5,
/// §9). Drop-newest is the default; strict mode is the tested alternative
/// the spec requires be available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    DropNewest,
    Strict,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        BackpressurePolicy::DropNewest
    }
}

/// Per-connection state machine (spec §4.8). `Subscribing` is folded into
/// `Ready` here: both accept inbound frames identically, and the
/// distinction in the source described what the handler happened to be
/// doing, not an externally observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Ready = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Ready,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// A message queued for the writer task.
#[derive(Debug)]
pub enum OutboundMessage {
    Frame(ServerFrame),
    /// A protocol-level ping, sent by the heartbeat loop.
    Ping,
    Close { code: u16, reason: String },
}

/// Outcome of attempting to enqueue a frame onto a Connection's outbound
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Sent,
    /// Queue was full; drop-newest policy discarded the frame.
    Dropped,
    /// Queue was full under strict policy; caller must terminate the
    /// connection.
    Terminate,
    /// The connection is already closing/closed; nothing was sent.
    Closing,
}

/// The Gateway's handle on one live Connection: everything needed to
/// enqueue outbound frames and track liveness, without touching the socket
/// directly (the writer task owns that).
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub principal: Principal,
    sender: mpsc::Sender<OutboundMessage>,
    alive: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    policy: BackpressurePolicy,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        principal: Principal,
        sender: mpsc::Sender<OutboundMessage>,
        policy: BackpressurePolicy,
    ) -> Self {
        Self {
            id,
            principal,
            sender,
            alive: Arc::new(AtomicBool::new(true)),
            state: Arc::new(AtomicU8::new(ConnectionState::Connecting as u8)),
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Enqueue a frame, applying the configured backpressure policy if the
    /// queue is full (spec §4.7, §5). Never blocks.
    pub fn enqueue(&self, frame: ServerFrame) -> EnqueueOutcome {
        if matches!(self.state(), ConnectionState::Closing | ConnectionState::Closed) {
            return EnqueueOutcome::Closing;
        }
        match self.sender.try_send(OutboundMessage::Frame(frame)) {
            Ok(()) => EnqueueOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => match self.policy {
                BackpressurePolicy::DropNewest => EnqueueOutcome::Dropped,
                BackpressurePolicy::Strict => EnqueueOutcome::Terminate,
            },
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closing,
        }
    }

    /// Queue a protocol-level ping (heartbeat). Best-effort: a full queue
    /// here just means the heartbeat will catch this connection on the
    /// next cycle's missed-pong check.
    pub fn enqueue_ping(&self) {
        let _ = self.sender.try_send(OutboundMessage::Ping);
    }

    /// Queue a close frame and mark the connection closing so no further
    /// frame is accepted for write (spec §8's enqueue-time invariant).
    pub fn enqueue_close(&self, code: u16, reason: impl Into<String>) {
        self.set_state(ConnectionState::Closing);
        let _ = self.sender.try_send(OutboundMessage::Close {
            code,
            reason: reason.into(),
        });
    }
}

/// Run the writer task: the sole task permitted to write `sink`. Drains
/// `receiver` until the channel closes or a `Close` message is processed.
/// Each frame write is bounded by `write_timeout` (T_write, spec §5); a
/// timeout closes the connection with code 1011.
pub async fn run_writer(
    mut receiver: mpsc::Receiver<OutboundMessage>,
    mut sink: SplitSink<WebSocket, Message>,
    write_timeout: Duration,
) {
    use futures_util::SinkExt;

    while let Some(msg) = receiver.recv().await {
        let wire = match msg {
            OutboundMessage::Frame(frame) => Message::Text(frame.to_json().into()),
            OutboundMessage::Ping => Message::Ping(Vec::new().into()),
            OutboundMessage::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        };

        match tokio::time::timeout(write_timeout, sink.send(wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => break,
            Err(_) => {
                warn!("write timeout exceeded, closing connection with code 1011");
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: 1011,
                        reason: "write timeout".into(),
                    })))
                    .await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(policy: BackpressurePolicy, capacity: usize) -> (ConnectionHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle::new(ConnectionId::new(), Principal::anonymous(), tx, policy);
        handle.set_state(ConnectionState::Ready);
        (handle, rx)
    }

    #[test]
    fn enqueue_succeeds_while_queue_has_room() {
        let (handle, _rx) = handle(BackpressurePolicy::DropNewest, 4);
        assert_eq!(handle.enqueue(ServerFrame::error("x", "t")), EnqueueOutcome::Sent);
    }

    #[test]
    fn drop_newest_policy_discards_when_full() {
        let (handle, _rx) = handle(BackpressurePolicy::DropNewest, 1);
        assert_eq!(handle.enqueue(ServerFrame::error("a", "t")), EnqueueOutcome::Sent);
        assert_eq!(handle.enqueue(ServerFrame::error("b", "t")), EnqueueOutcome::Dropped);
    }

    #[test]
    fn strict_policy_signals_terminate_when_full() {
        let (handle, _rx) = handle(BackpressurePolicy::Strict, 1);
        assert_eq!(handle.enqueue(ServerFrame::error("a", "t")), EnqueueOutcome::Sent);
        assert_eq!(handle.enqueue(ServerFrame::error("b", "t")), EnqueueOutcome::Terminate);
    }

    #[test]
    fn no_frame_is_enqueued_once_closing() {
        let (handle, _rx) = handle(BackpressurePolicy::DropNewest, 4);
        handle.set_state(ConnectionState::Closing);
        assert_eq!(handle.enqueue(ServerFrame::error("x", "t")), EnqueueOutcome::Closing);
    }

    #[test]
    fn alive_flag_round_trips() {
        let (handle, _rx) = handle(BackpressurePolicy::DropNewest, 4);
        assert!(handle.is_alive());
        handle.set_alive(false);
        assert!(!handle.is_alive());
    }
}
