//! Streaming layer: connection lifecycle and everything a session needs.
//!
//! - `connection`: [`StreamClient`], the supervisor task and state machine
//! - `heartbeat`: probe/ack bookkeeping that declares a session dead
//! - `backoff`: reconnect delays
//! - `registry`: subscription key → queue + handlers, replayed after reconnect
//! - `router`: frame decoding and dispatch through a client's [`Protocol`]
//! - `key`: channels, subscription requests and canonical keys
//! - `transport`: the socket seam (`tokio-tungstenite` in production)

pub mod backoff;
pub mod connection;
pub mod heartbeat;
pub mod key;
pub mod registry;
pub mod router;
pub mod transport;

use std::time::Duration;

use crate::config::StreamConfig;

pub use backoff::Backoff;
pub use connection::StreamClient;
pub use heartbeat::{HeartbeatMonitor, HeartbeatPolicy, HeartbeatStatus};
pub use key::{Channel, SubscriptionKey, SubscriptionRequest};
pub use registry::{handler, Handler, HandlerError, HandlerResult, SubscriptionRegistry};
pub use router::{AuthReply, MessageRouter, Protocol, RouteOutcome, Routed};
pub use transport::{ConnectRequest, Connector, Transport, TungsteniteConnector};

// ─── ConnectionState ─────────────────────────────────────────────────────────

/// Lifecycle of a streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport, nothing to stream.
    Idle,
    /// A connection is wanted (first subscribe, or recovery after a failure).
    GoingToConnect,
    /// Transport open, waiting for the server to acknowledge auth.
    Connecting,
    /// Authorized; subscriptions are live.
    Ready,
    /// The registry emptied; the transport is being closed.
    GoingToDisconnect,
    /// Stopped for good.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::GoingToConnect => "going-to-connect",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::GoingToDisconnect => "going-to-disconnect",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── WsConfig ────────────────────────────────────────────────────────────────

/// Configuration for one streaming client.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat: HeartbeatPolicy,
    /// Bound on opening the transport, and separately on the auth ack.
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatPolicy::passive(),
            connect_timeout: Duration::from_secs(30),
            backoff_initial: Duration::from_secs(2),
            backoff_max: Duration::from_secs(64),
        }
    }
}

impl WsConfig {
    /// Build from the `[stream]` config section with the given liveness model.
    ///
    /// Zero durations are raised to one second, and `backoff_max` to at least
    /// `backoff_initial`.
    pub fn from_stream_config(stream: &StreamConfig, mut heartbeat: HeartbeatPolicy) -> Self {
        let secs = |value: u64| Duration::from_secs(value.max(1));
        let interval = secs(stream.ping_interval_secs);
        // Keep the policy's timeout-to-interval ratio when the interval is tuned.
        let ratio = heartbeat.timeout.as_secs_f64() / heartbeat.interval.as_secs_f64();
        heartbeat.timeout = interval.mul_f64(ratio);
        heartbeat.interval = interval;
        let backoff_initial = secs(stream.backoff_initial_secs);
        Self {
            heartbeat,
            connect_timeout: secs(stream.connect_timeout_secs),
            backoff_initial,
            backoff_max: secs(stream.backoff_max_secs).max(backoff_initial),
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_initial, self.backoff_max)
    }
}
