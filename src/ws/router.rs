//! Inbound frame decoding and dispatch.
//!
//! Text frames are JSON; binary frames are gzip-compressed JSON. Control
//! frames (`pong`, `ping`, auth acknowledgments, `no-router-found`) are
//! classified here and handed back to the session; everything else is parsed
//! by the client's [`Protocol`] into `(key, event)` pairs and queued in the
//! [`SubscriptionRegistry`].

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use crate::error::WsError;
use crate::ws::heartbeat::{HeartbeatMonitor, HeartbeatPolicy};
use crate::ws::key::SubscriptionKey;
use crate::ws::registry::SubscriptionRegistry;
use crate::ws::transport::ConnectRequest;

/// Error code the gateway sends when it has no stream for the venue.
pub const NO_ROUTER_FOUND: &str = "no-router-found";

/// The server's answer to authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Accepted,
    Rejected(String),
}

/// What a protocol made of one data frame.
#[derive(Debug)]
pub enum Routed<E> {
    /// Events to queue. May be empty when the frame was consumed elsewhere.
    Deliver(Vec<(SubscriptionKey, E)>),
    Unrouted,
}

/// The venue-specific half of a streaming client.
pub trait Protocol: Send + Sync + 'static {
    type Event: Clone + Send + Sync + 'static;

    /// Label used in logs.
    fn name(&self) -> &str;

    /// URL and headers for a fresh connection attempt.
    fn handshake(&self) -> Result<ConnectRequest, WsError>;

    /// Frame sent right after the transport opens, if the venue wants one.
    fn auth_frame(&self) -> Option<Value> {
        None
    }

    fn heartbeat_policy(&self) -> HeartbeatPolicy {
        HeartbeatPolicy::passive()
    }

    fn ping_frame(&self) -> Value {
        json!({"uri": "ping"})
    }

    /// Called once per session, after auth and before subscriptions are
    /// replayed. State tied to the previous session belongs here.
    fn on_session_ready(&self) {}

    /// Recognize an auth acknowledgment.
    fn auth_reply(&self, uri: &str, frame: &Value) -> Option<AuthReply> {
        (uri == "auth").then(|| auth_status(frame, false))
    }

    /// Parse one data frame.
    fn route(&self, uri: &str, frame: &Value) -> Routed<Self::Event>;
}

/// Read `code` (or `status`) from an auth frame.
///
/// With `strict`, a missing code is a rejection; otherwise only an explicit
/// non-`ok` code is.
pub fn auth_status(frame: &Value, strict: bool) -> AuthReply {
    let code = frame
        .get("code")
        .or_else(|| frame.get("status"))
        .and_then(Value::as_str);
    match code {
        Some("ok") | Some("connected") => AuthReply::Accepted,
        None if !strict => AuthReply::Accepted,
        other => {
            let message = frame
                .get("message")
                .and_then(Value::as_str)
                .or(other)
                .unwrap_or("no status");
            AuthReply::Rejected(message.to_string())
        }
    }
}

/// Decode a transport message to JSON.
///
/// `None` for transport-level frames (ping, pong, close) and for payloads that
/// fail to decode, which are logged.
pub fn decode(msg: &Message) -> Option<Value> {
    let text = match msg {
        Message::Text(text) => text.as_str().to_string(),
        Message::Binary(bytes) => match gunzip(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Dropping binary frame that is not gzip: {}", e);
                return None;
            }
        },
        _ => return None,
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Dropping frame that is not JSON: {} (raw: {})", e, text);
            None
        }
    }
}

pub fn gunzip(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

/// What the session should do after a frame was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Data frame; number of events queued.
    Delivered(usize),
    Pong,
    /// The server probed us; answer with `{"uri":"pong"}`.
    Ping,
    Auth(AuthReply),
    /// The gateway has no stream for this venue.
    Unsupported,
    Dropped,
}

pub struct MessageRouter<P: Protocol> {
    protocol: Arc<P>,
    registry: Arc<SubscriptionRegistry<P::Event>>,
}

impl<P: Protocol> MessageRouter<P> {
    pub fn new(protocol: Arc<P>, registry: Arc<SubscriptionRegistry<P::Event>>) -> Self {
        Self { protocol, registry }
    }

    pub fn route_message(&self, msg: &Message, heartbeat: &HeartbeatMonitor) -> RouteOutcome {
        match decode(msg) {
            Some(frame) => self.route(&frame, heartbeat),
            None => RouteOutcome::Dropped,
        }
    }

    pub fn route(&self, frame: &Value, heartbeat: &HeartbeatMonitor) -> RouteOutcome {
        let Some(uri) = frame.get("uri").and_then(Value::as_str) else {
            if frame.get("code").and_then(Value::as_str) == Some(NO_ROUTER_FOUND) {
                tracing::warn!(
                    client = self.protocol.name(),
                    "Streaming not available for this venue: {}",
                    frame
                );
                return RouteOutcome::Unsupported;
            }
            tracing::warn!(client = self.protocol.name(), "Dropping frame without uri: {}", frame);
            return RouteOutcome::Dropped;
        };

        match uri {
            "pong" => {
                heartbeat.record_ack(Instant::now());
                RouteOutcome::Pong
            }
            "ping" => RouteOutcome::Ping,
            _ => {
                if let Some(reply) = self.protocol.auth_reply(uri, frame) {
                    return RouteOutcome::Auth(reply);
                }
                match self.protocol.route(uri, frame) {
                    Routed::Deliver(events) => {
                        let mut queued = 0;
                        for (key, event) in events {
                            if self.registry.dispatch(&key, event) {
                                queued += 1;
                            } else {
                                tracing::warn!(
                                    client = self.protocol.name(),
                                    key = %key,
                                    "Dropping frame for unregistered subscription"
                                );
                            }
                        }
                        RouteOutcome::Delivered(queued)
                    }
                    Routed::Unrouted => {
                        tracing::warn!(
                            client = self.protocol.name(),
                            uri,
                            "Dropping unrouted frame"
                        );
                        RouteOutcome::Dropped
                    }
                }
            }
        }
    }
}
