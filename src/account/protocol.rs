//! The trading stream: signed handshake, strict auth, `info` and `order`
//! channels.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::auth::Credentials;
use crate::domain::order::{Order, OrderTracker};
use crate::domain::Info;
use crate::error::WsError;
use crate::ws::router::auth_status;
use crate::ws::{
    AuthReply, Channel, ConnectRequest, HeartbeatPolicy, Protocol, Routed, SubscriptionRequest,
};

pub const INFO: Channel = Channel::new("info", "sub-info", "unsub-info");
pub const ORDER: Channel = Channel::new("order", "sub-order", "unsub-order");

/// One decoded trading-stream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountEvent {
    Info(Info),
    Order(Order),
}

pub struct AccountProtocol {
    label: String,
    url: String,
    account_name: String,
    credentials: Credentials,
    tracker: Arc<OrderTracker>,
}

impl AccountProtocol {
    pub fn new(
        label: impl Into<String>,
        url: impl Into<String>,
        account_name: impl Into<String>,
        credentials: Credentials,
        tracker: Arc<OrderTracker>,
    ) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            account_name: account_name.into(),
            credentials,
            tracker,
        }
    }

    /// Payload of a `{"status": .., "data": ..}` frame, `None` (logged) on an
    /// error status or a payload that does not parse.
    fn payload<T: DeserializeOwned>(&self, uri: &str, frame: &Value) -> Option<T> {
        let status = frame.get("status").and_then(Value::as_str).unwrap_or("ok");
        if status != "ok" {
            tracing::warn!(client = %self.label, uri, "Error frame: {}", frame);
            return None;
        }
        let data = frame.get("data").cloned().unwrap_or(Value::Null);
        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(client = %self.label, uri, "Malformed payload: {}", e);
                None
            }
        }
    }
}

impl Protocol for AccountProtocol {
    type Event = AccountEvent;

    fn name(&self) -> &str {
        &self.label
    }

    fn handshake(&self) -> Result<ConnectRequest, WsError> {
        let path = format!("/ws/{}", self.account_name);
        let headers = self.credentials.signed_headers("GET", &path, None);
        Ok(ConnectRequest::new(self.url.clone()).with_headers(headers.to_vec()))
    }

    fn heartbeat_policy(&self) -> HeartbeatPolicy {
        HeartbeatPolicy::active()
    }

    fn ping_frame(&self) -> Value {
        let uuid = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
        json!({"uri": "ping", "uuid": uuid})
    }

    fn auth_reply(&self, uri: &str, frame: &Value) -> Option<AuthReply> {
        matches!(uri, "connection" | "status" | "auth").then(|| auth_status(frame, true))
    }

    fn route(&self, uri: &str, frame: &Value) -> Routed<AccountEvent> {
        match uri {
            "info" => {
                let events = self
                    .payload::<Info>(uri, frame)
                    .map(|info| (SubscriptionRequest::new(INFO).key(), AccountEvent::Info(info)))
                    .into_iter()
                    .collect();
                Routed::Deliver(events)
            }
            "order" => {
                let Some(orders) = self.payload::<Vec<Order>>(uri, frame) else {
                    return Routed::Deliver(Vec::new());
                };
                let key = SubscriptionRequest::new(ORDER).key();
                let events = orders
                    .into_iter()
                    .map(|order| {
                        tracing::debug!(
                            client = %self.label,
                            order = ?order.exchange_oid,
                            status = %order.status,
                            "Order update"
                        );
                        self.tracker.push(order.clone());
                        (key.clone(), AccountEvent::Order(order))
                    })
                    .collect();
                Routed::Deliver(events)
            }
            _ => Routed::Unrouted,
        }
    }
}
