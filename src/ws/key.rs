//! Channels, subscription requests and canonical subscription keys.
//!
//! A [`SubscriptionRequest`] is a channel plus its parameters. Its
//! [`SubscriptionKey`] is the canonical form: parameters are kept in a
//! `BTreeMap`, so two requests with the same parameters in a different
//! insertion order produce the same key.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// One stream channel and the URIs that open and close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    /// The `uri` carried by this channel's data frames.
    pub name: &'static str,
    pub subscribe_uri: &'static str,
    pub unsubscribe_uri: &'static str,
}

impl Channel {
    pub const fn new(
        name: &'static str,
        subscribe_uri: &'static str,
        unsubscribe_uri: &'static str,
    ) -> Self {
        Self {
            name,
            subscribe_uri,
            unsubscribe_uri,
        }
    }
}

/// A channel plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    channel: Channel,
    params: BTreeMap<String, Value>,
}

impl SubscriptionRequest {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn key(&self) -> SubscriptionKey {
        if self.params.is_empty() {
            return SubscriptionKey(self.channel.name.to_string());
        }
        // BTreeMap and serde_json's default Map both serialize in key order.
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        SubscriptionKey(format!("{}{}", self.channel.name, params))
    }

    pub fn subscribe_frame(&self) -> Value {
        self.frame(self.channel.subscribe_uri)
    }

    pub fn unsubscribe_frame(&self) -> Value {
        self.frame(self.channel.unsubscribe_uri)
    }

    fn frame(&self, uri: &str) -> Value {
        let mut map = Map::new();
        map.insert("uri".to_string(), Value::String(uri.to_string()));
        for (name, value) in &self.params {
            map.insert(name.clone(), value.clone());
        }
        Value::Object(map)
    }
}

/// Canonical identity of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CANDLE: Channel = Channel::new("candle", "subscribe-candle", "unsubscribe-candle");
    const ORDER: Channel = Channel::new("order", "sub-order", "unsub-order");

    #[test]
    fn test_key_independent_of_param_order() {
        let a = SubscriptionRequest::new(CANDLE)
            .param("contract", "okex/btc.usdt")
            .param("duration", "1m");
        let b = SubscriptionRequest::new(CANDLE)
            .param("duration", "1m")
            .param("contract", "okex/btc.usdt");
        assert_eq!(a.key(), b.key());
        assert_eq!(
            a.key().as_str(),
            r#"candle{"contract":"okex/btc.usdt","duration":"1m"}"#
        );
    }

    #[test]
    fn test_key_distinguishes_params() {
        let a = SubscriptionRequest::new(CANDLE).param("duration", "1m");
        let b = SubscriptionRequest::new(CANDLE).param("duration", "5m");
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_nested_params_are_canonical() {
        let a = SubscriptionRequest::new(CANDLE).param("opts", json!({"b": 1, "a": 2}));
        let b = SubscriptionRequest::new(CANDLE).param("opts", json!({"a": 2, "b": 1}));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_bare_channel_key() {
        assert_eq!(SubscriptionRequest::new(ORDER).key().to_string(), "order");
    }

    #[test]
    fn test_frames() {
        let req = SubscriptionRequest::new(CANDLE)
            .param("contract", "okex/btc.usdt")
            .param("duration", "1m");
        assert_eq!(
            req.subscribe_frame(),
            json!({"uri": "subscribe-candle", "contract": "okex/btc.usdt", "duration": "1m"})
        );
        assert_eq!(
            req.unsubscribe_frame(),
            json!({"uri": "unsubscribe-candle", "contract": "okex/btc.usdt", "duration": "1m"})
        );
        assert_eq!(
            SubscriptionRequest::new(ORDER).subscribe_frame(),
            json!({"uri": "sub-order"})
        );
    }
}
