//! The market-data stream: `single-tick-verbose`, `tick-v3` and `candle`.
//!
//! Frames arrive gzip-compressed (`?gzip=true`); the router has already
//! inflated them by the time [`QuoteProtocol::route`] runs. `tick-v3` frames
//! are snapshot/delta pairs, merged here into one [`TickBook`] per contract so
//! that handlers always see a full [`Tick`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::domain::tick::wire::TickWire;
use crate::domain::tick::{TickBook, TickUpdate};
use crate::domain::{Candle, Tick};
use crate::error::WsError;
use crate::shared::ContractSymbol;
use crate::ws::registry::lock;
use crate::ws::{Channel, ConnectRequest, HeartbeatPolicy, Protocol, Routed, SubscriptionRequest};

pub const TICK: Channel = Channel::new(
    "single-tick-verbose",
    "subscribe-single-tick-verbose",
    "unsubscribe-single-tick-verbose",
);
pub const TICK_V3: Channel = Channel::new("tick-v3", "subscribe-tick-v3", "unsubscribe-tick-v3");
pub const CANDLE: Channel = Channel::new("candle", "subscribe-candle", "unsubscribe-candle");

pub fn tick_request(contract: &ContractSymbol) -> SubscriptionRequest {
    SubscriptionRequest::new(TICK).param("contract", contract.as_str())
}

pub fn tick_v3_request(contract: &ContractSymbol) -> SubscriptionRequest {
    SubscriptionRequest::new(TICK_V3).param("contract", contract.as_str())
}

pub fn candle_request(contract: &ContractSymbol, duration: &str) -> SubscriptionRequest {
    SubscriptionRequest::new(CANDLE)
        .param("contract", contract.as_str())
        .param("duration", duration)
}

/// One decoded market-data payload.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    Tick(Tick),
    Candle(Candle),
}

pub struct QuoteProtocol {
    url: String,
    books: Mutex<HashMap<ContractSymbol, TickBook>>,
    last_ticks: Mutex<HashMap<ContractSymbol, Tick>>,
}

impl QuoteProtocol {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            books: Mutex::new(HashMap::new()),
            last_ticks: Mutex::new(HashMap::new()),
        }
    }

    /// Most recent tick seen on either tick channel.
    pub fn last_tick(&self, contract: &ContractSymbol) -> Option<Tick> {
        lock(&self.last_ticks).get(contract).cloned()
    }

    /// Drop the merged book of `contract`; the next snapshot rebuilds it.
    pub fn forget_book(&self, contract: &ContractSymbol) {
        lock(&self.books).remove(contract);
    }

    pub fn clear(&self) {
        lock(&self.books).clear();
        lock(&self.last_ticks).clear();
    }

    fn payload<T: DeserializeOwned>(&self, uri: &str, frame: &Value) -> Option<T> {
        let data = frame.get("data").unwrap_or(frame);
        match T::deserialize(data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(client = self.name(), uri, "Malformed payload: {}", e);
                None
            }
        }
    }

    fn cache(&self, tick: &Tick) {
        lock(&self.last_ticks).insert(tick.contract.clone(), tick.clone());
    }

    fn merge(&self, update: &TickUpdate) -> Option<Tick> {
        let mut books = lock(&self.books);
        let book = books
            .entry(update.contract.clone())
            .or_insert_with(|| TickBook::new(update.contract.clone()));
        if !book.apply(update) {
            tracing::debug!(
                client = "quote",
                contract = %update.contract,
                "Ignoring tick-v3 delta before snapshot"
            );
            return None;
        }
        book.to_tick()
    }
}

impl Protocol for QuoteProtocol {
    type Event = QuoteEvent;

    fn name(&self) -> &str {
        "quote"
    }

    fn handshake(&self) -> Result<ConnectRequest, WsError> {
        Ok(ConnectRequest::new(self.url.clone()))
    }

    fn auth_frame(&self) -> Option<Value> {
        Some(json!({"uri": "auth", "sample-rate": 0}))
    }

    fn heartbeat_policy(&self) -> HeartbeatPolicy {
        HeartbeatPolicy::passive()
    }

    /// Books from the previous session may have missed deltas. Each contract
    /// waits for the snapshot that follows its resubscribe.
    fn on_session_ready(&self) {
        let mut books = lock(&self.books);
        if !books.is_empty() {
            tracing::debug!(client = "quote", books = books.len(), "Dropping tick-v3 books");
            books.clear();
        }
    }

    fn route(&self, uri: &str, frame: &Value) -> Routed<QuoteEvent> {
        let event = match uri {
            "single-tick-verbose" => self.payload::<TickWire>(uri, frame).map(|wire| {
                let tick = Tick::from(wire);
                self.cache(&tick);
                (tick_request(&tick.contract).key(), QuoteEvent::Tick(tick))
            }),
            "tick-v3" => self
                .payload::<TickUpdate>(uri, frame)
                .and_then(|update| self.merge(&update))
                .map(|tick| {
                    self.cache(&tick);
                    (tick_v3_request(&tick.contract).key(), QuoteEvent::Tick(tick))
                }),
            "candle" => self.payload::<Candle>(uri, frame).map(|candle| {
                let key = candle_request(&candle.contract, &candle.duration).key();
                (key, QuoteEvent::Candle(candle))
            }),
            _ => return Routed::Unrouted,
        };
        Routed::Deliver(event.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Resolution;
    use crate::ws::AuthReply;
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn delivered(routed: Routed<QuoteEvent>) -> Vec<(String, QuoteEvent)> {
        match routed {
            Routed::Deliver(events) => events
                .into_iter()
                .map(|(k, e)| (k.as_str().to_string(), e))
                .collect(),
            Routed::Unrouted => panic!("frame not routed"),
        }
    }

    #[test]
    fn test_auth_frame_and_reply() {
        let p = QuoteProtocol::new("wss://example.com/ws/tick?gzip=true");
        assert_eq!(p.auth_frame(), Some(json!({"uri": "auth", "sample-rate": 0})));
        assert_eq!(p.ping_frame(), json!({"uri": "ping"}));
        assert_eq!(p.auth_reply("auth", &json!({"uri": "auth"})), Some(AuthReply::Accepted));
        assert_eq!(
            p.auth_reply("auth", &json!({"uri": "auth", "code": "fail", "message": "nope"})),
            Some(AuthReply::Rejected("nope".into()))
        );
        assert_eq!(p.handshake().unwrap().url, "wss://example.com/ws/tick?gzip=true");
    }

    #[test]
    fn test_verbose_tick_is_keyed_and_cached() {
        let p = QuoteProtocol::new("ws://x");
        let events = delivered(p.route(
            "single-tick-verbose",
            &json!({"uri": "single-tick-verbose", "data": {
                "contract": "okex/btc.usdt", "time": "2019-08-16T07:23:32Z",
                "last": 10000, "volume": 5,
                "bids": [{"price": 9999, "volume": 1}, {"price": 9999.5, "volume": 2}],
                "asks": [{"price": 10001, "volume": 1}]
            }}),
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, tick_request(&"okex/btc.usdt".into()).key().as_str());
        let QuoteEvent::Tick(tick) = &events[0].1 else {
            panic!("expected a tick");
        };
        assert_eq!(tick.bid1(), Some(d("9999.5")));
        assert_eq!(p.last_tick(&"okex/btc.usdt".into()).as_ref(), Some(tick));
    }

    #[test]
    fn test_tick_v3_merges_delta_into_snapshot() {
        let p = QuoteProtocol::new("ws://x");
        let contract: ContractSymbol = "huobip/btc.usdt".into();

        let delta = json!({"uri": "tick-v3", "data": {
            "c": "huobip/btc.usdt", "tp": "d", "tm": 1565940213, "b": [[100, 0]]
        }});
        assert!(delivered(p.route("tick-v3", &delta)).is_empty());

        let snapshot = json!({"uri": "tick-v3", "data": {
            "c": "huobip/btc.usdt", "tp": "s", "tm": 1565940212, "l": 100.5, "v": 3,
            "b": [[100, 1], [99, 2]], "a": [[101, 1]]
        }});
        assert_eq!(delivered(p.route("tick-v3", &snapshot)).len(), 1);

        let events = delivered(p.route("tick-v3", &delta));
        assert_eq!(events[0].0, tick_v3_request(&contract).key().as_str());
        let QuoteEvent::Tick(tick) = &events[0].1 else {
            panic!("expected a tick");
        };
        assert_eq!(tick.bids.len(), 2);
        assert_eq!(tick.bids[0].price, d("100"));
        assert!(tick.bids[0].volume.is_zero());
        assert_eq!(tick.bids[1].price, d("99"));
        assert_eq!(tick.asks[0].price, d("101"));

        p.forget_book(&contract);
        assert!(delivered(p.route("tick-v3", &delta)).is_empty());
    }

    #[test]
    fn test_new_session_drops_books_but_keeps_last_tick() {
        let p = QuoteProtocol::new("ws://x");
        let contract: ContractSymbol = "huobip/btc.usdt".into();
        let snapshot = json!({"data": {
            "c": "huobip/btc.usdt", "tp": "s", "tm": 1565940212, "l": 100.5,
            "b": [[100, 1]], "a": [[101, 1]]
        }});
        let delta = json!({"data": {
            "c": "huobip/btc.usdt", "tp": "d", "tm": 1565940213, "a": [[101, 3]]
        }});
        assert_eq!(delivered(p.route("tick-v3", &snapshot)).len(), 1);

        p.on_session_ready();
        assert!(delivered(p.route("tick-v3", &delta)).is_empty());
        assert!(p.last_tick(&contract).is_some());

        assert_eq!(delivered(p.route("tick-v3", &snapshot)).len(), 1);
        assert_eq!(delivered(p.route("tick-v3", &delta)).len(), 1);
    }

    #[test]
    fn test_candle_key_includes_duration() {
        let p = QuoteProtocol::new("ws://x");
        let events = delivered(p.route(
            "candle",
            &json!({"uri": "candle", "data": {
                "contract": "okex/btc.usdt", "duration": "5m", "time": 1565940000,
                "open": 1, "high": 3, "low": 1, "close": 2, "volume": 10
            }}),
        ));
        assert_eq!(
            events[0].0,
            candle_request(&"okex/btc.usdt".into(), Resolution::Minute5.as_str())
                .key()
                .as_str()
        );
        assert!(matches!(&events[0].1, QuoteEvent::Candle(c) if c.change() == d("1")));
    }

    #[test]
    fn test_bad_payloads_are_consumed_and_unknown_uris_unrouted() {
        let p = QuoteProtocol::new("ws://x");
        let bad = json!({"uri": "candle", "data": {"x": 1}});
        assert!(delivered(p.route("candle", &bad)).is_empty());
        assert!(matches!(p.route("trade", &json!({})), Routed::Unrouted));
    }
}
