//! Raw tick payloads.
//!
//! `single-tick-verbose` sends full objects with `{price, volume}` levels.
//! `tick-v3` sends a snapshot (`tp: "s"`) followed by deltas (`tp: "d"`), with
//! short field names and `[price, volume]` pairs. Both spellings are accepted
//! for every field.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::tick::{PriceLevel, Tick};
use crate::shared::serde_util::{null_as_default, timestamp};
use crate::shared::ContractSymbol;

/// A level as either `{"price": p, "volume": v}` or `[p, v]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LevelWire {
    Object { price: Decimal, volume: Decimal },
    Pair(Decimal, Decimal),
}

impl From<LevelWire> for PriceLevel {
    fn from(level: LevelWire) -> Self {
        match level {
            LevelWire::Object { price, volume } | LevelWire::Pair(price, volume) => {
                PriceLevel { price, volume }
            }
        }
    }
}

/// `single-tick-verbose` payload and `GET /quote/single-tick/{contract}` body.
#[derive(Debug, Clone, Deserialize)]
pub struct TickWire {
    pub contract: ContractSymbol,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub time: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub exchange_time: Option<DateTime<Utc>>,
    #[serde(alias = "price", default, deserialize_with = "null_as_default")]
    pub last: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume: Decimal,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bids: Vec<LevelWire>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub asks: Vec<LevelWire>,
}

impl From<TickWire> for Tick {
    fn from(wire: TickWire) -> Self {
        let mut tick = Tick {
            contract: wire.contract,
            time: wire.time,
            exchange_time: wire.exchange_time,
            last: wire.last,
            volume: wire.volume,
            amount: wire.amount,
            source: wire.source,
            bids: wire.bids.into_iter().map(PriceLevel::from).collect(),
            asks: wire.asks.into_iter().map(PriceLevel::from).collect(),
        };
        tick.sort_ladders();
        tick
    }
}

/// `tick-v3` frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TickKind {
    #[serde(rename = "s", alias = "snapshot")]
    Snapshot,
    #[serde(rename = "d", alias = "diff", alias = "delta")]
    Delta,
}

/// One `tick-v3` payload.
///
/// Ladder entries in a delta patch the stored book; a zero volume is kept as a
/// zero-volume level.
#[derive(Debug, Clone, Deserialize)]
pub struct TickUpdate {
    #[serde(alias = "c")]
    pub contract: ContractSymbol,
    #[serde(rename = "tp", alias = "type")]
    pub kind: TickKind,
    #[serde(alias = "tm", deserialize_with = "timestamp::deserialize")]
    pub time: DateTime<Utc>,
    #[serde(alias = "et", default, deserialize_with = "timestamp::option::deserialize")]
    pub exchange_time: Option<DateTime<Utc>>,
    #[serde(alias = "l", alias = "price", default)]
    pub last: Option<Decimal>,
    #[serde(alias = "v", default)]
    pub volume: Option<Decimal>,
    #[serde(alias = "am", default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(alias = "b", default, deserialize_with = "null_as_default")]
    pub bids: Vec<LevelWire>,
    #[serde(alias = "a", default, deserialize_with = "null_as_default")]
    pub asks: Vec<LevelWire>,
}

impl TickUpdate {
    pub fn is_snapshot(&self) -> bool {
        self.kind == TickKind::Snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_verbose_tick() {
        let wire: TickWire = serde_json::from_value(json!({
            "asks": [{"price": 101.5, "volume": 2}, {"price": 101, "volume": 1}],
            "bids": [{"price": 99, "volume": 4}, {"price": 100, "volume": 3}],
            "contract": "binance/btc.usdt",
            "last": 100.2,
            "time": "2019-08-16T15:23:32.050+08:00",
            "exchange_time": "2019-08-16T15:23:32+08:00",
            "amount": 1000,
            "volume": 10,
            "source": "binance"
        }))
        .unwrap();
        let tick = Tick::from(wire);
        assert_eq!(tick.bid1(), Some(d("100")));
        assert_eq!(tick.ask1(), Some(d("101")));
        assert_eq!(tick.last, d("100.2"));
        assert_eq!(tick.amount, Some(d("1000")));
        assert!(tick.exchange_time.is_some());
    }

    #[test]
    fn test_v3_compact_snapshot() {
        let update: TickUpdate = serde_json::from_value(json!({
            "c": "okex/eth.btc",
            "tp": "s",
            "tm": 1565940212.5,
            "l": 0.0182,
            "v": 300,
            "b": [[0.0181, 1.2], [0.0180, 3]],
            "a": [[0.0183, 0.7]]
        }))
        .unwrap();
        assert!(update.is_snapshot());
        assert_eq!(update.contract.as_str(), "okex/eth.btc");
        assert_eq!(update.bids.len(), 2);
        assert_eq!(PriceLevel::from(update.asks[0].clone()).volume, d("0.7"));
        assert_eq!(update.time.timestamp_millis(), 1_565_940_212_500);
    }

    #[test]
    fn test_v3_verbose_delta() {
        let update: TickUpdate = serde_json::from_value(json!({
            "contract": "okex/eth.btc",
            "tp": "d",
            "time": "2019-08-16T15:23:32+08:00",
            "bids": [{"price": 0.0181, "volume": 0}]
        }))
        .unwrap();
        assert_eq!(update.kind, TickKind::Delta);
        assert!(update.asks.is_empty());
        assert!(update.last.is_none());
    }

    #[test]
    fn test_v3_rejects_unknown_kind() {
        let result = serde_json::from_value::<TickUpdate>(json!({
            "c": "okex/eth.btc",
            "tp": "x",
            "tm": 1565940212
        }));
        assert!(result.is_err());
    }
}
