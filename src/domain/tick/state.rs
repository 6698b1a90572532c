//! Tick book state: merges `tick-v3` snapshots and deltas.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::tick::wire::TickUpdate;
use crate::domain::tick::{PriceLevel, Tick};
use crate::shared::ContractSymbol;

/// Live ladders for one contract.
///
/// A snapshot replaces both ladders; a delta patches them level by level. A
/// delta volume of zero is stored as a zero-volume level rather than removing
/// the price.
#[derive(Debug, Clone)]
pub struct TickBook {
    contract: ContractSymbol,
    time: Option<DateTime<Utc>>,
    exchange_time: Option<DateTime<Utc>>,
    last: Decimal,
    volume: Decimal,
    amount: Option<Decimal>,
    source: Option<String>,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl TickBook {
    pub fn new(contract: ContractSymbol) -> Self {
        Self {
            contract,
            time: None,
            exchange_time: None,
            last: Decimal::ZERO,
            volume: Decimal::ZERO,
            amount: None,
            source: None,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    pub fn contract(&self) -> &ContractSymbol {
        &self.contract
    }

    /// `true` once a snapshot has been applied.
    pub fn is_initialized(&self) -> bool {
        self.time.is_some()
    }

    /// Apply one update. A delta before any snapshot is ignored and reported
    /// as `false`.
    pub fn apply(&mut self, update: &TickUpdate) -> bool {
        if update.is_snapshot() {
            self.bids.clear();
            self.asks.clear();
        } else if !self.is_initialized() {
            return false;
        }

        self.time = Some(update.time);
        if update.exchange_time.is_some() {
            self.exchange_time = update.exchange_time;
        }
        if let Some(last) = update.last {
            self.last = last;
        }
        if let Some(volume) = update.volume {
            self.volume = volume;
        }
        if update.amount.is_some() {
            self.amount = update.amount;
        }
        if update.source.is_some() {
            self.source = update.source.clone();
        }

        for level in &update.bids {
            let level = PriceLevel::from(level.clone());
            self.bids.insert(level.price, level.volume);
        }
        for level in &update.asks {
            let level = PriceLevel::from(level.clone());
            self.asks.insert(level.price, level.volume);
        }
        true
    }

    /// Bids keyed by price (iterate in reverse for best-first).
    pub fn bids(&self) -> &BTreeMap<Decimal, Decimal> {
        &self.bids
    }

    pub fn asks(&self) -> &BTreeMap<Decimal, Decimal> {
        &self.asks
    }

    /// The merged book as a [`Tick`], or `None` before the first snapshot.
    pub fn to_tick(&self) -> Option<Tick> {
        let time = self.time?;
        Some(Tick {
            contract: self.contract.clone(),
            time,
            exchange_time: self.exchange_time,
            last: self.last,
            volume: self.volume,
            amount: self.amount,
            source: self.source.clone(),
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(p, v)| PriceLevel::new(*p, *v))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(p, v)| PriceLevel::new(*p, *v))
                .collect(),
        })
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.contract.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn update(value: serde_json::Value) -> TickUpdate {
        serde_json::from_value(value).unwrap()
    }

    fn snapshot() -> TickUpdate {
        update(json!({
            "c": "binance/btc.usdt", "tp": "s", "tm": 1565940212,
            "l": 100, "v": 5,
            "b": [[100, 1], [99, 2]],
            "a": [[101, 1], [102, 3]]
        }))
    }

    #[test]
    fn test_zero_volume_delta_is_kept() {
        let mut book = TickBook::new("binance/btc.usdt".into());
        assert!(book.apply(&snapshot()));
        assert!(book.apply(&update(json!({
            "c": "binance/btc.usdt", "tp": "d", "tm": 1565940213,
            "b": [[100, 0]]
        }))));

        let tick = book.to_tick().unwrap();
        assert_eq!(
            tick.bids,
            vec![PriceLevel::new(d(100), d(0)), PriceLevel::new(d(99), d(2))]
        );
        assert_eq!(tick.asks.len(), 2);
        assert_eq!(tick.last, d(100));
    }

    #[test]
    fn test_delta_merges_and_resorts() {
        let mut book = TickBook::new("binance/btc.usdt".into());
        book.apply(&snapshot());
        book.apply(&update(json!({
            "c": "binance/btc.usdt", "tp": "d", "tm": 1565940214, "l": 101,
            "b": [[100.5, 4]],
            "a": [[100.8, 2], [102, 1]]
        })));

        let tick = book.to_tick().unwrap();
        let bids: Vec<_> = tick.bids.iter().map(|l| l.price).collect();
        assert_eq!(bids, vec!["100.5".parse().unwrap(), d(100), d(99)]);
        let asks: Vec<_> = tick.asks.iter().map(|l| (l.price, l.volume)).collect();
        assert_eq!(
            asks,
            vec![("100.8".parse().unwrap(), d(2)), (d(101), d(1)), (d(102), d(1))]
        );
        assert_eq!(tick.last, d(101));
        assert_eq!(tick.volume, d(5));
    }

    #[test]
    fn test_snapshot_replaces_ladders() {
        let mut book = TickBook::new("binance/btc.usdt".into());
        book.apply(&snapshot());
        book.apply(&update(json!({
            "c": "binance/btc.usdt", "tp": "s", "tm": 1565940215,
            "b": [[98, 1]], "a": []
        })));
        let tick = book.to_tick().unwrap();
        assert_eq!(tick.bids, vec![PriceLevel::new(d(98), d(1))]);
        assert!(tick.asks.is_empty());
    }

    #[test]
    fn test_delta_before_snapshot_is_ignored() {
        let mut book = TickBook::new("binance/btc.usdt".into());
        let delta = update(json!({"c": "binance/btc.usdt", "tp": "d", "tm": 1, "b": [[1, 1]]}));
        assert!(!book.apply(&delta));
        assert!(book.to_tick().is_none());
        assert!(book.bids().is_empty());

        book.apply(&snapshot());
        book.clear();
        assert!(!book.is_initialized());
    }
}
