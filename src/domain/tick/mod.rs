//! Market ticks: a last price plus the top of both book ladders.

pub mod state;
pub mod wire;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shared::{ContractSymbol, Side};

pub use state::TickBook;
pub use wire::{TickKind, TickUpdate};

// ─── PriceLevel ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

// ─── Tick ────────────────────────────────────────────────────────────────────

/// A market snapshot for one contract.
///
/// `bids` are sorted by price descending and `asks` ascending, whatever order
/// the venue sent them in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub contract: ContractSymbol,
    pub time: DateTime<Utc>,
    pub exchange_time: Option<DateTime<Utc>>,
    pub last: Decimal,
    pub volume: Decimal,
    pub amount: Option<Decimal>,
    pub source: Option<String>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl Tick {
    /// Sort both ladders into their canonical order.
    pub(crate) fn sort_ladders(&mut self) {
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
    }

    pub fn bid1(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn ask1(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Best price on the side a `bs` order would trade against.
    pub fn touch(&self, bs: Side) -> Option<Decimal> {
        match bs {
            Side::Buy => self.ask1(),
            Side::Sell => self.bid1(),
        }
    }

    pub fn middle(&self) -> Option<Decimal> {
        Some((self.bid1()? + self.ask1()?) / Decimal::from(2))
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.ask1()? - self.bid1()?)
    }

    /// Mid price weighted by the opposite side's top volume.
    ///
    /// `None` when either ladder is empty or both top volumes are zero.
    pub fn weighted_middle(&self) -> Option<Decimal> {
        let bid = self.bids.first()?;
        let ask = self.asks.first()?;
        let total = bid.volume + ask.volume;
        if total.is_zero() {
            return None;
        }
        Some((bid.price * ask.volume + ask.price * bid.volume) / total)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |p: Option<Decimal>| p.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        write!(
            f,
            "<{} {} {}/{} {}>",
            self.contract,
            self.time.format("%H:%M:%S%.3f"),
            show(self.bid1()),
            show(self.ask1()),
            self.last
        )
    }
}
