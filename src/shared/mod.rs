//! Symbols, sides and candle durations.
//!
//! `ContractSymbol` and `AccountSymbol` are `exchange/name` strings on the wire
//! and stay strings in serde, so wire structs embed them directly.

pub mod ids;
pub mod serde_util;

pub use ids::{rand_client_oid, rand_client_wid, rand_id};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::SdkError;

// ─── ContractSymbol ──────────────────────────────────────────────────────────

/// A tradable contract, `exchange/name` (e.g. `"binance/btc.usdt"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractSymbol(String);

impl ContractSymbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange part, empty when the symbol has no `/`.
    pub fn exchange(&self) -> &str {
        self.0.split_once('/').map(|(e, _)| e).unwrap_or("")
    }

    /// Name part, the whole symbol when it has no `/`.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ContractSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContractSymbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContractSymbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for ContractSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContractSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ContractSymbol(s))
    }
}

// ─── AccountSymbol ───────────────────────────────────────────────────────────

/// A trading account, `exchange/account` or `exchange/account/margin.pair`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountSymbol {
    exchange: String,
    name: String,
    margin_pair: Option<String>,
}

impl AccountSymbol {
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Margin contract (`exchange/pair`) for margin accounts.
    pub fn margin_contract(&self) -> Option<ContractSymbol> {
        self.margin_pair
            .as_ref()
            .map(|pair| ContractSymbol(format!("{}/{}", self.exchange, pair)))
    }
}

impl FromStr for AccountSymbol {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, rest) = s
            .split_once('/')
            .ok_or_else(|| {
                SdkError::Validation(format!("account symbol without exchange: {}", s))
            })?;
        let (name, margin_pair) = match rest.split_once('/') {
            Some((name, pair)) => (name, Some(pair.to_string())),
            None => (rest, None),
        };
        if exchange.is_empty() || name.is_empty() {
            return Err(SdkError::Validation(format!("malformed account symbol: {}", s)));
        }
        Ok(Self {
            exchange: exchange.to_string(),
            name: name.to_string(),
            margin_pair,
        })
    }
}

impl std::fmt::Display for AccountSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.exchange, self.name)?;
        if let Some(pair) = &self.margin_pair {
            write!(f, "/{}", pair)?;
        }
        Ok(())
    }
}

// ─── Side ────────────────────────────────────────────────────────────────────

/// Order side, `b` (buy) or `s` (sell) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "b")]
    Buy,
    #[serde(rename = "s")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Candle duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute1 => "1m",
            Self::Minute5 => "5m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Duration of one candle in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Minute1 => 60,
            Self::Minute5 => 300,
            Self::Minute15 => 900,
            Self::Minute30 => 1800,
            Self::Hour1 => 3600,
            Self::Hour4 => 14400,
            Self::Day1 => 86400,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
