//! OHLCV candles from the `candle` channel.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shared::serde_util::{null_as_default, timestamp};
use crate::shared::ContractSymbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub contract: ContractSymbol,
    /// Candle width as the venue spells it, e.g. `"1m"`.
    pub duration: String,
    /// Open time of the candle.
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume: Decimal,
}

impl Candle {
    /// `close - open`.
    pub fn change(&self) -> Decimal {
        self.close - self.open
    }
}

impl std::fmt::Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Candle-{}:{} {} {} {} {} {} {}>",
            self.duration,
            self.contract,
            self.time.format("%H:%M:%S"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candle_from_wire() {
        let candle: Candle = serde_json::from_value(json!({
            "amount": 12.0,
            "close": 6401.5,
            "high": 6402,
            "low": 6399,
            "open": 6400,
            "volume": null,
            "contract": "binance/btc.usdt",
            "duration": "1m",
            "time": "2019-08-16T15:23:00+08:00"
        }))
        .unwrap();
        assert_eq!(candle.change(), "1.5".parse::<Decimal>().unwrap());
        assert!(candle.volume.is_zero());
        assert_eq!(candle.duration, "1m");
        assert!(candle.to_string().starts_with("<Candle-1m:binance/btc.usdt 07:23:00"));
    }
}
