//! Account info from `GET /info` and the `info` channel.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::serde_util::null_as_default;

/// One holding. Venue-specific extras (margin breakdowns and the like) are kept
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub contract: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub available: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub frozen: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub loan: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_value: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value_cny: Decimal,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Position {
    /// A numeric field by wire name, typed or extra. Zero when absent.
    pub fn amount(&self, field: &str) -> Decimal {
        match field {
            "total_amount" => self.total_amount,
            "available" => self.available,
            "frozen" => self.frozen,
            "loan" => self.loan,
            "market_value" => self.market_value,
            "value_cny" => self.value_cny,
            other => self
                .extra
                .get(other)
                .and_then(decimal_from_value)
                .unwrap_or_default(),
        }
    }
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    text.parse()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

/// Balance and positions of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default, deserialize_with = "null_as_default")]
    pub balance: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cash: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_value: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_value_detail: BTreeMap<String, Decimal>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub position: Vec<Position>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Info {
    pub fn position(&self, contract: &str) -> Option<&Position> {
        self.position.iter().find(|p| p.contract == contract)
    }

    /// Total amount held of `contract`, zero when there is no position.
    pub fn total_amount(&self, contract: &str) -> Decimal {
        self.position(contract)
            .map(|p| p.total_amount)
            .unwrap_or_default()
    }

    /// The view of a margin account restricted to one `coin.base` pair.
    ///
    /// The pair's position carries per-leg fields (`amount_coin`,
    /// `available_base`, ...); they become one position per leg. `None` when the
    /// pair is not held or is not of the form `coin.base`.
    pub fn margin_view(&self, pair: &str) -> Option<Info> {
        let pos = self.position(pair)?;
        let (coin, base) = pair.split_once('.')?;

        let leg = |contract: &str, suffix: &str| Position {
            contract: contract.to_string(),
            total_amount: pos.amount(&format!("amount_{}", suffix)),
            available: pos.amount(&format!("available_{}", suffix)),
            frozen: pos.amount(&format!("frozen_{}", suffix)),
            loan: pos.amount(&format!("loan_{}", suffix)),
            market_value: pos.amount(&format!("market_value_{}", suffix)),
            value_cny: pos.amount(&format!("value_cny_{}", suffix)),
            extra: BTreeMap::new(),
        };

        let mut detail = BTreeMap::new();
        detail.insert(coin.to_string(), pos.amount("market_value_coin"));
        detail.insert(base.to_string(), pos.amount("market_value_base"));

        Some(Info {
            balance: pos.value_cny,
            cash: if base == "usdt" {
                pos.amount("value_cny_base")
            } else {
                Decimal::ZERO
            },
            market_value: pos.market_value,
            market_value_detail: detail,
            position: vec![leg(coin, "coin"), leg(base, "base")],
            extra: BTreeMap::new(),
        })
    }
}
