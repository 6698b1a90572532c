//! Contract metadata from `GET /basic/contracts`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SdkError;
use crate::shared::serde_util::null_as_default;
use crate::shared::ContractSymbol;

/// A tradable contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    pub exchange: String,
    pub name: String,
    pub min_change: Decimal,
    pub alias: String,
    pub category: String,
    pub first_day: Option<String>,
    pub last_day: Option<String>,
    pub exec_price: Option<Decimal>,
    pub currency: String,
    pub id: Option<i64>,
    pub min_amount: Decimal,
    pub unit_amount: Decimal,
}

impl Contract {
    /// `exchange/name`.
    pub fn symbol(&self) -> ContractSymbol {
        ContractSymbol::new(format!("{}/{}", self.exchange, self.name))
    }
}

impl std::fmt::Display for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Con:{}/{}>", self.exchange, self.name)
    }
}

/// Raw contract record. Carries either `exchange` or a full `symbol`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractWire {
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_change: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alias: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default)]
    pub first_day: Option<Value>,
    #[serde(default)]
    pub last_day: Option<Value>,
    #[serde(default)]
    pub exec_price: Option<Decimal>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit_amount: Decimal,
}

fn day(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl TryFrom<ContractWire> for Contract {
    type Error = SdkError;

    fn try_from(wire: ContractWire) -> Result<Self, Self::Error> {
        let exchange = match (wire.exchange, wire.symbol) {
            (Some(exchange), _) if !exchange.is_empty() => exchange,
            (_, Some(symbol)) => ContractSymbol::new(symbol).exchange().to_string(),
            _ => String::new(),
        };
        if exchange.is_empty() {
            return Err(SdkError::Validation(format!(
                "contract {} carries neither exchange nor symbol",
                wire.name
            )));
        }
        Ok(Contract {
            exchange,
            name: wire.name,
            min_change: wire.min_change,
            alias: wire.alias,
            category: wire.category,
            first_day: day(wire.first_day),
            last_day: day(wire.last_day),
            exec_price: wire.exec_price,
            currency: wire.currency,
            id: wire.id,
            min_amount: wire.min_amount,
            unit_amount: wire.unit_amount,
        })
    }
}
