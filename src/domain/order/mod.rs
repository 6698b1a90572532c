//! Order domain: orders, request bodies, and per-order update tracking.

pub mod tracker;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::SdkError;
use crate::shared::serde_util::{null_as_default, timestamp};
use crate::shared::{ContractSymbol, Side};

pub use tracker::{OrderTracker, PushOutcome};

// ─── OrderStatus ─────────────────────────────────────────────────────────────

/// Lifecycle status of an order, as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Received, not yet sent to the exchange.
    Waiting,
    Pending,
    PartDealPending,
    Withdrawing,
    PartDealWithdrawing,
    Active,
    ErrorOrder,
    Dealt,
    Withdrawn,
    PartDealWithdrawn,
    End,
    /// A status this SDK does not know. Treated as non-terminal.
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::PartDealPending => "part-deal-pending",
            Self::Withdrawing => "withdrawing",
            Self::PartDealWithdrawing => "part-deal-withdrawing",
            Self::Active => "active",
            Self::ErrorOrder => "error-order",
            Self::Dealt => "dealt",
            Self::Withdrawn => "withdrawn",
            Self::PartDealWithdrawn => "part-deal-withdrawn",
            Self::End => "end",
            Self::Other(s) => s,
        }
    }

    /// No further updates follow a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ErrorOrder | Self::Dealt | Self::Withdrawn | Self::PartDealWithdrawn | Self::End
        )
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s {
            "waiting" => Self::Waiting,
            "pending" => Self::Pending,
            "part-deal-pending" => Self::PartDealPending,
            "withdrawing" => Self::Withdrawing,
            "part-deal-withdrawing" => Self::PartDealWithdrawing,
            "active" => Self::Active,
            "error-order" | "error" => Self::ErrorOrder,
            "dealt" => Self::Dealt,
            "withdrawn" => Self::Withdrawn,
            "part-deal-withdrawn" => Self::PartDealWithdrawn,
            "end" => Self::End,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(OrderStatus::from(s.as_str()))
    }
}

// ─── Order ───────────────────────────────────────────────────────────────────

/// An order as pushed on the `order` channel and returned by `GET /orders`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub contract: ContractSymbol,
    pub bs: Side,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entrust_price: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entrust_amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dealt_amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub average_dealt_price: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_dealt_amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commission: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub account: String,
    #[serde(default)]
    pub client_oid: Option<String>,
    #[serde(default)]
    pub exchange_oid: Option<String>,
    pub status: OrderStatus,
    /// Bumped by the venue on every status change.
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: u64,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub entrust_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
}

impl Order {
    /// Amount still open on the book.
    pub fn remaining_amount(&self) -> Decimal {
        (self.entrust_amount - self.dealt_amount).max(Decimal::ZERO)
    }
}

// ─── Request bodies ──────────────────────────────────────────────────────────

/// `POST /orders` body.
///
/// Prices and amounts go out as JSON numbers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaceOrder {
    pub contract: ContractSymbol,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    pub bs: Side,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_oid: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl PlaceOrder {
    pub fn new(
        contract: impl Into<ContractSymbol>,
        bs: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            contract: contract.into(),
            price,
            bs,
            amount,
            client_oid: None,
            tags: BTreeMap::new(),
            options: None,
        }
    }

    pub fn client_oid(mut self, client_oid: impl Into<String>) -> Self {
        self.client_oid = Some(client_oid.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.contract.exchange().is_empty() {
            return Err(SdkError::Validation(format!(
                "contract must be exchange/name: {}",
                self.contract
            )));
        }
        if self.price.is_sign_negative() {
            return Err(SdkError::Validation(format!("negative price: {}", self.price)));
        }
        if self.amount <= Decimal::ZERO {
            return Err(SdkError::Validation(format!("amount must be positive: {}", self.amount)));
        }
        Ok(())
    }
}

/// `POST /orders` response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlaceOrderResponse {
    #[serde(default)]
    pub exchange_oid: Option<String>,
    #[serde(default)]
    pub client_oid: Option<String>,
}

/// `PATCH /orders` body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AmendOrder {
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
}

/// `POST /withdraws` body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Withdraw {
    pub currency: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
    pub address: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "rust_decimal::serde::float_option::serialize"
    )]
    pub fee: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_wid: Option<String>,
    /// Sent as a JSON-encoded string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

impl Withdraw {
    pub fn new(currency: impl Into<String>, amount: Decimal, address: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            amount,
            address: address.into(),
            fee: None,
            client_wid: None,
            options: None,
        }
    }

    pub fn fee(mut self, fee: Decimal) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn client_wid(mut self, client_wid: impl Into<String>) -> Self {
        self.client_wid = Some(client_wid.into());
        self
    }

    pub fn options(mut self, options: &Value) -> Self {
        self.options = Some(options.to_string());
        self
    }
}
