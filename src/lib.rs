//! # tradestream-sdk
//!
//! Signed REST and resilient streaming for a crypto trading gateway.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core**: shared newtypes, domain models, errors, config and hosts
//! 2. **Auth**: HMAC-SHA256 request signing
//! 3. **HTTP**: `RestClient` with per-call retry policies
//! 4. **Streaming**: `StreamClient`, a reconnecting state machine with
//!    heartbeat, subscription replay and per-key handler queues
//! 5. **Clients**: `Account` (trading), `Quote` (market data) and `ClientPool`
//!
//! Nothing runs in the background until `start()` is called, and `stop()`
//! ends every task the client spawned.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tradestream_sdk::prelude::*;
//!
//! let config = Config::load()?;
//! let quote = Quote::new(&config);
//! let tick = quote.get_last_tick("binance/btc.usdt").await?;
//!
//! let account = Account::from_config("binance/demo", &config)?;
//! account.start()?;
//! let info = account.get_info().await?;
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes and id generators.
pub mod shared;

/// Orders, ticks, candles, contracts and account info.
pub mod domain;

/// SDK error types.
pub mod error;

/// Gateway hosts and URL builders.
pub mod network;

/// TOML and environment configuration.
pub mod config;

// ── Layer 2: Auth ────────────────────────────────────────────────────────────

/// Request signing and API credentials.
pub mod auth;

// ── Layer 3: HTTP ────────────────────────────────────────────────────────────

/// REST client with retry policies.
pub mod http;

// ── Layer 4: Streaming ───────────────────────────────────────────────────────

/// Connection manager, heartbeat, subscription registry and router.
pub mod ws;

// ── Layer 5: Clients ─────────────────────────────────────────────────────────

/// Trading account client.
pub mod account;

/// Market-data client.
pub mod quote;

/// Named client cache.
pub mod pool;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{
        rand_client_oid, rand_client_wid, AccountSymbol, ContractSymbol, Resolution, Side,
    };

    // Domain types
    pub use crate::domain::order::{
        AmendOrder, OrderTracker, PlaceOrder, PlaceOrderResponse, PushOutcome, Withdraw,
    };
    pub use crate::domain::{Candle, Contract, Info, Order, OrderStatus, Position, PriceLevel, Tick};

    // Errors
    pub use crate::error::{ConfigError, ErrorKind, HttpError, SdkError, WsError};

    // Config, hosts, auth
    pub use crate::auth::Credentials;
    pub use crate::config::Config;
    pub use crate::network::Hosts;

    // HTTP
    pub use crate::http::{RestClient, RetryConfig, RetryPolicy};

    // Streaming
    pub use crate::ws::{
        handler, ConnectionState, Handler, HandlerResult, HeartbeatPolicy, StreamClient, WsConfig,
    };

    // Clients
    pub use crate::account::Account;
    pub use crate::pool::ClientPool;
    pub use crate::quote::Quote;
}
