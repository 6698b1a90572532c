//! Domain types for the venue's REST bodies and stream payloads.
//!
//! - `order`: orders, request bodies, and the per-order update tracker
//! - `tick`: ticks, wire payloads, and the `tick-v3` book state
//! - `candle`, `contract`, `info`: single-file models

pub mod candle;
pub mod contract;
pub mod info;
pub mod order;
pub mod tick;

pub use candle::Candle;
pub use contract::Contract;
pub use info::{Info, Position};
pub use order::{Order, OrderStatus};
pub use tick::{PriceLevel, Tick};
