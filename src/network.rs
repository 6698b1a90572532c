//! Network URL constants and the host set used by every client.

use serde::{Deserialize, Serialize};

/// Default REST API base URL (market data and reference data).
pub const DEFAULT_REST_URL: &str = "https://1token.trade/api/v1";

/// Default trading REST base URL.
pub const DEFAULT_TRADE_URL: &str = "https://1token.trade/api/v1/trade";

/// Default trading WebSocket URL.
pub const DEFAULT_TRADE_WS_URL: &str = "wss://1token.trade/api/v1/ws/trade";

/// Default market-data WebSocket URL.
pub const DEFAULT_TICK_WS_URL: &str = "wss://1token.trade/api/v1/ws/tick";

/// Value of the `source` query parameter attached to REST calls.
pub const SDK_SOURCE: &str = "tradestream-rust-sdk";

/// The full set of endpoints a client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hosts {
    pub rest: String,
    pub trade: String,
    pub trade_ws: String,
    pub tick_ws: String,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            rest: DEFAULT_REST_URL.to_string(),
            trade: DEFAULT_TRADE_URL.to_string(),
            trade_ws: DEFAULT_TRADE_WS_URL.to_string(),
            tick_ws: DEFAULT_TICK_WS_URL.to_string(),
        }
    }
}

impl Hosts {
    /// Rewrite every host by replacing `matched` with `target`.
    ///
    /// With `no_ssl`, `https://` and `wss://` are downgraded to `http://` and
    /// `ws://`, which is what a local gateway usually wants.
    pub fn change_host(&mut self, target: &str, matched: &str, no_ssl: bool) {
        for url in [
            &mut self.rest,
            &mut self.trade,
            &mut self.trade_ws,
            &mut self.tick_ws,
        ] {
            let mut new = url.replace(matched, target);
            if no_ssl {
                new = new.replace("https://", "http://").replace("wss://", "ws://");
            }
            *url = new;
        }
    }

    /// Trading REST root for one account: `{trade}/{exchange}/{account}`.
    pub fn trade_url(&self, exchange: &str, account: &str) -> String {
        format!("{}/{}/{}", self.trade.trim_end_matches('/'), exchange, account)
    }

    /// Trading stream URL for one account: `{trade_ws}/{exchange}/{account}`.
    pub fn trade_ws_url(&self, exchange: &str, account: &str) -> String {
        format!("{}/{}/{}", self.trade_ws.trim_end_matches('/'), exchange, account)
    }

    /// Market-data stream URL with compressed frames enabled.
    pub fn tick_ws_url(&self) -> String {
        format!("{}?gzip=true", self.tick_ws.trim_end_matches('/'))
    }
}
