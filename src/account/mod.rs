//! Trading account client: signed REST plus the `info`/`order` stream.
//!
//! ```rust,ignore
//! let config = Config::load()?;
//! let account = Account::from_config("binance/demo", &config)?;
//! account.start()?;
//!
//! let order = PlaceOrder::new("binance/btc.usdt", Side::Buy, price, amount);
//! account
//!     .place_order(order, Some(handler(|o: Order| async move {
//!         println!("{} {}", o.status, o.dealt_amount);
//!         Ok(())
//!     })))
//!     .await?;
//! ```

pub mod protocol;
mod rest;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::Credentials;
use crate::config::Config;
use crate::domain::order::tracker::REAP_INTERVAL;
use crate::domain::order::{Order, OrderTracker};
use crate::domain::Info;
use crate::error::{SdkError, WsError};
use crate::http::RestClient;
use crate::shared::{AccountSymbol, ContractSymbol};
use crate::ws::registry::lock;
use crate::ws::{
    handler, ConnectionState, Connector, Handler, Protocol, StreamClient,
    SubscriptionRequest, TungsteniteConnector, WsConfig,
};

pub use protocol::{AccountEvent, AccountProtocol, INFO, ORDER};

/// One trading account on one exchange.
pub struct Account {
    symbol: AccountSymbol,
    rest: RestClient,
    stream: StreamClient<AccountProtocol>,
    tracker: Arc<OrderTracker>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Account {
    /// `symbol` is `exchange/account` or `exchange/account/coin.base` for a
    /// margin account.
    pub fn new(symbol: &str, credentials: Credentials, config: &Config) -> Result<Self, SdkError> {
        Self::with_connector(symbol, credentials, config, Arc::new(TungsteniteConnector))
    }

    /// Credentials from `config` (file or environment).
    pub fn from_config(symbol: &str, config: &Config) -> Result<Self, SdkError> {
        let credentials = config.require_credentials()?;
        Self::new(symbol, credentials, config)
    }

    pub fn with_connector(
        symbol: &str,
        credentials: Credentials,
        config: &Config,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SdkError> {
        let symbol: AccountSymbol = symbol.parse()?;
        let (exchange, name) = (symbol.exchange(), symbol.name());

        let rest = RestClient::new(&config.hosts.trade_url(exchange, name))
            .signed(credentials.clone(), format!("/{}/{}", exchange, name))
            .timeout(config.rest_timeout());

        let tracker = Arc::new(OrderTracker::new(Duration::from_secs(
            config.stream.order_reap_timeout_secs,
        )));
        let protocol = AccountProtocol::new(
            format!("{}/{}", exchange, name),
            config.hosts.trade_ws_url(exchange, name),
            name,
            credentials,
            Arc::clone(&tracker),
        );
        let ws_config = WsConfig::from_stream_config(&config.stream, protocol.heartbeat_policy());

        Ok(Self {
            rest,
            stream: StreamClient::with_connector(ws_config, protocol, connector),
            tracker,
            reaper: Mutex::new(None),
            symbol,
        })
    }

    pub fn symbol(&self) -> &AccountSymbol {
        &self.symbol
    }

    pub fn exchange(&self) -> &str {
        self.symbol.exchange()
    }

    pub fn name(&self) -> &str {
        self.symbol.name()
    }

    pub fn margin_contract(&self) -> Option<ContractSymbol> {
        self.symbol.margin_contract()
    }

    // ── Streaming lifecycle ──────────────────────────────────────────────

    /// Start the stream supervisor and the order reaper. Idempotent.
    pub fn start(&self) -> Result<(), WsError> {
        self.stream.start()?;
        let mut reaper = lock(&self.reaper);
        if reaper.is_none() {
            *reaper = Some(
                self.tracker
                    .spawn_reaper(REAP_INTERVAL, self.stream.stop_signal()),
            );
        }
        Ok(())
    }

    /// Close the stream and end every task. The account cannot be restarted.
    pub async fn stop(&self) {
        self.stream.stop().await;
        let reaper = lock(&self.reaper).take();
        if let Some(reaper) = reaper {
            let _ = reaper.await;
        }
        self.tracker.clear();
    }

    pub fn state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.stream.watch_state()
    }

    /// `false` once the gateway reported it has no stream for this exchange.
    pub fn ws_supported(&self) -> bool {
        self.stream.is_supported()
    }

    pub fn stream(&self) -> &StreamClient<AccountProtocol> {
        &self.stream
    }

    pub fn tracker(&self) -> &Arc<OrderTracker> {
        &self.tracker
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    /// Receive every `info` push. Waits for the stream to be ready.
    pub async fn subscribe_info(&self, on_info: Handler<Info>) -> Result<(), SdkError> {
        let adapted = handler(move |event: AccountEvent| {
            let on_info = Arc::clone(&on_info);
            async move {
                match event {
                    AccountEvent::Info(info) => on_info(info).await,
                    AccountEvent::Order(_) => Ok(()),
                }
            }
        });
        self.stream
            .subscribe(SubscriptionRequest::new(INFO), adapted)
            .await?;
        Ok(())
    }

    pub fn unsubscribe_info(&self) -> bool {
        self.stream.unsubscribe(&SubscriptionRequest::new(INFO))
    }

    /// Receive every order update on the account.
    pub async fn subscribe_orders(&self, on_order: Handler<Order>) -> Result<(), SdkError> {
        self.stream
            .subscribe(SubscriptionRequest::new(ORDER), order_handler(on_order))
            .await?;
        Ok(())
    }

    pub fn unsubscribe_orders(&self) -> bool {
        self.stream.unsubscribe(&SubscriptionRequest::new(ORDER))
    }

    /// Make sure the `order` channel is registered so updates reach the
    /// tracker. `false` when the venue has no stream.
    fn ensure_order_channel(&self) -> Result<bool, SdkError> {
        match self.stream.register(SubscriptionRequest::new(ORDER), None) {
            Ok(()) => Ok(true),
            Err(WsError::Unsupported) => {
                tracing::warn!(
                    account = %self.symbol,
                    "Streaming not supported for {}; order updates will not be delivered",
                    self.exchange()
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn order_handler(on_order: Handler<Order>) -> Handler<AccountEvent> {
    handler(move |event: AccountEvent| {
        let on_order = Arc::clone(&on_order);
        async move {
            match event {
                AccountEvent::Order(order) => on_order(order).await,
                AccountEvent::Info(_) => Ok(()),
            }
        }
    })
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.symbol)
    }
}

impl Drop for Account {
    fn drop(&mut self) {
        if let Some(reaper) = lock(&self.reaper).take() {
            reaper.abort();
        }
    }
}
