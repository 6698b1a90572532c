//! Market-data client: public REST plus the gzip tick stream.
//!
//! ```rust,ignore
//! let quote = Quote::new(&Config::load()?);
//! quote.start()?;
//! quote
//!     .subscribe_tick("okex/btc.usdt", handler(|tick: Tick| async move {
//!         println!("{}", tick);
//!         Ok(())
//!     }))
//!     .await?;
//! ```

pub mod protocol;

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::domain::contract::ContractWire;
use crate::domain::tick::wire::TickWire;
use crate::domain::{Candle, Contract, Tick};
use crate::error::{SdkError, WsError};
use crate::http::{Params, RestClient, RetryPolicy};
use crate::shared::{ContractSymbol, Resolution};
use crate::ws::{
    handler, ConnectionState, Connector, Handler, Protocol, StreamClient,
    TungsteniteConnector, WsConfig,
};

pub use protocol::{
    candle_request, tick_request, tick_v3_request, QuoteEvent, QuoteProtocol, CANDLE, TICK,
    TICK_V3,
};

pub struct Quote {
    rest: RestClient,
    stream: StreamClient<QuoteProtocol>,
}

impl Quote {
    pub fn new(config: &Config) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(config: &Config, connector: Arc<dyn Connector>) -> Self {
        let rest = RestClient::new(&config.hosts.rest).timeout(config.rest_timeout());
        let protocol = QuoteProtocol::new(config.hosts.tick_ws_url());
        let ws_config = WsConfig::from_stream_config(&config.stream, protocol.heartbeat_policy());
        Self {
            rest,
            stream: StreamClient::with_connector(ws_config, protocol, connector),
        }
    }

    // ── Streaming lifecycle ──────────────────────────────────────────────

    /// Start the stream supervisor. Idempotent; nothing connects until the
    /// first subscription.
    pub fn start(&self) -> Result<(), WsError> {
        self.stream.start()
    }

    /// Close the stream and drop every cached book and tick. Final.
    pub async fn stop(&self) {
        self.stream.stop().await;
        self.stream.protocol().clear();
    }

    pub fn state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.stream.watch_state()
    }

    pub fn ws_supported(&self) -> bool {
        self.stream.is_supported()
    }

    pub fn stream(&self) -> &StreamClient<QuoteProtocol> {
        &self.stream
    }

    /// Most recent tick received on `single-tick-verbose` or `tick-v3`.
    pub fn last_tick(&self, contract: &str) -> Option<Tick> {
        self.stream.protocol().last_tick(&ContractSymbol::from(contract))
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    pub async fn subscribe_tick(
        &self,
        contract: &str,
        on_tick: Handler<Tick>,
    ) -> Result<(), SdkError> {
        let request = tick_request(&ContractSymbol::from(contract));
        self.stream.subscribe(request, tick_handler(on_tick)).await?;
        Ok(())
    }

    pub fn unsubscribe_tick(&self, contract: &str) -> bool {
        self.stream.unsubscribe(&tick_request(&ContractSymbol::from(contract)))
    }

    /// Full ticks rebuilt from `tick-v3` snapshots and deltas.
    pub async fn subscribe_tick_v3(
        &self,
        contract: &str,
        on_tick: Handler<Tick>,
    ) -> Result<(), SdkError> {
        let request = tick_v3_request(&ContractSymbol::from(contract));
        self.stream.subscribe(request, tick_handler(on_tick)).await?;
        Ok(())
    }

    pub fn unsubscribe_tick_v3(&self, contract: &str) -> bool {
        let contract = ContractSymbol::from(contract);
        let removed = self.stream.unsubscribe(&tick_v3_request(&contract));
        if removed {
            self.stream.protocol().forget_book(&contract);
        }
        removed
    }

    pub async fn subscribe_candle(
        &self,
        contract: &str,
        duration: Resolution,
        on_candle: Handler<Candle>,
    ) -> Result<(), SdkError> {
        let request = candle_request(&ContractSymbol::from(contract), duration.as_str());
        let adapted = handler(move |event: QuoteEvent| {
            let on_candle = Arc::clone(&on_candle);
            async move {
                match event {
                    QuoteEvent::Candle(candle) => on_candle(candle).await,
                    QuoteEvent::Tick(_) => Ok(()),
                }
            }
        });
        self.stream.subscribe(request, adapted).await?;
        Ok(())
    }

    pub fn unsubscribe_candle(&self, contract: &str, duration: Resolution) -> bool {
        self.stream.unsubscribe(&candle_request(
            &ContractSymbol::from(contract),
            duration.as_str(),
        ))
    }

    // ── REST ─────────────────────────────────────────────────────────────

    /// `GET /quote/single-tick/{contract}`.
    pub async fn get_last_tick(&self, contract: &str) -> Result<Tick, SdkError> {
        let endpoint = format!("/quote/single-tick/{}", contract);
        let wire: TickWire = self
            .rest
            .get(&endpoint, Vec::new(), RetryPolicy::Idempotent)
            .await?;
        Ok(wire.into())
    }

    /// Every contract listed on `exchange`.
    pub async fn get_contracts(&self, exchange: &str) -> Result<Vec<Contract>, SdkError> {
        let params = vec![("exchange", exchange.to_string())];
        self.contracts(params).await
    }

    /// One contract by `exchange/name`.
    pub async fn get_contract(&self, symbol: &str) -> Result<Contract, SdkError> {
        let symbol = ContractSymbol::from(symbol);
        let (exchange, name) = (symbol.exchange(), symbol.name());
        if exchange.is_empty() || name.is_empty() {
            return Err(SdkError::Validation(format!("bad contract symbol: {}", symbol)));
        }
        let params = vec![("exchange", exchange.to_string()), ("name", name.to_string())];
        self.contracts(params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::Validation(format!("contract not found: {}", symbol)))
    }

    async fn contracts(&self, params: Params) -> Result<Vec<Contract>, SdkError> {
        let wire: Vec<ContractWire> = self
            .rest
            .get("/basic/contracts", params, RetryPolicy::Idempotent)
            .await?;
        wire.into_iter().map(Contract::try_from).collect()
    }
}

fn tick_handler(on_tick: Handler<Tick>) -> Handler<QuoteEvent> {
    handler(move |event: QuoteEvent| {
        let on_tick = Arc::clone(&on_tick);
        async move {
            match event {
                QuoteEvent::Tick(tick) => on_tick(tick).await,
                QuoteEvent::Candle(_) => Ok(()),
            }
        }
    })
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Quote {}>", self.stream.state())
    }
}
