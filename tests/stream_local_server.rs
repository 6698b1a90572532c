//! End-to-end tests against an in-process gateway.
//!
//! A `tokio-tungstenite` server on 127.0.0.1 plays the streaming side and an
//! axum mock plays the REST side. The clients are built from a
//! `Config` whose hosts point at them, so every byte goes through the real
//! transports.
//!
//! Run with:
//! ```bash
//! cargo test --test stream_local_server
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use tradestream_sdk::auth::{sign, HEADER_KEY, HEADER_NONCE, HEADER_SIGNATURE};
use tradestream_sdk::config::StreamConfig;
use tradestream_sdk::prelude::*;
use tradestream_sdk::quote::{candle_request, tick_request};

mod support;
use support::{MockRest, Reply};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Gateway ─────────────────────────────────────────────────────────────────

/// One accepted stream. Pings are answered with pongs until `mute` is set.
struct Session {
    headers: Vec<(String, String)>,
    incoming: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Message>,
    mute: Arc<AtomicBool>,
}

impl Session {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn send_json(&self, value: Value) {
        let _ = self.outgoing.send(Message::Text(value.to_string().into()));
    }

    fn send_gzip(&self, value: Value) {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(value.to_string().as_bytes()).unwrap();
        let bytes = encoder.finish().unwrap();
        let _ = self.outgoing.send(Message::Binary(bytes.into()));
    }

    fn stop_answering_pings(&self) {
        self.mute.store(true, Ordering::SeqCst);
    }

    /// Next frame from the client, `None` once it hung up.
    async fn recv(&mut self) -> Option<Value> {
        timeout(TEST_TIMEOUT, self.incoming.recv())
            .await
            .expect("no frame from client")
    }

    async fn expect_uri(&mut self, uri: &str) -> Value {
        loop {
            let frame = self.recv().await.expect("client hung up");
            if frame["uri"] == uri {
                return frame;
            }
        }
    }

    /// Frames received within `window`.
    async fn drain_for(&mut self, window: Duration) -> Vec<Value> {
        let mut frames = Vec::new();
        let _ = timeout(window, async {
            while let Some(frame) = self.incoming.recv().await {
                frames.push(frame);
            }
        })
        .await;
        frames
    }

    async fn closed(&mut self) {
        timeout(TEST_TIMEOUT, async { while self.incoming.recv().await.is_some() {} })
            .await
            .expect("client kept the session open");
    }
}

struct Gateway {
    listener: TcpListener,
    port: u16,
}

impl Gateway {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    async fn accept(&self) -> Session {
        let (tcp, _) = timeout(TEST_TIMEOUT, self.listener.accept())
            .await
            .expect("no connection attempt")
            .unwrap();

        let mut headers = Vec::new();
        let ws = tokio_tungstenite::accept_hdr_async(
            tcp,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                headers = req
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect();
                Ok(resp)
            },
        )
        .await
        .unwrap();

        let (in_tx, incoming) = mpsc::unbounded_channel();
        let (outgoing, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let mute = Arc::new(AtomicBool::new(false));
        let muted = Arc::clone(&mute);

        let (mut sink, mut stream) = ws.split();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                                continue;
                            };
                            if frame["uri"] == "ping" {
                                if !muted.load(Ordering::SeqCst) {
                                    let pong = json!({"uri": "pong", "uuid": frame["uuid"]});
                                    let _ = sink.send(Message::Text(pong.to_string().into())).await;
                                }
                                continue;
                            }
                            if in_tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = out_rx.recv() => match out {
                        Some(msg) => {
                            if sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                }
            }
        });

        Session {
            headers,
            incoming,
            outgoing,
            mute,
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn config(port: u16) -> Config {
    let mut config = Config::default();
    config
        .hosts
        .change_host(&format!("127.0.0.1:{}/", port), "1token.trade/", true);
    config.stream = StreamConfig {
        ping_interval_secs: 1,
        connect_timeout_secs: 5,
        backoff_initial_secs: 1,
        backoff_max_secs: 2,
        ..StreamConfig::default()
    };
    config
}

fn collector<T: Send + 'static>() -> (Handler<T>, Arc<Mutex<Vec<T>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let h = handler(move |event: T| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(event);
            Ok(())
        }
    });
    (h, seen)
}

async fn wait_len<T>(seen: &Arc<Mutex<Vec<T>>>, len: usize) {
    timeout(TEST_TIMEOUT, async {
        while seen.lock().unwrap().len() < len {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("handler not called often enough");
}

async fn wait_state(mut rx: tokio::sync::watch::Receiver<ConnectionState>, want: ConnectionState) {
    timeout(TEST_TIMEOUT, rx.wait_for(|s| *s == want))
        .await
        .expect("state not reached")
        .expect("state channel closed");
}

fn order_frame(oid: &str, status: &str, version: u64) -> Value {
    json!({
        "contract": "okex/btc.usdt", "bs": "b", "entrust_price": 100, "entrust_amount": 1,
        "dealt_amount": if status == "dealt" { 1 } else { 0 },
        "exchange_oid": oid, "client_oid": "c-1", "status": status, "version": version
    })
}

/// Start `quote`, subscribe `contract` in the background, and complete the
/// auth handshake on the session it opens.
async fn ready_quote(
    gateway: &Gateway,
    contract: &str,
) -> (Arc<Quote>, Session, Arc<Mutex<Vec<Tick>>>) {
    let quote = Arc::new(Quote::new(&config(gateway.port)));
    quote.start().unwrap();

    let (on_tick, seen) = collector::<Tick>();
    let subscriber = Arc::clone(&quote);
    let contract_owned = contract.to_string();
    let subscribing =
        tokio::spawn(async move { subscriber.subscribe_tick(&contract_owned, on_tick).await });

    let mut session = gateway.accept().await;
    let auth = session.expect_uri("auth").await;
    assert_eq!(auth["sample-rate"], 0);
    session.send_json(json!({"uri": "auth", "code": "ok"}));
    subscribing.await.unwrap().unwrap();
    assert_eq!(quote.state(), ConnectionState::Ready);

    let sub = session.expect_uri("subscribe-single-tick-verbose").await;
    assert_eq!(sub["contract"], contract);
    (quote, session, seen)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quote_gzip_tick_reaches_handler() {
    let gateway = Gateway::bind().await;
    let (quote, session, seen) = ready_quote(&gateway, "okex/btc.usdt").await;

    session.send_gzip(json!({"uri": "single-tick-verbose", "data": {
        "contract": "okex/btc.usdt", "time": "2019-08-16T07:23:32.123Z",
        "exchange_time": "2019-08-16T07:23:32.000Z",
        "last": 10000.5, "volume": 12,
        "bids": [{"price": 10000, "volume": 1}, {"price": 10000.25, "volume": 3}],
        "asks": [{"price": 10001, "volume": 2}]
    }}));
    // Frames for contracts nobody subscribed to are dropped.
    session.send_json(json!({"uri": "single-tick-verbose", "data": {
        "contract": "okex/eth.usdt", "time": 1565940212, "last": 1, "volume": 1,
        "bids": [], "asks": []
    }}));

    wait_len(&seen, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let ticks = seen.lock().unwrap().clone();
    assert_eq!(ticks.len(), 1);
    let tick = &ticks[0];
    assert_eq!(tick.contract.as_str(), "okex/btc.usdt");
    assert_eq!(tick.bid1(), Some("10000.25".parse().unwrap()));
    assert_eq!(tick.ask1(), Some("10001".parse().unwrap()));
    assert_eq!(quote.last_tick("okex/btc.usdt").as_ref(), Some(tick));

    quote.stop().await;
    assert_eq!(quote.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn forced_reconnect_replays_each_subscription_once() {
    let gateway = Gateway::bind().await;
    let (quote, mut first, _seen) = ready_quote(&gateway, "okex/btc.usdt").await;

    let (on_b, _) = collector::<Tick>();
    let (on_b2, _) = collector::<Tick>();
    let (on_candle, _) = collector::<Candle>();
    quote.subscribe_tick("okex/eth.usdt", on_b).await.unwrap();
    quote.subscribe_tick("okex/eth.usdt", on_b2).await.unwrap();
    quote
        .subscribe_candle("okex/btc.usdt", Resolution::Minute1, on_candle)
        .await
        .unwrap();
    assert_eq!(quote.stream().registry().len(), 3);

    quote.stream().force_reconnect();
    first.closed().await;

    let mut second = gateway.accept().await;
    second.expect_uri("auth").await;
    second.send_json(json!({"uri": "auth"}));
    wait_state(quote.watch_state(), ConnectionState::Ready).await;

    let frames = second.drain_for(Duration::from_millis(500)).await;
    let mut subscribed: Vec<String> = frames
        .iter()
        .filter(|f| f["uri"].as_str().is_some_and(|u| u.starts_with("subscribe-")))
        .map(|f| format!("{}:{}", f["uri"], f["contract"]))
        .collect();
    subscribed.sort();
    assert_eq!(
        subscribed,
        vec![
            "\"subscribe-candle\":\"okex/btc.usdt\"",
            "\"subscribe-single-tick-verbose\":\"okex/btc.usdt\"",
            "\"subscribe-single-tick-verbose\":\"okex/eth.usdt\"",
        ]
    );

    let registry = quote.stream().registry();
    assert_eq!(registry.handler_count(&tick_request(&"okex/eth.usdt".into()).key()), 2);
    assert_eq!(registry.handler_count(&tick_request(&"okex/btc.usdt".into()).key()), 1);
    assert_eq!(
        registry.handler_count(&candle_request(&"okex/btc.usdt".into(), "1m").key()),
        1
    );
    quote.stop().await;
}

#[tokio::test]
async fn lost_heartbeat_reconnects() {
    let gateway = Gateway::bind().await;
    let (quote, mut first, _seen) = ready_quote(&gateway, "okex/btc.usdt").await;

    let states = quote.watch_state();
    first.stop_answering_pings();
    wait_state(states, ConnectionState::GoingToConnect).await;
    first.closed().await;

    let mut second = gateway.accept().await;
    second.expect_uri("auth").await;
    second.send_json(json!({"uri": "auth"}));
    second.expect_uri("subscribe-single-tick-verbose").await;
    assert_eq!(quote.state(), ConnectionState::Ready);
    quote.stop().await;
}

#[tokio::test]
async fn no_router_found_parks_the_account() {
    let gateway = Gateway::bind().await;
    let account = Arc::new(
        Account::new("mockex/demo", Credentials::new("key", "secret"), &config(gateway.port))
            .unwrap(),
    );
    account.start().unwrap();

    let (on_order, _) = collector::<Order>();
    let subscriber = Arc::clone(&account);
    let subscribing = tokio::spawn(async move { subscriber.subscribe_orders(on_order).await });

    let session = gateway.accept().await;
    session.send_json(json!({"code": "no-router-found", "message": "no router for mockex"}));

    let result = subscribing.await.unwrap();
    assert!(matches!(result, Err(SdkError::Ws(WsError::Unsupported))));
    assert!(!account.ws_supported());
    wait_state(account.watch_state(), ConnectionState::Idle).await;
    account.stop().await;
}

#[tokio::test]
async fn account_handshake_is_signed_and_finished_orders_are_dropped() {
    let gateway = Gateway::bind().await;
    let account = Arc::new(
        Account::new("okex/demo", Credentials::new("key", "secret"), &config(gateway.port))
            .unwrap(),
    );
    account.start().unwrap();

    let (on_any, all_updates) = collector::<Order>();
    let subscriber = Arc::clone(&account);
    let subscribing = tokio::spawn(async move { subscriber.subscribe_orders(on_any).await });

    let mut session = gateway.accept().await;
    assert_eq!(session.header(HEADER_KEY), Some("key"));
    let nonce = session.header(HEADER_NONCE).expect("nonce header").to_string();
    assert_eq!(
        session.header(HEADER_SIGNATURE),
        Some(sign("secret", "GET", "/ws/demo", &nonce, None).as_str())
    );

    session.send_json(json!({"uri": "connection", "code": "ok"}));
    subscribing.await.unwrap().unwrap();
    session.expect_uri("sub-order").await;

    let (on_tracked, tracked) = collector::<Order>();
    account
        .tracker()
        .track("okex/btc.usdt-x1", on_tracked, account.stream().stop_signal())
        .expect("fresh id can be tracked");

    let push = |status: &str, version: u64| {
        session.send_json(json!({
            "uri": "order", "status": "ok",
            "data": [order_frame("okex/btc.usdt-x1", status, version)]
        }));
    };
    push("pending", 1);
    push("dealt", 2);
    push("withdrawn", 3);

    wait_len(&all_updates, 3).await;
    wait_len(&tracked, 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let statuses: Vec<OrderStatus> =
        tracked.lock().unwrap().iter().map(|o| o.status.clone()).collect();
    assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Dealt]);
    assert!(!account.tracker().is_tracked("okex/btc.usdt-x1"));
    assert!(account.tracker().is_finished("okex/btc.usdt-x1"));

    account.stop().await;
    assert!(account.tracker().is_empty());
}

#[tokio::test]
async fn placed_order_is_signed_and_tracked() {
    let gateway = Gateway::bind().await;
    let rest = MockRest::serve(|_, _| {
        Reply::json(json!({"exchange_oid": "okex/btc.usdt-x9", "client_oid": "okex/btc.usdt-c9"}))
    })
    .await;
    let mut config = config(gateway.port);
    config.hosts.trade = format!("{}/trade", rest.base);

    let account =
        Arc::new(Account::new("okex/demo", Credentials::new("key", "secret"), &config).unwrap());
    account.start().unwrap();

    let (on_update, updates) = collector::<Order>();
    let placer = Arc::clone(&account);
    let placing = tokio::spawn(async move {
        let order = PlaceOrder::new(
            "okex/btc.usdt",
            Side::Buy,
            "100.5".parse().unwrap(),
            "0.25".parse().unwrap(),
        )
        .client_oid("okex/btc.usdt-c9");
        placer.place_order(order, Some(on_update)).await
    });

    // The order channel is registered before the POST goes out.
    let mut session = gateway.accept().await;
    session.send_json(json!({"uri": "connection", "code": "ok"}));
    session.expect_uri("sub-order").await;

    let posted = rest.wait_for(1, TEST_TIMEOUT).await.remove(0);
    assert_eq!(posted.method, "POST");
    assert_eq!(posted.path, "/api/v1/trade/okex/demo/orders");
    assert!(posted.query.starts_with("source="), "{}", posted.query);
    let sent: Value = serde_json::from_str(&posted.body).unwrap();
    assert_eq!(sent["contract"], "okex/btc.usdt");
    assert_eq!(sent["bs"], "b");
    assert_eq!(sent["price"], 100.5);
    assert_eq!(sent["amount"], 0.25);
    assert_eq!(sent["client_oid"], "okex/btc.usdt-c9");
    assert_eq!(posted.header(HEADER_KEY), Some("key"));
    let nonce = posted.header(HEADER_NONCE).expect("nonce header");
    let body = posted.body.as_str();
    assert_eq!(
        posted.header(HEADER_SIGNATURE),
        Some(sign("secret", "POST", "/okex/demo/orders", nonce, Some(body)).as_str())
    );

    let response = placing.await.unwrap().unwrap();
    assert_eq!(response.exchange_oid.as_deref(), Some("okex/btc.usdt-x9"));

    session.send_json(json!({
        "uri": "order", "status": "ok",
        "data": [order_frame("okex/btc.usdt-x9", "dealt", 1)]
    }));
    wait_len(&updates, 1).await;
    assert_eq!(updates.lock().unwrap()[0].status, OrderStatus::Dealt);
    timeout(TEST_TIMEOUT, async {
        while !account.tracker().is_finished("okex/btc.usdt-x9") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("terminal update did not finish the order");

    account.stop().await;
}
