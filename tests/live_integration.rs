//! Integration tests against the live gateway.
//!
//! All tests are `#[ignore]` because they require network access. The trading
//! tests also need an account: put these in `.env` (or the environment):
//!
//! ```text
//! TRADESTREAM_API_KEY=...
//! TRADESTREAM_API_SECRET=...
//! TRADESTREAM_TEST_ACCOUNT=mock/demo
//! ```
//!
//! Run with:
//! ```bash
//! cargo test --test live_integration -- --ignored
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;
use tokio_test::assert_ok;

use tradestream_sdk::prelude::*;

const TEST_TIMEOUT: Duration = Duration::from_secs(30);
const TEST_CONTRACT: &str = "binance/btc.usdt";

fn config() -> Config {
    let _ = dotenvy::dotenv();
    Config::load().expect("config should load")
}

fn test_account() -> Account {
    let config = config();
    let symbol = std::env::var("TRADESTREAM_TEST_ACCOUNT").unwrap_or_else(|_| "mock/demo".into());
    Account::from_config(&symbol, &config).expect("credentials in .env or config file")
}

// ─── Market data ─────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn last_tick_over_rest() {
    let quote = Quote::new(&config());
    let tick = assert_ok!(quote.get_last_tick(TEST_CONTRACT).await);
    assert_eq!(tick.contract.as_str(), TEST_CONTRACT);
    if let (Some(bid), Some(ask)) = (tick.bid1(), tick.ask1()) {
        assert!(bid <= ask, "crossed book: {}", tick);
    }
}

#[tokio::test]
#[ignore]
async fn contracts_of_an_exchange() {
    let quote = Quote::new(&config());
    let contracts = assert_ok!(quote.get_contracts("binance").await);
    assert!(contracts.iter().any(|c| c.symbol().as_str() == TEST_CONTRACT));

    let contract = assert_ok!(quote.get_contract(TEST_CONTRACT).await);
    assert_eq!(contract.name, "btc.usdt");
    assert!(matches!(
        quote.get_contract("binance/no-such.contract").await,
        Err(SdkError::Validation(_))
    ));
}

#[tokio::test]
#[ignore]
async fn tick_stream_delivers() {
    let quote = Quote::new(&config());
    quote.start().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let on_tick = handler(move |tick: Tick| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(tick);
            Ok(())
        }
    });
    assert_ok!(
        timeout(TEST_TIMEOUT, quote.subscribe_tick_v3(TEST_CONTRACT, on_tick))
            .await
            .expect("subscribe timed out")
    );

    timeout(TEST_TIMEOUT, async {
        while seen.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("no tick received");
    assert!(quote.last_tick(TEST_CONTRACT).is_some());
    quote.stop().await;
}

// ─── Trading ─────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn account_info_and_status() {
    let account = test_account();
    let info = assert_ok!(account.get_info().await);
    assert!(info.balance >= info.cash || info.balance.is_zero());
    assert_ok!(account.get_status().await);
}

#[tokio::test]
#[ignore]
async fn place_and_cancel_far_from_market() {
    let quote = Quote::new(&config());
    let tick = assert_ok!(quote.get_last_tick(TEST_CONTRACT).await);
    let price = (tick.last / rust_decimal::Decimal::from(2)).round_dp(2);

    let account = test_account();
    account.start().unwrap();
    let order = PlaceOrder::new(TEST_CONTRACT, Side::Buy, price, "0.001".parse().unwrap());
    let (placed, cancelled) = assert_ok!(
        account
            .place_and_cancel(order, Duration::from_secs(2))
            .await
    );
    assert!(placed.exchange_oid.is_some());
    assert!(!cancelled.is_null());
    account.stop().await;
}
