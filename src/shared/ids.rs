//! Client-side identifiers for orders and withdrawals.

use chrono::Local;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric id whose first character is a letter.
pub fn rand_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(len);
    if len == 0 {
        return out;
    }
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    out.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    out.extend((1..len).map(|_| rng.sample(Alphanumeric) as char));
    out
}

/// `{contract}-{YYYYMMDDHHmmss}{14 random}`, e.g. `binance/btc.usdt-20190816152332asdfqwer123450`.
pub fn rand_client_oid(contract: &str) -> String {
    let now = Local::now().format("%Y%m%d%H%M%S");
    format!("{}-{}{}", contract, now, rand_id(14))
}

/// `{exchange}/{currency}-{YYYYMMDD-HHmmss}-{5 random}`.
pub fn rand_client_wid(exchange: &str, currency: &str) -> String {
    let now = Local::now().format("%Y%m%d-%H%M%S");
    format!("{}/{}-{}-{}", exchange, currency, now, rand_id(5))
}
