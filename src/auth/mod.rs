//! Authentication: API credentials, nonces and HMAC-SHA256 request signing.
//!
//! ## Signing Model
//!
//! Every authenticated request (REST call or streaming handshake) carries three
//! headers:
//!
//! - `Api-Nonce`: microsecond UNIX timestamp as a decimal string
//! - `Api-Key`: the public key
//! - `Api-Signature`: lowercase hex HMAC-SHA256 of `verb + path + nonce + body`
//!
//! The path excludes the query string. The body is the exact JSON text that goes
//! on the wire, so callers serialize once and sign those bytes.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_NONCE: &str = "Api-Nonce";
pub const HEADER_KEY: &str = "Api-Key";
pub const HEADER_SIGNATURE: &str = "Api-Signature";

/// Sign a request and return the lowercase hex digest.
pub fn sign(secret: &str, verb: &str, path: &str, nonce: &str, body: Option<&str>) -> String {
    let message = format!("{}{}{}{}", verb, path, nonce, body.unwrap_or(""));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

static LAST_NONCE: AtomicU64 = AtomicU64::new(0);

/// Current time in microseconds, bumped so two calls never return the same value.
pub fn gen_nonce() -> String {
    let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
    let mut prev = LAST_NONCE.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_NONCE.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

/// API key pair.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(alias = "ot_key")]
    pub api_key: String,
    #[serde(alias = "ot_secret")]
    api_secret: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn sign(&self, verb: &str, path: &str, nonce: &str, body: Option<&str>) -> String {
        sign(&self.api_secret, verb, path, nonce, body)
    }

    /// Headers for a request signed with a fresh nonce.
    pub fn signed_headers(&self, verb: &str, path: &str, body: Option<&str>) -> SignedHeaders {
        let nonce = gen_nonce();
        let signature = self.sign(verb, path, &nonce, body);
        SignedHeaders {
            nonce,
            api_key: self.api_key.clone(),
            signature,
        }
    }
}

/// The three authentication headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub nonce: String,
    pub api_key: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn to_vec(&self) -> Vec<(String, String)> {
        vec![
            (HEADER_NONCE.to_string(), self.nonce.clone()),
            (HEADER_KEY.to_string(), self.api_key.clone()),
            (HEADER_SIGNATURE.to_string(), self.signature.clone()),
        ]
    }
}
