//! Low-level signed HTTP client, `RestClient`.
//!
//! One generic `api_call` plus verb helpers. Every request is signed when
//! credentials are present, carries the `source` query tag, and is bounded by an
//! explicit timeout. Non-success responses are classified into [`HttpError`]
//! kinds; nothing is surfaced as both a value and an error.

use crate::auth::Credentials;
use crate::error::HttpError;
use crate::http::retry::{RetryConfig, RetryPolicy};
use crate::network::SDK_SOURCE;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Query parameters, in send order.
pub type Params = Vec<(&'static str, String)>;

/// Low-level HTTP client for one REST root.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Client,
    credentials: Option<Credentials>,
    /// Prefix of the signed path, e.g. `/okex/demo` for account endpoints.
    sign_prefix: String,
    timeout: Duration,
}

impl RestClient {
    /// Unsigned client (public market data).
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials: None,
            sign_prefix: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sign every request, with `sign_prefix` prepended to the endpoint path.
    pub fn signed(mut self, credentials: Credentials, sign_prefix: impl Into<String>) -> Self {
        self.credentials = Some(credentials);
        self.sign_prefix = sign_prefix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Verb helpers ─────────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Params,
        retry: RetryPolicy,
    ) -> Result<T, HttpError> {
        self.api_call(Method::GET, endpoint, params, None::<&()>, None, retry)
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        self.api_call(Method::POST, endpoint, Vec::new(), Some(body), None, RetryPolicy::None)
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        params: Params,
        body: &B,
    ) -> Result<T, HttpError> {
        self.api_call(Method::PATCH, endpoint, params, Some(body), None, RetryPolicy::None)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Params,
    ) -> Result<T, HttpError> {
        self.api_call(Method::DELETE, endpoint, params, None::<&()>, None, RetryPolicy::None)
            .await
    }

    // ── Core call ────────────────────────────────────────────────────────

    /// Perform one signed call, retrying per `retry`.
    ///
    /// `timeout` overrides the client default for this call only.
    pub async fn api_call<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        params: Params,
        body: Option<&B>,
        timeout: Option<Duration>,
        retry: RetryPolicy,
    ) -> Result<T, HttpError> {
        let body_text = match body {
            Some(b) => Some(
                serde_json::to_string(b)
                    .map_err(|e| HttpError::Transport(format!("body serialization: {}", e)))?,
            ),
            None => None,
        };
        let timeout = timeout.unwrap_or(self.timeout);

        let config = match &retry {
            RetryPolicy::None => {
                return self
                    .do_request(&method, endpoint, &params, body_text.as_deref(), timeout)
                    .await;
            }
            RetryPolicy::Idempotent => RetryConfig::idempotent(),
            RetryPolicy::Custom(c) => c.clone(),
        };

        let mut attempt = 0;
        loop {
            let err = match self
                .do_request::<T>(&method, endpoint, &params, body_text.as_deref(), timeout)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            if !config.should_retry(&err) {
                return Err(err);
            }
            if attempt == config.max_retries {
                return Err(HttpError::MaxRetriesExceeded {
                    attempts: attempt + 1,
                    last_error: err.to_string(),
                });
            }
            let delay = config.delay_for_attempt(attempt);
            attempt += 1;
            tracing::debug!(
                attempt,
                of = config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying {} {}",
                method,
                endpoint
            );
            futures_timer::Delay::new(delay).await;
        }
    }

    async fn do_request<T: DeserializeOwned>(
        &self,
        method: &Method,
        endpoint: &str,
        params: &[(&'static str, String)],
        body: Option<&str>,
        timeout: Duration,
    ) -> Result<T, HttpError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .query(params)
            .query(&[("source", SDK_SOURCE)])
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(creds) = &self.credentials {
            let path = format!("{}{}", self.sign_prefix, endpoint);
            for (name, value) in creds.signed_headers(method.as_str(), &path, body).to_vec() {
                req = req.header(name, value);
            }
        }

        if let Some(b) = body {
            req = req.body(b.to_string());
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(HttpError::from_status(status.as_u16(), text));
        }

        serde_json::from_str::<T>(&text).map_err(|_| HttpError::NotJson(text))
    }
}
