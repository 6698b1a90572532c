//! HTTP layer: signed `RestClient` with per-call retry policies.

pub mod client;
pub mod retry;

pub use client::{Params, RestClient, DEFAULT_TIMEOUT};
pub use retry::{RetryConfig, RetryPolicy};
