//! The socket seam.
//!
//! [`Connector`] opens one duplex message transport. Production uses
//! [`TungsteniteConnector`]; tests substitute an in-memory pair.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::error::WsError;

/// Where to connect, plus any handshake headers (signed auth for trading).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ConnectRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

pub type MessageSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// An open transport, split into its write and read halves.
pub struct Transport {
    pub sink: MessageSink,
    pub stream: MessageStream,
}

pub trait Connector: Send + Sync + 'static {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<Transport, WsError>>;
}

/// `tokio-tungstenite` over TCP/TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<Transport, WsError>> {
        Box::pin(async move {
            let mut req = request
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
            for (name, value) in &request.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| WsError::ConnectionFailed(format!("header {}: {}", name, e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| WsError::ConnectionFailed(format!("header value: {}", e)))?;
                req.headers_mut().insert(name, value);
            }

            let (ws_stream, _) = connect_async(req)
                .await
                .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
            let (sink, stream) = ws_stream.split();

            Ok(Transport {
                sink: Box::pin(sink.sink_map_err(|e| WsError::SendFailed(e.to_string()))),
                stream: Box::pin(
                    stream.map(|r| r.map_err(|e| WsError::ConnectionFailed(e.to_string()))),
                ),
            })
        })
    }
}
