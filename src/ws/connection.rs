//! Connection manager: [`StreamClient`].
//!
//! One supervisor task owns the transport. It moves the client through
//! [`ConnectionState`], runs the session pump inline, and reconnects with
//! [`Backoff`] after any failure until [`StreamClient::stop`] is called.
//!
//! ```text
//! Idle ─subscribe─▶ GoingToConnect ─open─▶ Connecting ─auth ack─▶ Ready
//!   ▲                    ▲                                          │
//!   │                    └──── failure (backoff) ◀──────────────────┤
//!   └──────────── GoingToDisconnect ◀──── registry empty ───────────┘
//! ```
//!
//! The public API never touches the socket: frames are queued on the session's
//! unbounded writer channel, state is published on a `watch` channel, and a
//! second `watch` channel carries the stop flag every loop selects on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::WsError;
use crate::ws::backoff::Backoff;
use crate::ws::heartbeat::{HeartbeatMonitor, HeartbeatStatus};
use crate::ws::key::SubscriptionRequest;
use crate::ws::registry::{lock, stopped, Handler, SubscriptionRegistry};
use crate::ws::router::{AuthReply, MessageRouter, Protocol, RouteOutcome};
use crate::ws::transport::{Connector, Transport, TungsteniteConnector};
use crate::ws::{ConnectionState, WsConfig};

/// Bound on `stop()` waiting for the supervisor.
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Bound on flushing a close frame at the end of a session.
const CLOSE_WAIT: Duration = Duration::from_secs(1);

// ─── Session outcome ─────────────────────────────────────────────────────────

enum SessionEnd {
    /// Reconnect after a backoff sleep.
    Failed(WsError),
    /// The registry emptied.
    Disconnected,
    /// The gateway has no stream for this venue.
    Unsupported,
    Stopped,
}

// ─── Shared state ────────────────────────────────────────────────────────────

struct Shared<P: Protocol> {
    config: WsConfig,
    protocol: Arc<P>,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriptionRegistry<P::Event>>,
    state: watch::Sender<ConnectionState>,
    stop: watch::Sender<bool>,
    /// Writer channel of the live session, if any.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    supported: AtomicBool,
    /// Wakes the supervisor out of `Idle`.
    wake: Notify,
    /// Ends the live session as a failure. Each session installs its own, so
    /// a kick with no session running is dropped.
    kick: Mutex<Option<Arc<Notify>>>,
}

impl<P: Protocol> Shared<P> {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Move to `to` if the current state satisfies `from`. `Closed` is final.
    fn transition(
        &self,
        from: impl Fn(ConnectionState) -> bool,
        to: ConnectionState,
        reason: &str,
    ) -> bool {
        let client = self.protocol.name();
        self.state.send_if_modified(|state| {
            if *state == to || *state == ConnectionState::Closed || !from(*state) {
                return false;
            }
            tracing::info!(client, from = %state, to = %to, reason, "State change");
            *state = to;
            true
        })
    }

    fn request_connect(&self, reason: &str) {
        if self.transition(
            |s| s == ConnectionState::Idle,
            ConnectionState::GoingToConnect,
            reason,
        ) {
            self.wake.notify_one();
        }
    }

    fn request_disconnect(&self, reason: &str) {
        self.transition(
            |s| {
                matches!(
                    s,
                    ConnectionState::GoingToConnect
                        | ConnectionState::Connecting
                        | ConnectionState::Ready
                )
            },
            ConnectionState::GoingToDisconnect,
            reason,
        );
    }

    fn send_frame(&self, frame: &Value) -> Result<(), WsError> {
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx
                .send(Message::Text(frame.to_string().into()))
                .map_err(|_| WsError::NotConnected),
            None => Err(WsError::NotConnected),
        }
    }
}

// ─── Public StreamClient ─────────────────────────────────────────────────────

/// A streaming client driven by a [`Protocol`].
///
/// Nothing runs until [`start`](Self::start). Subscriptions survive reconnects:
/// on every new session their subscribe frames are replayed before the client
/// reports [`ConnectionState::Ready`].
pub struct StreamClient<P: Protocol> {
    shared: Arc<Shared<P>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Protocol> StreamClient<P> {
    pub fn new(config: WsConfig, protocol: P) -> Self {
        Self::with_connector(config, protocol, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(config: WsConfig, protocol: P, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (stop, stop_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                protocol: Arc::new(protocol),
                connector,
                registry: Arc::new(SubscriptionRegistry::new(stop_rx)),
                state,
                stop,
                outbound: Mutex::new(None),
                supported: AtomicBool::new(true),
                wake: Notify::new(),
                kick: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Spawn the supervisor. A second call is a no-op.
    pub fn start(&self) -> Result<(), WsError> {
        if self.shared.is_stopped() {
            return Err(WsError::Stopped);
        }
        let mut supervisor = lock(&self.supervisor);
        if supervisor.is_none() {
            tracing::debug!(client = self.shared.protocol.name(), "Starting supervisor");
            *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared))));
        }
        Ok(())
    }

    /// Stop for good: close the transport, end every task, publish `Closed`.
    pub async fn stop(&self) {
        if self.shared.stop.send_replace(true) {
            return;
        }
        tracing::info!(client = self.shared.protocol.name(), "Stopping");

        let handle = lock(&self.supervisor).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_WAIT, handle).await.is_err() {
                tracing::warn!(
                    client = self.shared.protocol.name(),
                    "Supervisor did not stop within {:?}",
                    STOP_WAIT
                );
            }
        }

        *lock(&self.shared.outbound) = None;
        self.shared.registry.clear();
        self.shared.state.send_if_modified(|state| {
            let changed = *state != ConnectionState::Closed;
            *state = ConnectionState::Closed;
            changed
        });
    }

    pub fn config(&self) -> &WsConfig {
        &self.shared.config
    }

    pub fn is_started(&self) -> bool {
        lock(&self.supervisor).is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// A receiver that turns `true` once the client is stopped.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.shared.stop.subscribe()
    }

    /// `false` once the gateway answered `no-router-found`.
    pub fn is_supported(&self) -> bool {
        self.shared.supported.load(Ordering::SeqCst)
    }

    pub fn protocol(&self) -> &Arc<P> {
        &self.shared.protocol
    }

    pub fn registry(&self) -> &SubscriptionRegistry<P::Event> {
        &self.shared.registry
    }

    /// Wait for `Ready`, then register `handler` under the request's key.
    ///
    /// Connects first if the client is idle. Handlers accumulate when the same
    /// key is subscribed more than once.
    pub async fn subscribe(
        &self,
        request: SubscriptionRequest,
        handler: Handler<P::Event>,
    ) -> Result<(), WsError> {
        self.wait_ready().await?;
        self.register(request, Some(handler))
    }

    /// Register without waiting for `Ready`.
    ///
    /// The subscribe frame goes out now when the session is ready, otherwise
    /// with the replay of the next session.
    pub fn register(
        &self,
        request: SubscriptionRequest,
        handler: Option<Handler<P::Event>>,
    ) -> Result<(), WsError> {
        self.ensure_usable()?;
        let shared = &self.shared;
        let key = request.key();
        let handlers = shared.registry.subscribe(request, handler, |req| {
            if shared.state() == ConnectionState::Ready {
                shared.send_frame(&req.subscribe_frame())
            } else {
                Err(WsError::NotConnected)
            }
        });
        tracing::debug!(client = shared.protocol.name(), key = %key, handlers, "Subscribed");
        shared.request_connect("subscription registered");
        Ok(())
    }

    /// Remove the request's key. `false` if it was not registered.
    pub fn unsubscribe(&self, request: &SubscriptionRequest) -> bool {
        let shared = &self.shared;
        let removed = shared.registry.unsubscribe(&request.key(), |req| {
            if shared.state() == ConnectionState::Ready {
                let _ = shared.send_frame(&req.unsubscribe_frame());
            }
        });
        if removed.is_some() && shared.registry.is_empty() {
            shared.request_disconnect("no subscriptions left");
        }
        removed.is_some()
    }

    /// Send a raw frame on the live session.
    pub fn send_json(&self, frame: &Value) -> Result<(), WsError> {
        self.shared.send_frame(frame)
    }

    /// Drop the live session as if the transport had failed. Returns `false`
    /// when no session was open.
    pub fn force_reconnect(&self) -> bool {
        let client = self.shared.protocol.name();
        match lock(&self.shared.kick).as_ref() {
            Some(kick) => {
                tracing::info!(client, "Reconnect requested");
                kick.notify_one();
                true
            }
            None => {
                tracing::debug!(client, "Reconnect requested with no open session");
                false
            }
        }
    }

    fn ensure_usable(&self) -> Result<(), WsError> {
        if self.shared.is_stopped() {
            return Err(WsError::Stopped);
        }
        if !self.is_supported() {
            return Err(WsError::Unsupported);
        }
        if !self.is_started() {
            return Err(WsError::NotConnected);
        }
        Ok(())
    }

    async fn wait_ready(&self) -> Result<(), WsError> {
        let mut state = self.shared.state.subscribe();
        loop {
            self.ensure_usable()?;
            let current = *state.borrow_and_update();
            match current {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Closed => return Err(WsError::Stopped),
                ConnectionState::Idle => self.shared.request_connect("subscribe requested"),
                _ => {}
            }
            if state.changed().await.is_err() {
                return Err(WsError::Stopped);
            }
        }
    }
}

impl<P: Protocol> Drop for StreamClient<P> {
    fn drop(&mut self) {
        self.shared.stop.send_replace(true);
        if let Some(handle) = lock(&self.supervisor).take() {
            handle.abort();
        }
    }
}

// ─── Supervisor ──────────────────────────────────────────────────────────────

async fn supervise<P: Protocol>(shared: Arc<Shared<P>>) {
    let mut backoff = shared.config.backoff();
    let mut stop = shared.stop.subscribe();
    let client = shared.protocol.name();

    loop {
        if *stop.borrow() {
            break;
        }
        match shared.state() {
            ConnectionState::Closed => break,
            ConnectionState::GoingToConnect => {
                match run_session(&shared, &mut backoff, &mut stop).await {
                    SessionEnd::Stopped => break,
                    SessionEnd::Disconnected => {}
                    SessionEnd::Unsupported => {
                        shared.supported.store(false, Ordering::SeqCst);
                        shared.transition(|_| true, ConnectionState::Idle, "streaming unsupported");
                    }
                    SessionEnd::Failed(e) => {
                        tracing::warn!(client, "Session failed: {}", e);
                        let reconnecting = shared.transition(
                            |s| {
                                matches!(s, ConnectionState::Connecting | ConnectionState::Ready)
                            },
                            ConnectionState::GoingToConnect,
                            "session failed",
                        ) || shared.state() == ConnectionState::GoingToConnect;
                        if !reconnecting {
                            continue;
                        }
                        let delay = backoff.next_delay();
                        tracing::info!(client, delay_secs = delay.as_secs_f64(), "Reconnecting");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = stopped(&mut stop) => break,
                        }
                    }
                }
            }
            // No session is running in any other state.
            _ => {
                shared.transition(|_| true, ConnectionState::Idle, "disconnected");
                let supported = shared.supported.load(Ordering::SeqCst);
                if supported && !shared.registry.is_empty() {
                    // A subscribe raced the disconnect.
                    shared.request_connect("subscriptions pending");
                    continue;
                }
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = stopped(&mut stop) => break,
                }
            }
        }
    }

    *lock(&shared.outbound) = None;
    tracing::debug!(client, "Supervisor finished");
}

// ─── Session ─────────────────────────────────────────────────────────────────

async fn run_session<P: Protocol>(
    shared: &Arc<Shared<P>>,
    backoff: &mut Backoff,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let config = &shared.config;
    let client = shared.protocol.name();

    if !shared.transition(
        |s| s == ConnectionState::GoingToConnect,
        ConnectionState::Connecting,
        "opening transport",
    ) {
        return SessionEnd::Disconnected;
    }

    // ── 1. Open the transport ────────────────────────────────────────────
    let request = match shared.protocol.handshake() {
        Ok(request) => request,
        Err(e) => return SessionEnd::Failed(e),
    };
    tracing::debug!(client, url = %request.url, "Connecting");
    let connect = tokio::time::timeout(config.connect_timeout, shared.connector.connect(request));
    let Transport { mut sink, mut stream } = tokio::select! {
        result = connect => match result {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return SessionEnd::Failed(e),
            Err(_) => return SessionEnd::Failed(WsError::ConnectTimeout),
        },
        _ = stopped(stop) => return SessionEnd::Stopped,
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    *lock(&shared.outbound) = Some(out_tx.clone());
    let kick = Arc::new(Notify::new());
    *lock(&shared.kick) = Some(Arc::clone(&kick));

    if let Some(frame) = shared.protocol.auth_frame() {
        let _ = out_tx.send(Message::Text(frame.to_string().into()));
    }

    // ── 2. Pump until the session ends ───────────────────────────────────
    let router = MessageRouter::new(Arc::clone(&shared.protocol), Arc::clone(&shared.registry));
    let heartbeat = Arc::new(HeartbeatMonitor::new(config.heartbeat));
    let heartbeat_lost = Arc::new(Notify::new());
    let mut state = shared.state.subscribe();
    let mut authorized = false;

    let auth_deadline = tokio::time::sleep(config.connect_timeout);
    tokio::pin!(auth_deadline);

    let end = loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = extract_close(frame.as_ref());
                    break SessionEnd::Failed(WsError::Closed { code: Some(code), reason });
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = out_tx.send(Message::Pong(data));
                }
                Some(Ok(msg)) => match router.route_message(&msg, &heartbeat) {
                    RouteOutcome::Ping => {
                        let pong = json!({"uri": "pong"}).to_string();
                        let _ = out_tx.send(Message::Text(pong.into()));
                    }
                    RouteOutcome::Auth(AuthReply::Accepted) if !authorized => {
                        authorized = true;
                        shared.protocol.on_session_ready();
                        let replayed = shared.registry.replay(
                            |req| {
                                out_tx
                                    .send(Message::Text(req.subscribe_frame().to_string().into()))
                                    .map_err(|_| WsError::NotConnected)
                            },
                            || {
                                shared.transition(
                                    |s| s == ConnectionState::Connecting,
                                    ConnectionState::Ready,
                                    "auth acknowledged",
                                );
                            },
                        );
                        backoff.reset();
                        tracing::info!(client, replayed, "Session ready");
                        tokio::spawn(run_heartbeat(
                            Arc::clone(&shared.protocol),
                            Arc::clone(&heartbeat),
                            out_tx.clone(),
                            Arc::clone(&heartbeat_lost),
                        ));
                    }
                    RouteOutcome::Auth(AuthReply::Accepted) => {
                        tracing::debug!(client, "Duplicate auth acknowledgment");
                    }
                    RouteOutcome::Auth(AuthReply::Rejected(message)) => {
                        tracing::warn!(client, "Auth rejected: {}", message);
                        break SessionEnd::Failed(WsError::AuthRejected(message));
                    }
                    RouteOutcome::Unsupported => break SessionEnd::Unsupported,
                    RouteOutcome::Delivered(_) | RouteOutcome::Pong | RouteOutcome::Dropped => {}
                },
                Some(Err(e)) => break SessionEnd::Failed(e),
                None => {
                    break SessionEnd::Failed(WsError::Closed {
                        code: None,
                        reason: "Stream ended".into(),
                    });
                }
            },

            Some(msg) = out_rx.recv() => {
                if let Err(e) = sink.send(msg).await {
                    break SessionEnd::Failed(e);
                }
            }

            _ = heartbeat_lost.notified() => break SessionEnd::Failed(WsError::HeartbeatTimeout),

            () = &mut auth_deadline, if !authorized => {
                tracing::warn!(
                    client,
                    "No auth acknowledgment within {:?}",
                    config.connect_timeout
                );
                break SessionEnd::Failed(WsError::ConnectTimeout);
            }

            _ = disconnect_requested(&mut state) => break SessionEnd::Disconnected,

            _ = stopped(stop) => break SessionEnd::Stopped,

            _ = kick.notified() => {
                break SessionEnd::Failed(WsError::Closed {
                    code: None,
                    reason: "reconnect requested".into(),
                });
            }
        }
    };

    // ── 3. Tear down ─────────────────────────────────────────────────────
    *lock(&shared.outbound) = None;
    *lock(&shared.kick) = None;
    drop(out_rx);
    let close = async {
        if matches!(end, SessionEnd::Disconnected | SessionEnd::Stopped) {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Client disconnect".into(),
                })))
                .await;
        }
        let _ = sink.close().await;
    };
    let _ = tokio::time::timeout(CLOSE_WAIT, close).await;

    end
}

async fn disconnect_requested(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state
        .wait_for(|s| matches!(s, ConnectionState::GoingToDisconnect | ConnectionState::Closed))
        .await;
}

/// Probe every `interval`; declare the session dead once a probe goes
/// unanswered past the timeout. Exits when the session's writer closes.
async fn run_heartbeat<P: Protocol>(
    protocol: Arc<P>,
    monitor: Arc<HeartbeatMonitor>,
    outbound: mpsc::UnboundedSender<Message>,
    lost: Arc<Notify>,
) {
    let policy = monitor.policy();
    // `interval` panics on a zero period.
    let mut ticker = tokio::time::interval(policy.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = outbound.closed() => return,
        }

        let now = Instant::now();
        match monitor.check(now) {
            HeartbeatStatus::Alive => {}
            HeartbeatStatus::Expired => {
                tracing::warn!(
                    client = protocol.name(),
                    "Heartbeat lost, no pong within {:?}",
                    policy.timeout
                );
                lost.notify_one();
                return;
            }
            HeartbeatStatus::AlreadyExpired => return,
        }

        monitor.record_probe(now);
        let ping = Message::Text(protocol.ping_frame().to_string().into());
        if outbound.send(ping).is_err() {
            return;
        }
    }
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}
