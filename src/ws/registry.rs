//! Subscription registry: one queue, one consumer task and a handler list per
//! [`SubscriptionKey`].
//!
//! The router pushes events without blocking; each key's consumer task drains
//! its queue in arrival order and awaits every handler in registration order.
//! The map lock is a plain `std::sync::Mutex` and is never held across an
//! `.await`: outbound frames are handed to a closure that enqueues them on the
//! session's writer channel.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::WsError;
use crate::ws::key::{SubscriptionKey, SubscriptionRequest};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

/// An async event callback.
pub type Handler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// let h = handler(|tick: Tick| async move {
///     println!("{}", tick.last);
///     Ok(())
/// });
/// ```
pub fn handler<E, F, Fut>(f: F) -> Handler<E>
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Await one handler, containing its error or panic.
pub(crate) async fn invoke<E>(handler: &Handler<E>, event: E, label: &str) {
    let call = AssertUnwindSafe(async { handler(event).await }).catch_unwind();
    match call.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(key = label, "Handler failed: {}", e),
        Err(_) => tracing::error!(key = label, "Handler panicked"),
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once the stop flag is set (or its sender is gone).
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

struct Subscription<E> {
    request: SubscriptionRequest,
    tx: mpsc::UnboundedSender<E>,
    handlers: Arc<RwLock<Vec<Handler<E>>>>,
    _consumer: JoinHandle<()>,
}

/// Registered subscriptions of one streaming client.
pub struct SubscriptionRegistry<E> {
    entries: Mutex<HashMap<SubscriptionKey, Subscription<E>>>,
    stop: watch::Receiver<bool>,
}

impl<E: Clone + Send + 'static> SubscriptionRegistry<E> {
    /// Consumer tasks exit once `stop` flips to `true`.
    pub fn new(stop: watch::Receiver<bool>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stop,
        }
    }

    /// Register `request` and append `handler` to its list.
    ///
    /// `send` runs under the map lock so it cannot interleave with a replay.
    /// A failed send is not fatal: the entry is kept and replayed on the next
    /// ready session. Returns the number of handlers now registered for the key.
    pub fn subscribe(
        &self,
        request: SubscriptionRequest,
        handler: Option<Handler<E>>,
        send: impl FnOnce(&SubscriptionRequest) -> Result<(), WsError>,
    ) -> usize {
        let key = request.key();
        let mut entries = lock(&self.entries);

        if let Err(e) = send(&request) {
            tracing::debug!(key = %key, "Subscribe frame deferred to replay: {}", e);
        }

        let entry = entries.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(key = %key, "New subscription");
            let (tx, rx) = mpsc::unbounded_channel();
            let handlers = Arc::new(RwLock::new(Vec::new()));
            let consumer = tokio::spawn(consume(
                key.clone(),
                rx,
                Arc::clone(&handlers),
                self.stop.clone(),
            ));
            Subscription {
                request,
                tx,
                handlers,
                _consumer: consumer,
            }
        });

        let mut handlers = entry
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(h) = handler {
            handlers.push(h);
        }
        handlers.len()
    }

    /// Remove the entry for `key`, running `send` under the lock.
    ///
    /// Dropping the entry drops its queue sender: the consumer drains what is
    /// already queued, then exits.
    pub fn unsubscribe(
        &self,
        key: &SubscriptionKey,
        send: impl FnOnce(&SubscriptionRequest),
    ) -> Option<SubscriptionRequest> {
        let mut entries = lock(&self.entries);
        let removed = entries.remove(key)?;
        send(&removed.request);
        tracing::debug!(key = %key, "Subscription removed");
        Some(removed.request)
    }

    /// Send every registered subscribe frame, then run `then`, all under the
    /// map lock. Handler lists are untouched. Returns the number of frames sent.
    pub fn replay(
        &self,
        mut send: impl FnMut(&SubscriptionRequest) -> Result<(), WsError>,
        then: impl FnOnce(),
    ) -> usize {
        let entries = lock(&self.entries);
        let mut sent = 0;
        for (key, entry) in entries.iter() {
            match send(&entry.request) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(key = %key, "Replay failed: {}", e),
            }
        }
        then();
        sent
    }

    /// Queue `event` for `key`. `false` when the key is not registered.
    pub fn dispatch(&self, key: &SubscriptionKey, event: E) -> bool {
        let entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) => entry.tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn handler_count(&self, key: &SubscriptionKey) -> usize {
        lock(&self.entries)
            .get(key)
            .map(|e| e.handlers.read().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = lock(&self.entries).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Drop every entry. Used on stop.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

async fn consume<E: Clone + Send + 'static>(
    key: SubscriptionKey,
    mut rx: mpsc::UnboundedReceiver<E>,
    handlers: Arc<RwLock<Vec<Handler<E>>>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        // Snapshot so a concurrent subscribe is never blocked by a slow handler.
        let snapshot: Vec<Handler<E>> = handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for h in &snapshot {
            invoke(h, event.clone(), key.as_str()).await;
        }
    }
    tracing::debug!(key = %key, "Consumer finished");
}
