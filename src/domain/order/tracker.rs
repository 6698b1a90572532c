//! Per-order update queues.
//!
//! Every order pushed on the `order` channel lands in a queue keyed by its
//! `exchange_oid`. `place_order` with an update callback claims that queue and
//! spawns a consumer; the first terminal status tears the queue down and the id
//! is remembered as finished so late frames are dropped. Queues nobody drains
//! (orders placed elsewhere, callbacks that never claimed) are reclaimed by the
//! reaper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::order::Order;
use crate::ws::registry::{invoke, lock, stopped, Handler};

/// Reaper cadence.
pub const REAP_INTERVAL: Duration = Duration::from_secs(2);

/// How long a finished id keeps rejecting late frames.
pub const FINISHED_RETENTION: Duration = Duration::from_secs(60);

/// What [`OrderTracker::push`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued for a claimed order.
    Queued,
    /// Queued, but nobody has claimed the order yet.
    Buffered,
    /// Older than the last version seen; dropped.
    Stale,
    /// The order already reached a terminal status; dropped.
    Finished,
    /// No `exchange_oid` to key on; dropped.
    Untracked,
}

#[derive(Debug)]
struct Gauge {
    queued: AtomicUsize,
    in_flight: AtomicBool,
    last_drain: Mutex<Instant>,
}

impl Gauge {
    fn new(now: Instant) -> Self {
        Self {
            queued: AtomicUsize::new(0),
            in_flight: AtomicBool::new(false),
            last_drain: Mutex::new(now),
        }
    }
}

struct Entry {
    tx: mpsc::UnboundedSender<Order>,
    /// Present until the order is claimed.
    rx: Option<mpsc::UnboundedReceiver<Order>>,
    version: u64,
    terminal_seen: bool,
    gauge: Arc<Gauge>,
}

impl Entry {
    fn new(now: Instant) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            version: 0,
            terminal_seen: false,
            gauge: Arc::new(Gauge::new(now)),
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    finished: HashMap<String, Instant>,
}

/// Order update queues keyed by `exchange_oid`.
pub struct OrderTracker {
    inner: Mutex<Inner>,
    reap_timeout: Duration,
}

impl OrderTracker {
    /// `reap_timeout` bounds how long a non-empty queue may go undrained.
    pub fn new(reap_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            reap_timeout,
        }
    }

    /// Queue one update from the `order` channel.
    pub fn push(&self, order: Order) -> PushOutcome {
        let Some(id) = order.exchange_oid.clone() else {
            return PushOutcome::Untracked;
        };
        let mut inner = lock(&self.inner);
        if inner.finished.contains_key(&id) {
            tracing::warn!(
                order = %id,
                status = %order.status,
                "Dropping update for finished order"
            );
            return PushOutcome::Finished;
        }

        let entry = inner
            .entries
            .entry(id.clone())
            .or_insert_with(|| Entry::new(Instant::now()));
        if entry.terminal_seen {
            tracing::warn!(
                order = %id,
                status = %order.status,
                "Dropping update after terminal status"
            );
            return PushOutcome::Finished;
        }
        if order.version < entry.version {
            tracing::debug!(
                order = %id,
                version = order.version,
                last = entry.version,
                "Dropping stale order update"
            );
            return PushOutcome::Stale;
        }

        entry.version = order.version;
        entry.terminal_seen = order.status.is_terminal();
        let claimed = entry.rx.is_none();
        entry.gauge.queued.fetch_add(1, Ordering::SeqCst);
        if entry.tx.send(order).is_err() {
            // Consumer already gone; the entry is removed on its way out.
            entry.gauge.queued.fetch_sub(1, Ordering::SeqCst);
            return PushOutcome::Finished;
        }
        if claimed {
            PushOutcome::Queued
        } else {
            PushOutcome::Buffered
        }
    }

    /// Claim the queue for `exchange_oid` and drain it into `handler`.
    ///
    /// Updates buffered before the claim are delivered first. `None` when the
    /// order already finished or is claimed by someone else.
    pub fn track(
        self: &Arc<Self>,
        exchange_oid: &str,
        handler: Handler<Order>,
        stop: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        let (rx, gauge) = {
            let mut inner = lock(&self.inner);
            if inner.finished.contains_key(exchange_oid) {
                tracing::warn!(order = exchange_oid, "Order already finished; not tracking");
                return None;
            }
            let entry = inner
                .entries
                .entry(exchange_oid.to_string())
                .or_insert_with(|| Entry::new(Instant::now()));
            let Some(rx) = entry.rx.take() else {
                tracing::warn!(order = exchange_oid, "Order is already tracked");
                return None;
            };
            *lock(&entry.gauge.last_drain) = Instant::now();
            (rx, Arc::clone(&entry.gauge))
        };

        tracing::debug!(order = exchange_oid, "Tracking order updates");
        Some(tokio::spawn(consume(
            Arc::clone(self),
            exchange_oid.to_string(),
            rx,
            gauge,
            handler,
            stop,
        )))
    }

    /// Remove the queue and remember the id as finished.
    fn finish(&self, exchange_oid: &str) {
        let mut inner = lock(&self.inner);
        inner.entries.remove(exchange_oid);
        inner.finished.insert(exchange_oid.to_string(), Instant::now());
    }

    /// Drop queues that sat non-empty and undrained past the reap timeout, and
    /// forget finished ids past their retention. Returns the reaped ids.
    pub fn reap(&self, now: Instant) -> Vec<String> {
        let mut inner = lock(&self.inner);
        let timeout = self.reap_timeout;
        let mut reaped = Vec::new();

        inner.entries.retain(|id, entry| {
            let gauge = &entry.gauge;
            let idle = now.saturating_duration_since(*lock(&gauge.last_drain));
            let stuck = gauge.queued.load(Ordering::SeqCst) > 0
                && !gauge.in_flight.load(Ordering::SeqCst)
                && idle > timeout;
            if stuck {
                reaped.push(id.clone());
            }
            !stuck
        });

        for id in &reaped {
            tracing::warn!(order = %id, "Reclaimed undrained order queue");
            inner.finished.insert(id.clone(), now);
        }
        inner
            .finished
            .retain(|_, at| now.saturating_duration_since(*at) <= FINISHED_RETENTION);
        reaped
    }

    /// Run [`reap`](Self::reap) every `period` until `stop` flips.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        period: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stopped(&mut stop) => break,
                    _ = ticker.tick() => {
                        tracker.reap(Instant::now());
                    }
                }
            }
        })
    }

    pub fn is_tracked(&self, exchange_oid: &str) -> bool {
        lock(&self.inner).entries.contains_key(exchange_oid)
    }

    pub fn is_finished(&self, exchange_oid: &str) -> bool {
        lock(&self.inner).finished.contains_key(exchange_oid)
    }

    /// Live queues.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.entries.clear();
        inner.finished.clear();
    }
}

async fn consume(
    tracker: Arc<OrderTracker>,
    id: String,
    mut rx: mpsc::UnboundedReceiver<Order>,
    gauge: Arc<Gauge>,
    handler: Handler<Order>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let order = tokio::select! {
            biased;
            _ = stopped(&mut stop) => return,
            order = rx.recv() => match order {
                Some(order) => order,
                // Reaped.
                None => return,
            },
        };

        gauge.queued.fetch_sub(1, Ordering::SeqCst);
        gauge.in_flight.store(true, Ordering::SeqCst);
        let status = order.status.clone();
        invoke(&handler, order, &id).await;
        gauge.in_flight.store(false, Ordering::SeqCst);
        *lock(&gauge.last_drain) = Instant::now();

        if status.is_terminal() {
            tracing::debug!(order = %id, status = %status, "Order finished");
            tracker.finish(&id);
            return;
        }
    }
}
