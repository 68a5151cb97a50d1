//! Snapshot merging and subscriber fan-out.

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use crate::dispatch::snapshot::MetricsSnapshot;
use crate::observability::metrics;

/// Callback invoked with the merged snapshot after every update.
pub type Subscriber = dyn Fn(&MetricsSnapshot) + Send + Sync;

/// Merges partial updates into the latest snapshot and notifies subscribers.
///
/// Subscribers run synchronously, in subscription order, on the thread that
/// calls [`UpdateDispatcher::merge`]. A panicking subscriber is logged and
/// skipped; the rest are still notified.
///
/// Each snapshot store and each callback runs under a shared gate that
/// [`close`](Self::close) takes exclusively, so once `close` returns nothing
/// is stored or called again.
pub struct UpdateDispatcher {
    snapshot: ArcSwap<MetricsSnapshot>,
    subscribers: Mutex<Vec<(u64, Arc<Subscriber>)>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    gate: RwLock<()>,
    /// Thread currently running a callback, if any.
    notifying_on: Mutex<Option<ThreadId>>,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(MetricsSnapshot::default()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            gate: RwLock::new(()),
            notifying_on: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Arc<MetricsSnapshot> {
        self.snapshot.load_full()
    }

    /// Overlay `partial` onto the current snapshot, stamp it with the local
    /// time and notify subscribers. After [`close`](Self::close) this is a no-op.
    pub fn merge(&self, partial: Map<String, Value>) -> Arc<MetricsSnapshot> {
        let merged = {
            let _gate = self.read_gate();
            if self.is_closed() {
                return self.snapshot();
            }
            let merged = Arc::new(self.snapshot.load().overlay(partial, SystemTime::now()));
            self.snapshot.store(Arc::clone(&merged));
            merged
        };
        self.notify(&merged);
        merged
    }

    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&MetricsSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Arc<Subscriber> = Arc::new(callback);
        let mut subscribers = self.lock_subscribers();
        // close() sets the flag before clearing under this lock.
        if !self.is_closed() {
            subscribers.push((id, callback));
        }
        drop(subscribers);
        Subscription {
            id,
            dispatcher: Arc::downgrade(self),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    /// Stop all further merges and notifications and drop every subscriber.
    ///
    /// Waits for an in-flight store or callback on another thread to finish.
    /// Called from inside a callback it only sets the flag; the rest of that
    /// fan-out is skipped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let reentrant = *self.lock_notifying() == Some(thread::current().id());
        let _gate = if reentrant { None } else { Some(self.write_gate()) };
        self.lock_subscribers().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn notify(&self, snapshot: &MetricsSnapshot) {
        // Call outside the lock so a callback may subscribe or unsubscribe.
        let subscribers: Vec<_> = self.lock_subscribers().clone();
        for (id, callback) in subscribers {
            let _gate = self.read_gate();
            if self.is_closed() {
                return;
            }
            *self.lock_notifying() = Some(thread::current().id());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
            *self.lock_notifying() = None;
            if outcome.is_err() {
                tracing::error!(subscriber = id, "Metrics subscriber panicked; continuing");
                metrics::record_subscriber_panic();
            }
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(u64, Arc<Subscriber>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_notifying(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.notifying_on.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for UpdateDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UpdateDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateDispatcher")
            .field("fields", &self.snapshot.load().fields.len())
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle returned by `subscribe`.
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the callback registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    dispatcher: Weak<UpdateDispatcher>,
}

impl Subscription {
    /// Remove the callback. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.dispatcher
            .upgrade()
            .map_or(false, |dispatcher| dispatcher.remove(self.id))
    }
}
