//! Fan-out of live readings to connected viewers.
//!
//! Every viewer owns its own bounded `tokio::sync::broadcast` channel; the
//! registry keeps the sending halves. Publishing never waits: when a
//! viewer's channel is full the oldest queued message is overwritten
//! (lossy-keep-new), so a slow viewer always ends up holding the most recent
//! readings. Overwritten messages surface as `Lagged(n)` on the receiving
//! side and are counted as evictions.
//!
//! Channel capacity is rounded up to the next power of two by tokio.

use crate::models::DerivedPoint;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::debug;

pub type LiveMessage = Arc<DerivedPoint>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Shared view of one subscription's eviction count.
#[derive(Debug, Clone, Default)]
pub struct Evictions(Arc<AtomicU64>);

impl Evictions {
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Receiving end of one viewer's channel. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: broadcast::Receiver<LiveMessage>,
    capacity: usize,
    evictions: Evictions,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).members.remove(&self.id);
        }
    }
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message in publish order. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<LiveMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(n)) => self.record_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<LiveMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Messages still queued for this viewer.
    pub fn len(&self) -> usize {
        // `Receiver::len` also counts overwritten messages not yet reported as lag.
        self.rx.len().min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages overwritten because the viewer fell behind, as observed so far
    /// by `recv`/`try_recv`.
    pub fn evicted(&self) -> u64 {
        self.evictions.count()
    }

    pub fn evictions(&self) -> Evictions {
        self.evictions.clone()
    }

    fn record_lag(&self, n: u64) {
        self.evictions.add(n);
        debug!(subscriber = self.id.0, skipped = n, "live viewer lagged");
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    members: HashMap<SubscriberId, broadcast::Sender<LiveMessage>>,
}

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1).next_power_of_two(),
        }
    }

    /// Effective per-viewer queue length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.registry)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = broadcast::channel(self.capacity);

        let mut registry = self.registry();
        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;
        registry.members.insert(id, tx);

        Subscription {
            id,
            rx,
            capacity: self.capacity,
            evictions: Evictions::default(),
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.registry().members.remove(&id);
    }

    /// Deliver to every registered viewer without blocking. The registry lock
    /// is held only while snapshotting the senders, never while sending.
    pub fn publish(&self, msg: LiveMessage) -> usize {
        let targets: Vec<broadcast::Sender<LiveMessage>> =
            self.registry().members.values().cloned().collect();

        let delivered = targets
            .iter()
            .filter(|tx| tx.send(Arc::clone(&msg)).is_ok())
            .count();

        debug!(subscribers = delivered, "published live reading");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().members.len()
    }
}
