//! Live event fan-out to connected viewers.
//!
//! Each subscriber owns a bounded delivery queue. The scanner pushes into
//! every queue with `try_send`, so a slow or stalled viewer loses events
//! instead of blocking the producer. Subscribers are removed when their
//! [`Subscription`] is dropped by the transport layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::types::ScanEvent;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

type Queue = mpsc::Sender<Arc<ScanEvent>>;

struct Inner {
    queue_capacity: usize,
    subscribers: Mutex<HashMap<Uuid, Queue>>,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<Uuid, Queue>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to the subscriber set.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_capacity: queue_capacity.max(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new viewer.
    ///
    /// `hello` is queued before the subscriber becomes visible to
    /// [`broadcast`](Self::broadcast), so it is always the first event received.
    pub fn subscribe(&self, hello: ScanEvent) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        // Fresh queue with capacity >= 1: cannot be full or closed.
        let _ = tx.try_send(Arc::new(hello));

        let id = Uuid::new_v4();
        let mut subscribers = self.inner.subscribers();
        subscribers.insert(id, tx);
        debug!(subscriber = %id, total = subscribers.len(), "Viewer subscribed");

        Subscription {
            id,
            rx,
            owner: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber without blocking.
    ///
    /// Returns how many queues accepted the event. Full or closed queues are
    /// skipped silently.
    pub fn broadcast(&self, event: ScanEvent) -> usize {
        let event = Arc::new(event);
        let subscribers = self.inner.subscribers();
        let mut delivered = 0;

        for (id, queue) in subscribers.iter() {
            match queue.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = %id, kind = event.kind(), "Viewer queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, kind = event.kind(), "Viewer gone, event dropped");
                }
            }
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

/// A viewer's private event queue. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Arc<ScanEvent>>,
    owner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event. `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Arc<ScanEvent>> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<ScanEvent>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            let mut subscribers = inner.subscribers();
            subscribers.remove(&self.id);
            debug!(subscriber = %self.id, total = subscribers.len(), "Viewer unsubscribed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
