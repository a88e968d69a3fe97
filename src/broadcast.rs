//! In-process fan-out of completed assessments to live subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing serializes the event
//! once and tries a non-blocking enqueue into each queue; a full queue
//! drops that event for that subscriber only. Single process only: for
//! cross-process delivery the binary relays the stream to NATS.

use crate::types::event::BroadcastEvent;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

struct Slot {
    id: u64,
    sender: mpsc::Sender<Arc<str>>,
}

struct Registry {
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.slots.lock().retain(|slot| slot.id != id);
    }
}

/// Delivery summary of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Subscriber registry with an explicit lifecycle: create at service start,
/// share by cloning, call [`EventBroadcaster::shutdown`] at teardown.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<Registry>,
}

impl EventBroadcaster {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capacity: queue_capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new subscriber. The returned stream yields serialized
    /// events until it is dropped or the broadcaster shuts down.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.registry.capacity);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        // checked under the slots lock so a concurrent shutdown cannot miss us
        let mut slots = self.registry.slots.lock();
        if self.registry.closed.load(Ordering::Acquire) {
            drop(slots);
            // sender dropped here: the subscription ends immediately
            return Subscription {
                id,
                receiver,
                registry: Weak::new(),
            };
        }
        slots.push(Slot { id, sender });
        drop(slots);
        debug!(subscriber_id = id, "Live feed subscriber registered");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Fan an event out to every subscriber. Never blocks and never fails.
    pub fn publish(&self, event: &BroadcastEvent) -> PublishReport {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(transaction_id = %event.transaction_id, error = %e, "Failed to serialize broadcast event");
                return PublishReport::default();
            }
        };
        self.publish_payload(payload)
    }

    fn publish_payload(&self, payload: Arc<str>) -> PublishReport {
        // Fan out over a snapshot so subscribe/unsubscribe never wait on delivery
        let snapshot: Vec<(u64, mpsc::Sender<Arc<str>>)> = self
            .registry
            .slots
            .lock()
            .iter()
            .map(|slot| (slot.id, slot.sender.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut disconnected = Vec::new();

        for (id, sender) in snapshot {
            match sender.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber_id = id, "Subscriber queue full, dropping event");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => disconnected.push(id),
            }
        }

        if !disconnected.is_empty() {
            self.registry
                .slots
                .lock()
                .retain(|slot| !disconnected.contains(&slot.id));
        }

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.slots.lock().len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.registry.capacity
    }

    /// Deregister everyone. Open subscriptions drain what is queued, then end.
    pub fn shutdown(&self) {
        let removed = {
            let mut slots = self.registry.slots.lock();
            self.registry.closed.store(true, Ordering::Release);
            std::mem::take(&mut *slots)
        };
        debug!(subscribers = removed.len(), "Live feed broadcaster shut down");
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// One live-feed connection. Deregisters itself when dropped.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Arc<str>>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event; `None` once the broadcaster has shut down
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<str>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
            debug!(subscriber_id = self.id, "Live feed subscriber deregistered");
        }
    }
}
