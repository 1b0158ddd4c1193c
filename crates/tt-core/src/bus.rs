//! Multi-subscriber publish/subscribe fan-out.
//!
//! # Delivery
//!
//! Every subscriber owns a bounded channel. [`EventBus::publish_wait`] waits
//! until each subscriber registered at the time of the call has room for the
//! event, so a subscriber that keeps receiving never misses one.
//! [`EventBus::publish`] is best-effort and drops the event for subscribers
//! whose channel is full.
//!
//! Events from one publisher reach every subscriber in publish order.
//! Concurrent publishers are not ordered relative to each other; callers that
//! need a global order must serialize their publishes.
//!
//! # Lifecycle
//!
//! The bus holds only the sending half of each channel. Dropping a
//! [`Subscription`] detaches it, so an abandoned subscriber never keeps the
//! bus, or a blocked publisher, waiting.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::cancel::CancelToken;

/// Per-subscriber channel buffer used by [`EventBus::new`].
pub const DEFAULT_CAPACITY: usize = 16;

/// Event bus errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The subscription is unknown or was already removed.
    #[error("subscription {0} is not registered")]
    NotSubscribed(SubscriptionId),
}

/// Stable identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscriber<T> {
    tx: mpsc::Sender<T>,
    closed: CancelToken,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }
}

struct Registry<T> {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber<T>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<T> Registry<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Subscriber<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) -> Option<Subscriber<T>> {
        self.lock().remove(&id)
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, Subscriber<T>)> {
        let mut subscribers = self.lock();
        subscribers.retain(|_, sub| !sub.closed.is_cancelled() && !sub.tx.is_closed());
        subscribers
            .iter()
            .map(|(id, sub)| (*id, sub.clone()))
            .collect()
    }

    fn prune(&self, stale: &[SubscriptionId]) {
        if stale.is_empty() {
            return;
        }
        let mut subscribers = self.lock();
        for id in stale {
            subscribers.remove(id);
        }
    }
}

/// A cloneable handle to a shared subscriber registry.
pub struct EventBus<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.registry.lock().len())
            .field("capacity", &self.registry.capacity)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus whose subscribers buffer up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Subscription<T> {
        self.register(CancelToken::new())
    }

    /// Registers a subscriber that closes itself once `cancel` fires.
    pub fn subscribe_until(&self, cancel: &CancelToken) -> Subscription<T> {
        self.register(cancel.child())
    }

    fn register(&self, closed: CancelToken) -> Subscription<T> {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        self.registry.lock().insert(
            id,
            Subscriber {
                tx,
                closed: closed.clone(),
            },
        );
        tracing::debug!(subscription = %id, "subscribed");
        Subscription {
            id,
            rx,
            closed,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes a subscription and closes its channel.
    ///
    /// A publisher blocked on this subscriber is released immediately.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        let subscriber = self
            .registry
            .remove(id)
            .ok_or(BusError::NotSubscribed(id))?;
        subscriber.closed.cancel();
        tracing::debug!(subscription = %id, "unsubscribed");
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Best-effort publish. Subscribers without room for the event miss it.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: &T) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();
        for (id, subscriber) in self.registry.snapshot() {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscription = %id, "subscriber is full, dropping event");
                }
                Err(TrySendError::Closed(_)) => stale.push(id),
            }
        }
        self.registry.prune(&stale);
        delivered
    }

    /// Publishes and waits until every current subscriber has accepted the event.
    ///
    /// Subscribers that unsubscribe or are dropped while the publisher waits
    /// are skipped. Returns the number of subscribers that received the event.
    pub async fn publish_wait(&self, event: &T) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();
        for (id, subscriber) in self.registry.snapshot() {
            tokio::select! {
                biased;
                () = subscriber.closed.cancelled() => {}
                sent = subscriber.tx.send(event.clone()) => match sent {
                    Ok(()) => delivered += 1,
                    Err(_) => stale.push(id),
                },
            }
        }
        self.registry.prune(&stale);
        delivered
    }
}

/// The receiving side of one bus subscription.
///
/// Dropping the subscription detaches it from the bus.
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::Receiver<T>,
    closed: CancelToken,
    registry: Weak<Registry<T>>,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T> Subscription<T> {
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the subscription is unsubscribed, cancelled, or the
    /// bus is gone. No event is returned after that point.
    pub async fn recv(&mut self) -> Option<T> {
        if self.closed.is_cancelled() {
            self.detach();
            return None;
        }
        let event = tokio::select! {
            biased;
            () = self.closed.cancelled() => None,
            event = self.rx.recv() => event,
        };
        if event.is_none() {
            self.detach();
        }
        event
    }

    fn detach(&mut self) {
        self.closed.cancel();
        self.rx.close();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}
