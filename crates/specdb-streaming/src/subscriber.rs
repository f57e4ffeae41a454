//! Specdb Streaming Subscribers
//!
//! Registry of live watch subscriptions. Publishing never blocks: every
//! subscriber owns a bounded broadcast buffer, and a subscriber that falls
//! behind loses its oldest events instead of stalling the writer.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::event::Event;
use specdb_common::Document;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;

// =============================================================================
// Subscriber ID
// =============================================================================

/// Unique identifier for a subscriber within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

// =============================================================================
// Subscriber
// =============================================================================

struct Subscriber {
    filter: Document,
    sender: broadcast::Sender<Event>,
}

// =============================================================================
// Subscribers
// =============================================================================

/// The set of active subscriptions of a store.
pub struct Subscribers {
    capacity: usize,
    next_id: u64,
    subscribers: BTreeMap<SubscriberId, Subscriber>,
}

impl Subscribers {
    /// Create a registry whose subscribers buffer `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: 0,
            subscribers: BTreeMap::new(),
        }
    }

    /// Register a subscriber with the given document filter.
    pub fn subscribe(&mut self, filter: Document) -> (SubscriberId, broadcast::Receiver<Event>) {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        let (sender, receiver) = broadcast::channel(self.capacity);
        self.subscribers.insert(id, Subscriber { filter, sender });
        tracing::debug!("Registered subscriber {} ({} active)", id, self.subscribers.len());
        (id, receiver)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!("Removed subscriber {} ({} active)", id, self.subscribers.len());
        }
        removed
    }

    /// Deliver an event to every subscriber whose filter `accepts` decides to
    /// keep. Returns the number of subscribers the event was queued for.
    pub fn publish<F>(&self, event: &Event, mut accepts: F) -> usize
    where
        F: FnMut(&Document) -> bool,
    {
        let mut delivered = 0;
        for subscriber in self.subscribers.values() {
            if !accepts(&subscriber.filter) {
                continue;
            }
            // Fails only when the forwarding task already exited.
            if subscriber.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
