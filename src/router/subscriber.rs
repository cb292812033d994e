//! Subscriber queues
//!
//! A [`SubscriberHandle`] is the receiving end of one bounded queue. The
//! router holds the sending end once per topic the handle registered for.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bus::BusMessage;
use crate::domain::Topic;

#[derive(Debug, Default)]
pub(super) struct SubscriberCounters {
    pub(super) delivered: AtomicU64,
    pub(super) dropped: AtomicU64,
}

/// Delivery counters of one subscriber queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Messages enqueued for this subscriber
    pub delivered: u64,
    /// Messages dropped because the queue was full or closed
    pub dropped: u64,
}

/// Receiving end of a subscriber queue
#[derive(Debug)]
pub struct SubscriberHandle {
    id: u64,
    topics: BTreeSet<Topic>,
    receiver: mpsc::Receiver<BusMessage>,
    counters: Arc<SubscriberCounters>,
}

impl SubscriberHandle {
    pub(super) fn new(
        id: u64,
        topics: BTreeSet<Topic>,
        receiver: mpsc::Receiver<BusMessage>,
        counters: Arc<SubscriberCounters>,
    ) -> Self {
        Self {
            id,
            topics,
            receiver,
            counters,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topics(&self) -> &BTreeSet<Topic> {
        &self.topics
    }

    /// Wait for the next queued message.
    ///
    /// Returns `None` once the router has been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Take a queued message without waiting
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }

    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
