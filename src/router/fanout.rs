//! Fan-Out Router
//!
//! The routing table (topic -> subscriber queues) is owned by the router and
//! written only by [`FanOutRouter::register`], normally at startup. Dispatch
//! takes a read lock and enqueues with `try_send`, so a slow or stalled
//! subscriber costs only its own messages and never stalls the bus read loop.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::bus::{BusClient, BusConsumer, BusMessage};
use crate::domain::Topic;
use crate::shutdown::Shutdown;

use super::subscriber::{SubscriberCounters, SubscriberHandle};

const DEFAULT_READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct Route {
    subscriber_id: u64,
    sender: mpsc::Sender<BusMessage>,
    counters: Arc<SubscriberCounters>,
}

#[derive(Debug, Default)]
struct RouterCounters {
    received: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    unroutable: AtomicU64,
    read_errors: AtomicU64,
}

/// Router-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Messages read off the bus
    pub received: u64,
    /// Successful enqueues, summed over subscribers
    pub delivered: u64,
    /// Enqueues dropped on a full or closed queue, summed over subscribers
    pub dropped: u64,
    /// Messages with an unknown topic or no registered subscriber
    pub unroutable: u64,
    /// Failed bus subscriptions and reads
    pub read_errors: u64,
}

/// Outcome of routing a single message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Parsed topic, `None` if the topic was unknown
    pub topic: Option<Topic>,
    pub delivered: usize,
    pub dropped: usize,
}

/// In-process fan-out of bus messages to subscriber queues
#[derive(Debug)]
pub struct FanOutRouter {
    routes: RwLock<HashMap<Topic, Vec<Route>>>,
    next_subscriber_id: AtomicU64,
    capacity: usize,
    read_error_backoff: Duration,
    counters: RouterCounters,
}

impl FanOutRouter {
    /// Create a router whose subscriber queues hold `capacity` messages each
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            read_error_backoff: DEFAULT_READ_ERROR_BACKOFF,
            counters: RouterCounters::default(),
        }
    }

    /// Pause between a failed bus read and the next attempt
    pub fn with_read_error_backoff(mut self, backoff: Duration) -> Self {
        self.read_error_backoff = backoff;
        self
    }

    /// Create one bounded queue and attach it to every topic in `topics`
    pub fn register(&self, topics: impl IntoIterator<Item = Topic>) -> SubscriberHandle {
        let topics: BTreeSet<Topic> = topics.into_iter().collect();
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        let counters = Arc::new(SubscriberCounters::default());

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        for topic in &topics {
            routes.entry(*topic).or_default().push(Route {
                subscriber_id: id,
                sender: sender.clone(),
                counters: counters.clone(),
            });
        }
        drop(routes);

        tracing::info!(
            subscriber_id = id,
            topics = ?topics,
            capacity = self.capacity,
            "Subscriber registered"
        );

        SubscriberHandle::new(id, topics, receiver, counters)
    }

    /// Union of all registered topics
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut topics: Vec<Topic> = routes.keys().copied().collect();
        topics.sort();
        topics
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            received: self.counters.received.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            unroutable: self.counters.unroutable.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
        }
    }

    /// Enqueue `message` into every queue registered for its topic.
    ///
    /// Never waits: a full queue loses this message and the others still get it.
    pub fn dispatch(&self, message: BusMessage) -> DispatchReport {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let topic = match message.topic.parse::<Topic>() {
            Ok(topic) => topic,
            Err(_) => {
                self.counters.unroutable.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    "Unknown topic, dropping message"
                );
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport {
            topic: Some(topic),
            ..DispatchReport::default()
        };

        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let Some(routes) = routes.get(&topic) else {
            self.counters.unroutable.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(topic = %topic, "No subscribers for topic");
            return report;
        };

        for route in routes {
            match route.sender.try_send(message.clone()) {
                Ok(()) => {
                    route.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    report.delivered += 1;
                    tracing::trace!(
                        topic = %topic,
                        subscriber_id = route.subscriber_id,
                        "Message queued"
                    );
                }
                Err(err) => {
                    let dropped_total = route.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;

                    let reason = match err {
                        TrySendError::Full(_) => "queue full",
                        TrySendError::Closed(_) => "queue closed",
                    };
                    tracing::warn!(
                        topic = %topic,
                        key = %message.key,
                        offset = message.offset,
                        subscriber_id = route.subscriber_id,
                        dropped_total,
                        reason,
                        "Dropping message for subscriber"
                    );
                }
            }
        }

        report
    }

    /// Bus read loop. Runs until `shutdown` fires.
    ///
    /// Failed subscriptions and failed reads are logged, counted and retried
    /// after a backoff that cancellation interrupts.
    pub async fn run(&self, bus: &dyn BusClient, mut shutdown: Shutdown) {
        let topics = self.subscribed_topics();
        if topics.is_empty() {
            tracing::warn!("Fan-out router started with no registered subscribers");
        }

        let Some(mut consumer) = self.subscribe(bus, &topics, &mut shutdown).await else {
            tracing::info!(stats = ?self.stats(), "Fan-out router stopped before subscribing");
            return;
        };
        tracing::info!(topics = ?topics, "Fan-out router started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Fan-out router received shutdown signal");
                    break;
                }
                result = consumer.next_message() => match result {
                    Ok(message) => {
                        tracing::debug!(
                            topic = %message.topic,
                            key = %message.key,
                            offset = message.offset,
                            "Received message"
                        );
                        self.dispatch(message);
                    }
                    Err(e) => {
                        self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, transient = e.is_transient(), "Bus read failed");

                        if !self.back_off(&mut shutdown).await {
                            break;
                        }
                    }
                },
            }
        }

        tracing::info!(stats = ?self.stats(), "Fan-out router stopped");
    }

    /// Open the bus subscription, retrying until it succeeds or `shutdown` fires
    async fn subscribe(
        &self,
        bus: &dyn BusClient,
        topics: &[Topic],
        shutdown: &mut Shutdown,
    ) -> Option<Box<dyn BusConsumer>> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return None,
                attempt = bus.subscribe(topics) => attempt,
            };

            match attempt {
                Ok(consumer) => return Some(consumer),
                Err(e) => {
                    self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %e, "Bus subscription failed, retrying");

                    if !self.back_off(shutdown).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Wait out the read-error backoff. Returns `false` if cancelled meanwhile.
    async fn back_off(&self, shutdown: &mut Shutdown) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.read_error_backoff) => true,
        }
    }
}
