//! Handler loops
//!
//! A [`CommandConsumer`] drains one subscriber queue with one or more worker
//! tasks. Workers look at the cancellation signal only while waiting for the
//! next message, so a message that has been taken off the queue is always
//! carried to a terminal state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bus::BusMessage;
use crate::router::SubscriberHandle;
use crate::shutdown::Shutdown;

use super::{CommandHandlers, CommandState, HandlerError};

#[derive(Debug, Default)]
struct ConsumerCounters {
    processed: AtomicU64,
    complete: AtomicU64,
    failed: AtomicU64,
    partially_complete: AtomicU64,
}

/// Terminal-state counts of the messages a consumer has processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub complete: u64,
    pub failed: u64,
    pub partially_complete: u64,
}

/// Worker pool over one subscriber queue
pub struct CommandConsumer {
    handlers: CommandHandlers,
    queue: Mutex<SubscriberHandle>,
    workers: usize,
    counters: ConsumerCounters,
}

impl CommandConsumer {
    pub fn new(handlers: CommandHandlers, queue: SubscriberHandle) -> Self {
        tracing::debug!(
            subscriber_id = queue.id(),
            topics = ?queue.topics(),
            "Command consumer attached to subscriber queue"
        );
        Self {
            handlers,
            queue: Mutex::new(queue),
            workers: 1,
            counters: ConsumerCounters::default(),
        }
    }

    /// Number of concurrent workers (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            complete: self.counters.complete.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            partially_complete: self.counters.partially_complete.load(Ordering::Relaxed),
        }
    }

    /// Spawn the worker tasks
    pub fn start(self: Arc<Self>, shutdown: Shutdown) -> Vec<JoinHandle<()>> {
        (0..self.workers)
            .map(|worker| {
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.run_worker(worker, shutdown).await })
            })
            .collect()
    }

    async fn next_message(&self) -> Option<BusMessage> {
        self.queue.lock().await.recv().await
    }

    async fn run_worker(&self, worker: usize, mut shutdown: Shutdown) {
        tracing::info!(worker, "Command worker started");

        loop {
            let message = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!(worker, "Command worker received shutdown signal");
                    break;
                }
                message = self.next_message() => message,
            };

            let Some(message) = message else {
                tracing::info!(worker, "Subscriber queue closed");
                break;
            };

            self.process(worker, &message).await;
        }

        tracing::info!(worker, "Command worker stopped");
    }

    /// Carry one message to a terminal state and log it
    pub async fn process(&self, worker: usize, message: &BusMessage) -> CommandState {
        let result = self.handlers.process(message).await;
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(receipt) => {
                self.counters.complete.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    worker,
                    topic = %message.topic,
                    account_id = %receipt.record.user_id,
                    amount = receipt.record.amount,
                    correlation_id = %receipt.correlation_id,
                    "Command complete"
                );
                receipt.state
            }
            Err(e) => {
                let state = e.final_state();
                match state {
                    CommandState::PartiallyComplete => {
                        self.counters.partially_complete.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            worker,
                            topic = %message.topic,
                            key = %message.key,
                            correlation_id = ?e.correlation_id(),
                            error = %e,
                            "Balance committed without ledger record, reconciliation required"
                        );
                    }
                    _ => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        log_failure(worker, message, &e);
                    }
                }
                state
            }
        }
    }
}

fn log_failure(worker: usize, message: &BusMessage, err: &HandlerError) {
    match err {
        HandlerError::AccountAlreadyExists(_) | HandlerError::AccountNotFound(_) => {
            tracing::warn!(
                worker,
                topic = %message.topic,
                key = %message.key,
                error = %err,
                "Command rejected"
            );
        }
        HandlerError::DecodeFailure(_) => {
            tracing::warn!(
                worker,
                topic = %message.topic,
                offset = message.offset,
                error = %err,
                "Dropping malformed message"
            );
        }
        _ => {
            tracing::error!(
                worker,
                topic = %message.topic,
                key = %message.key,
                error = %err,
                "Command failed"
            );
        }
    }
}
