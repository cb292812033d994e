//! In-memory bus for tests/dev.
//!
//! Messages are retained in an append-only log and every subscription reads
//! it from the earliest offset, so a late subscriber still sees history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::Topic;

use super::{BusClient, BusConsumer, BusError, BusMessage};

#[derive(Debug)]
struct Inner {
    log: Mutex<Vec<BusMessage>>,
    /// Bumped to the new log length after every append
    appended: watch::Sender<usize>,
    fail_publishes: AtomicBool,
}

/// In-memory pub/sub bus with durable (process-lifetime) retention
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                log: Mutex::new(Vec::new()),
                appended,
                fail_publishes: AtomicBool::new(false),
            }),
        }
    }

    /// Append a message under an arbitrary topic name.
    ///
    /// Used to simulate foreign producers (unknown topics, bad payloads).
    pub fn publish_raw(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<i64, BusError> {
        let offset = {
            let mut log = self
                .inner
                .log
                .lock()
                .map_err(|_| BusError::Publish("bus log lock poisoned".to_string()))?;
            let offset = log.len() as i64;
            log.push(BusMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
                offset,
            });
            offset
        };

        self.inner.appended.send_replace(offset as usize + 1);
        Ok(offset)
    }

    /// Make every following publish fail until reset
    pub fn set_fail_publishes(&self, fail: bool) {
        self.inner.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything published so far
    pub fn messages(&self) -> Vec<BusMessage> {
        self.inner
            .log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusClient for InMemoryBus {
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.inner.fail_publishes.load(Ordering::SeqCst) {
            return Err(BusError::Publish("bus unavailable".to_string()));
        }

        let offset = self.publish_raw(topic.as_str(), key, payload)?;
        tracing::debug!(topic = %topic, key, offset, "Message published");
        Ok(())
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<Box<dyn BusConsumer>, BusError> {
        Ok(Box::new(InMemoryConsumer {
            inner: self.inner.clone(),
            topics: topics.iter().map(|t| t.as_str().to_string()).collect(),
            position: 0,
            appended: self.inner.appended.subscribe(),
        }))
    }
}

struct InMemoryConsumer {
    inner: Arc<Inner>,
    topics: Vec<String>,
    position: usize,
    appended: watch::Receiver<usize>,
}

impl InMemoryConsumer {
    fn poll(&mut self) -> Result<Option<BusMessage>, BusError> {
        let log = self
            .inner
            .log
            .lock()
            .map_err(|_| BusError::Read("bus log lock poisoned".to_string()))?;

        while self.position < log.len() {
            let message = &log[self.position];
            self.position += 1;
            if self.topics.iter().any(|t| t == &message.topic) {
                return Ok(Some(message.clone()));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl BusConsumer for InMemoryConsumer {
    async fn next_message(&mut self) -> Result<BusMessage, BusError> {
        loop {
            // Mark the current length as seen before polling so an append that
            // races with the poll still wakes us up.
            self.appended.borrow_and_update();

            if let Some(message) = self.poll()? {
                return Ok(message);
            }

            if self.appended.changed().await.is_err() {
                return Err(BusError::Closed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscriber_reads_from_earliest_offset() {
        let bus = InMemoryBus::new();
        bus.publish(Topic::AddBalance, "u1", b"first".to_vec()).await.unwrap();

        let mut consumer = bus.subscribe(&[Topic::AddBalance]).await.unwrap();
        bus.publish(Topic::AddBalance, "u1", b"second".to_vec()).await.unwrap();

        let first = consumer.next_message().await.unwrap();
        let second = consumer.next_message().await.unwrap();
        assert_eq!(first.payload, b"first");
        assert_eq!(first.offset, 0);
        assert_eq!(second.payload, b"second");
        assert_eq!(second.key, "u1");
    }

    #[tokio::test]
    async fn test_subscriber_skips_other_topics() {
        let bus = InMemoryBus::new();
        bus.publish(Topic::CreateAccount, "u1", b"create".to_vec()).await.unwrap();
        bus.publish(Topic::DeductBalance, "u1", b"deduct".to_vec()).await.unwrap();

        let mut consumer = bus.subscribe(&[Topic::DeductBalance]).await.unwrap();
        let message = consumer.next_message().await.unwrap();

        assert_eq!(message.topic, "deduct-balance");
        assert_eq!(message.offset, 1);
    }

    #[tokio::test]
    async fn test_next_message_waits_for_publish() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.subscribe(&Topic::ALL).await.unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher
                .publish(Topic::CreateAccount, "late", b"{}".to_vec())
                .await
                .unwrap();
        });

        let message = tokio::time::timeout(Duration::from_secs(2), consumer.next_message())
            .await
            .expect("consumer should wake on publish")
            .unwrap();
        assert_eq!(message.key, "late");
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let bus = InMemoryBus::new();
        bus.set_fail_publishes(true);

        let result = bus.publish(Topic::AddBalance, "u1", Vec::new()).await;
        assert!(matches!(result, Err(BusError::Publish(_))));
        assert!(bus.messages().is_empty());

        bus.set_fail_publishes(false);
        bus.publish(Topic::AddBalance, "u1", Vec::new()).await.unwrap();
        assert_eq!(bus.messages().len(), 1);
    }
}
