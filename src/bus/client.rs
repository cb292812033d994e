//! Bus client contract
//!
//! Delivery is at-least-once with per-key ordering. Consumers must tolerate
//! redelivery of a message they have already seen.

use async_trait::async_trait;

use crate::domain::Topic;

use super::BusError;

/// A message as read off the bus.
///
/// The topic stays a raw string here; it is parsed into a [`Topic`] by the
/// fan-out router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    /// Partition key (the account identifier)
    pub key: String,
    pub payload: Vec<u8>,
    /// Position in the bus log
    pub offset: i64,
}

/// Publish/subscribe transport
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publish a payload on `topic` with partition key `key`.
    ///
    /// Returns once the transport has durably accepted the message.
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Open an inbound stream of messages for `topics`
    async fn subscribe(&self, topics: &[Topic]) -> Result<Box<dyn BusConsumer>, BusError>;
}

/// Inbound side of a subscription
#[async_trait]
pub trait BusConsumer: Send {
    /// Wait for the next message.
    ///
    /// Cancel-safe: if the future is dropped before completing, no message
    /// is lost.
    async fn next_message(&mut self) -> Result<BusMessage, BusError>;
}
