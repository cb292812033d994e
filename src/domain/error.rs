//! Domain Error Types
//!
//! Errors raised while turning raw bus payloads into typed commands.

use thiserror::Error;

/// A bus message that could not be decoded into a [`Command`](super::Command).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The topic is not one of the known command topics
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The payload is not valid JSON for the topic's message shape
    #[error("Malformed {topic} payload: {source}")]
    Payload {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Topic the failing message was received on, when it was known
    pub fn topic(&self) -> Option<&'static str> {
        match self {
            Self::UnknownTopic(_) => None,
            Self::Payload { topic, .. } => Some(topic),
        }
    }
}
