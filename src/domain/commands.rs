//! Balance commands
//!
//! Commands travel over the bus as JSON payloads, one topic per command kind.
//! The topic string is parsed once into [`Topic`] and the payload once into
//! [`Command`], so handler selection downstream is an exhaustive `match`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DecodeError, Operation};

/// Bus topics carrying balance commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    CreateAccount,
    AddBalance,
    DeductBalance,
}

impl Topic {
    /// Every command topic, in a stable order
    pub const ALL: [Topic; 3] = [Topic::CreateAccount, Topic::AddBalance, Topic::DeductBalance];

    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CreateAccount => "create-account",
            Topic::AddBalance => "add-balance",
            Topic::DeductBalance => "deduct-balance",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownTopic(s.to_string()))
    }
}

/// Fields shared by every command payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMessage {
    pub user_id: String,
    /// When the command was issued (not when it is applied)
    pub timestamp: DateTime<Utc>,
}

impl BaseMessage {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Open a new account with an initial balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccountMessage {
    #[serde(flatten)]
    pub base: BaseMessage,
    pub initial_balance: f64,
}

/// Add funds to an existing account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddBalanceMessage {
    #[serde(flatten)]
    pub base: BaseMessage,
    pub amount: f64,
}

/// Deduct funds from an existing account.
///
/// `amount` is the positive quantity to remove; the handler negates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductBalanceMessage {
    #[serde(flatten)]
    pub base: BaseMessage,
    pub amount: f64,
}

/// A decoded balance command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateAccount(CreateAccountMessage),
    AddBalance(AddBalanceMessage),
    DeductBalance(DeductBalanceMessage),
}

impl Command {
    pub fn create_account(user_id: impl Into<String>, initial_balance: f64) -> Self {
        Command::CreateAccount(CreateAccountMessage {
            base: BaseMessage::new(user_id),
            initial_balance,
        })
    }

    pub fn add_balance(user_id: impl Into<String>, amount: f64) -> Self {
        Command::AddBalance(AddBalanceMessage {
            base: BaseMessage::new(user_id),
            amount,
        })
    }

    pub fn deduct_balance(user_id: impl Into<String>, amount: f64) -> Self {
        Command::DeductBalance(DeductBalanceMessage {
            base: BaseMessage::new(user_id),
            amount,
        })
    }

    /// Decode a payload received on `topic`
    pub fn decode(topic: Topic, payload: &[u8]) -> Result<Self, DecodeError> {
        let malformed = |source| DecodeError::Payload {
            topic: topic.as_str(),
            source,
        };

        match topic {
            Topic::CreateAccount => serde_json::from_slice(payload)
                .map(Command::CreateAccount)
                .map_err(malformed),
            Topic::AddBalance => serde_json::from_slice(payload)
                .map(Command::AddBalance)
                .map_err(malformed),
            Topic::DeductBalance => serde_json::from_slice(payload)
                .map(Command::DeductBalance)
                .map_err(malformed),
        }
    }

    /// Serialize the payload in its wire shape
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Command::CreateAccount(msg) => serde_json::to_vec(msg),
            Command::AddBalance(msg) => serde_json::to_vec(msg),
            Command::DeductBalance(msg) => serde_json::to_vec(msg),
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            Command::CreateAccount(_) => Topic::CreateAccount,
            Command::AddBalance(_) => Topic::AddBalance,
            Command::DeductBalance(_) => Topic::DeductBalance,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::CreateAccount(_) => Operation::CreateAccount,
            Command::AddBalance(_) => Operation::AddBalance,
            Command::DeductBalance(_) => Operation::DeductBalance,
        }
    }

    fn base(&self) -> &BaseMessage {
        match self {
            Command::CreateAccount(msg) => &msg.base,
            Command::AddBalance(msg) => &msg.base,
            Command::DeductBalance(msg) => &msg.base,
        }
    }

    /// Account the command targets; also the bus partition key
    pub fn user_id(&self) -> &str {
        &self.base().user_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.base().timestamp
    }

    /// Signed effect on the balance
    pub fn signed_amount(&self) -> f64 {
        match self {
            Command::CreateAccount(msg) => msg.initial_balance,
            Command::AddBalance(msg) => msg.amount,
            Command::DeductBalance(msg) => -msg.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trips_through_wire_name() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!(matches!(
            "close-account".parse::<Topic>(),
            Err(DecodeError::UnknownTopic(name)) if name == "close-account"
        ));
    }

    #[test]
    fn test_decode_go_style_payload() {
        // Nanosecond precision and numeric offset, as emitted by the producer side
        let payload = br#"{"user_id":"u1","timestamp":"2024-05-01T10:00:00.123456789+02:00","amount":50}"#;

        let command = Command::decode(Topic::AddBalance, payload).unwrap();

        assert_eq!(command.topic(), Topic::AddBalance);
        assert_eq!(command.user_id(), "u1");
        assert_eq!(command.signed_amount(), 50.0);
        assert_eq!(command.issued_at().to_rfc3339(), "2024-05-01T08:00:00.123456789+00:00");
    }

    #[test]
    fn test_decode_create_account_uses_initial_balance() {
        let payload = br#"{"user_id":"u1","timestamp":"2024-05-01T10:00:00Z","initial_balance":100.5}"#;

        let command = Command::decode(Topic::CreateAccount, payload).unwrap();

        assert_eq!(command.operation(), Operation::CreateAccount);
        assert_eq!(command.signed_amount(), 100.5);
    }

    #[test]
    fn test_deduct_amount_is_negated() {
        let command = Command::deduct_balance("u1", 25.0);
        assert_eq!(command.signed_amount(), -25.0);
        assert_eq!(command.operation(), Operation::DeductBalance);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        // A create-account payload lacks `amount`
        let payload = br#"{"user_id":"u1","timestamp":"2024-05-01T10:00:00Z","initial_balance":1}"#;

        let err = Command::decode(Topic::AddBalance, payload).unwrap_err();
        assert_eq!(err.topic(), Some("add-balance"));

        let err = Command::decode(Topic::DeductBalance, b"not json").unwrap_err();
        assert!(err.to_string().starts_with("Malformed deduct-balance payload"));
    }

    #[test]
    fn test_encode_produces_flat_wire_shape() {
        let command = Command::create_account("u9", 10.0);
        let value: serde_json::Value = serde_json::from_slice(&command.encode().unwrap()).unwrap();

        assert_eq!(value["user_id"], "u9");
        assert_eq!(value["initial_balance"], 10.0);
        assert!(value["timestamp"].is_string());
        assert!(value.get("base").is_none());
    }
}
