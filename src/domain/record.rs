//! Ledger records
//!
//! Immutable audit entries appended after a balance mutation commits.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of balance-affecting operation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    CreateAccount,
    AddBalance,
    DeductBalance,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAccount => "CreateAccount",
            Operation::AddBalance => "AddBalance",
            Operation::DeductBalance => "DeductBalance",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CreateAccount" => Ok(Operation::CreateAccount),
            "AddBalance" => Ok(Operation::AddBalance),
            "DeductBalance" => Ok(Operation::DeductBalance),
            other => Err(format!("unknown ledger operation '{}'", other)),
        }
    }
}

/// One immutable ledger entry.
///
/// Records sharing a `correlation_id` belong to the same logical operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: Uuid,
    pub user_id: String,
    pub operation: Operation,
    /// Positive for create/add, negative for deduct
    pub amount: f64,
    /// Captured when the record is built, after the balance commit
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "transaction_id")]
    pub correlation_id: Uuid,
}

impl LedgerRecord {
    pub fn new(
        user_id: impl Into<String>,
        operation: Operation,
        amount: f64,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            operation,
            amount,
            timestamp: Utc::now(),
            correlation_id,
        }
    }
}
