//! Handler Errors and command states

use std::fmt;

use uuid::Uuid;

use crate::domain::{DecodeError, LedgerRecord};
use crate::store::{BalanceError, LedgerStoreError};

/// Lifecycle of one command through the two-step protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Received,
    BalanceCommitting,
    BalanceCommitted,
    LedgerAppending,
    Complete,
    /// Nothing was committed anywhere
    Failed,
    /// Balance committed, ledger record missing
    PartiallyComplete,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Received => "received",
            CommandState::BalanceCommitting => "balance-committing",
            CommandState::BalanceCommitted => "balance-committed",
            CommandState::LedgerAppending => "ledger-appending",
            CommandState::Complete => "complete",
            CommandState::Failed => "failed",
            CommandState::PartiallyComplete => "partially-complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Complete | CommandState::Failed | CommandState::PartiallyComplete
        )
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistency handler failures
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Transport or transaction error before the balance commit completed
    #[error("Balance commit failed: {0}")]
    BalanceCommitFailure(#[source] BalanceError),

    /// The balance commit succeeded but the ledger append did not
    #[error("Ledger append failed after balance commit (transaction {correlation_id}): {source}")]
    LedgerAppendFailure {
        correlation_id: Uuid,
        record: Box<LedgerRecord>,
        #[source]
        source: LedgerStoreError,
    },

    #[error(transparent)]
    DecodeFailure(#[from] DecodeError),
}

impl HandlerError {
    /// Terminal state of a command that ended in this error
    pub fn final_state(&self) -> CommandState {
        match self {
            HandlerError::LedgerAppendFailure { .. } => CommandState::PartiallyComplete,
            _ => CommandState::Failed,
        }
    }

    /// Correlation identifier of the committed balance mutation, if any
    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            HandlerError::LedgerAppendFailure { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }
}

impl From<BalanceError> for HandlerError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::AccountAlreadyExists(id) => HandlerError::AccountAlreadyExists(id),
            BalanceError::AccountNotFound(id) => HandlerError::AccountNotFound(id),
            other => HandlerError::BalanceCommitFailure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Operation;

    #[test]
    fn test_balance_rejections_keep_their_kind() {
        let err: HandlerError = BalanceError::AccountNotFound("u1".into()).into();
        assert!(matches!(err, HandlerError::AccountNotFound(ref id) if id == "u1"));
        assert_eq!(err.final_state(), CommandState::Failed);

        let err: HandlerError = BalanceError::Transaction("commit failed".into()).into();
        assert!(matches!(err, HandlerError::BalanceCommitFailure(_)));
    }

    #[test]
    fn test_ledger_failure_is_partially_complete() {
        let correlation_id = Uuid::new_v4();
        let err = HandlerError::LedgerAppendFailure {
            correlation_id,
            record: Box::new(LedgerRecord::new("u1", Operation::AddBalance, 5.0, correlation_id)),
            source: LedgerStoreError::Rejected("offline".into()),
        };

        assert_eq!(err.final_state(), CommandState::PartiallyComplete);
        assert_eq!(err.correlation_id(), Some(correlation_id));
        assert!(err.to_string().contains(&correlation_id.to_string()));
    }

    #[test]
    fn test_terminal_states() {
        assert!(CommandState::Complete.is_terminal());
        assert!(CommandState::PartiallyComplete.is_terminal());
        assert!(!CommandState::BalanceCommitted.is_terminal());
        assert_eq!(CommandState::LedgerAppending.to_string(), "ledger-appending");
    }
}
