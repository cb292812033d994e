//! Store Errors

/// Errors from the Balance Store
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    /// A create found an existing row for the account
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    /// An adjust found no row for the account
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transaction could not be opened, committed or rolled back
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

impl BalanceError {
    /// Business-rule rejection, as opposed to a transport/transaction failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BalanceError::AccountAlreadyExists(_) | BalanceError::AccountNotFound(_)
        )
    }
}

/// Errors from the Ledger Store
#[derive(Debug, thiserror::Error)]
pub enum LedgerStoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the append as a whole
    #[error("Append rejected: {0}")]
    Rejected(String),

    /// A stored document could not be read back
    #[error("Invalid ledger document: {0}")]
    InvalidDocument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_error_rejection() {
        assert!(BalanceError::AccountAlreadyExists("u1".into()).is_rejection());
        assert!(BalanceError::AccountNotFound("u1".into()).is_rejection());
        assert!(!BalanceError::Transaction("commit".into()).is_rejection());
    }

    #[test]
    fn test_ledger_store_error_display() {
        let err = LedgerStoreError::Rejected("store offline".into());
        assert_eq!(err.to_string(), "Append rejected: store offline");
    }
}
