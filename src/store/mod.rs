//! Store module
//!
//! Adapters for the two stores the pipeline keeps in agreement:
//! the Balance Store (mutable current balance per account) and the
//! Ledger Store (append-only history).

mod balance;
mod error;
mod ledger;
mod memory;

pub use balance::{
    AccountBalance, BalanceStore, BalanceTransaction, MutationMode, PgBalanceStore,
};
pub use error::{BalanceError, LedgerStoreError};
pub use ledger::{LedgerStore, PgLedgerStore};
pub use memory::{InMemoryBalanceStore, InMemoryLedgerStore};
