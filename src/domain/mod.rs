//! Domain module
//!
//! Core domain types: bus topics, balance commands and ledger records.

pub mod commands;
pub mod error;
pub mod record;

pub use commands::{
    AddBalanceMessage, BaseMessage, Command, CreateAccountMessage, DeductBalanceMessage, Topic,
};
pub use error::DecodeError;
pub use record::{LedgerRecord, Operation};
