//! balance_ledger Library
//!
//! Re-exports modules for integration testing and the binaries.

pub mod api;
pub mod bus;
pub mod dispatcher;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod router;
pub mod shutdown;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Command, DecodeError, LedgerRecord, Operation, Topic};
