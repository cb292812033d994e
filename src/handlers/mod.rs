//! Consistency Handlers module
//!
//! One handler per command kind, each applying its command to the Balance
//! Store and then recording it in the Ledger Store.

mod add_balance_handler;
mod command_handlers;
mod consumer;
mod create_account_handler;
mod deduct_balance_handler;
mod error;
mod protocol;


pub use add_balance_handler::AddBalanceHandler;
pub use command_handlers::CommandHandlers;
pub use consumer::{CommandConsumer, ConsumerStats};
pub use create_account_handler::CreateAccountHandler;
pub use deduct_balance_handler::DeductBalanceHandler;
pub use error::{CommandState, HandlerError};
pub use protocol::{commit_then_record, BalanceMutation, CommandReceipt};
