//! Command selection
//!
//! Decodes a bus message once into a [`Command`] and hands it to the handler
//! for its kind.

use std::sync::Arc;

use crate::bus::BusMessage;
use crate::domain::{Command, Topic};
use crate::store::{BalanceStore, LedgerStore};

use super::{
    AddBalanceHandler, CommandReceipt, CreateAccountHandler, DeductBalanceHandler, HandlerError,
};

/// The three consistency handlers over one pair of stores
#[derive(Clone)]
pub struct CommandHandlers {
    create_account: CreateAccountHandler,
    add_balance: AddBalanceHandler,
    deduct_balance: DeductBalanceHandler,
}

impl CommandHandlers {
    pub fn new(balances: Arc<dyn BalanceStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            create_account: CreateAccountHandler::new(balances.clone(), ledger.clone()),
            add_balance: AddBalanceHandler::new(balances.clone(), ledger.clone()),
            deduct_balance: DeductBalanceHandler::new(balances, ledger),
        }
    }

    /// Run the handler matching the command kind
    pub async fn handle(&self, command: &Command) -> Result<CommandReceipt, HandlerError> {
        match command {
            Command::CreateAccount(message) => self.create_account.execute(message).await,
            Command::AddBalance(message) => self.add_balance.execute(message).await,
            Command::DeductBalance(message) => self.deduct_balance.execute(message).await,
        }
    }

    /// Decode a raw bus message and handle it
    pub async fn process(&self, message: &BusMessage) -> Result<CommandReceipt, HandlerError> {
        let topic: Topic = message.topic.parse()?;
        let command = Command::decode(topic, &message.payload)?;
        self.handle(&command).await
    }
}
