//! Command Dispatcher
//!
//! Turns external create/add/deduct requests into bus messages. Delivery and
//! the command's outcome are asynchronous: a successful call only means the
//! bus accepted the message.

use std::sync::Arc;

use crate::bus::{BusClient, BusError};
use crate::domain::Command;

/// Publishes balance commands on their topics, keyed by account
#[derive(Clone)]
pub struct CommandDispatcher {
    bus: Arc<dyn BusClient>,
}

impl CommandDispatcher {
    pub fn new(bus: Arc<dyn BusClient>) -> Self {
        Self { bus }
    }

    pub async fn create_account(&self, user_id: &str, initial_balance: f64) -> Result<Command, BusError> {
        self.submit(Command::create_account(user_id, initial_balance)).await
    }

    pub async fn add_amount(&self, user_id: &str, amount: f64) -> Result<Command, BusError> {
        self.submit(Command::add_balance(user_id, amount)).await
    }

    pub async fn deduct_amount(&self, user_id: &str, amount: f64) -> Result<Command, BusError> {
        self.submit(Command::deduct_balance(user_id, amount)).await
    }

    /// Publish an already-built command and return it as published
    pub async fn submit(&self, command: Command) -> Result<Command, BusError> {
        let payload = command
            .encode()
            .map_err(|e| BusError::Publish(format!("Failed to encode command: {}", e)))?;

        self.bus
            .publish(command.topic(), command.user_id(), payload)
            .await?;

        tracing::debug!(
            topic = %command.topic(),
            account_id = command.user_id(),
            amount = command.signed_amount(),
            "Command published"
        );

        Ok(command)
    }
}
