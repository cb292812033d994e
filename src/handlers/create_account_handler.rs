//! CreateAccount Handler
//!
//! Inserts the balance row at the initial amount, then records the opening
//! entry. An existing row rejects the command before anything is written.

use std::sync::Arc;

use crate::domain::{CreateAccountMessage, Operation};
use crate::store::{BalanceStore, LedgerStore, MutationMode};

use super::protocol::{commit_then_record, BalanceMutation};
use super::{CommandReceipt, HandlerError};

/// Handler for account creation
#[derive(Clone)]
pub struct CreateAccountHandler {
    balances: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl CreateAccountHandler {
    pub fn new(balances: Arc<dyn BalanceStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { balances, ledger }
    }

    /// Execute the create command
    pub async fn execute(
        &self,
        message: &CreateAccountMessage,
    ) -> Result<CommandReceipt, HandlerError> {
        commit_then_record(
            self.balances.as_ref(),
            self.ledger.as_ref(),
            BalanceMutation {
                account_id: &message.base.user_id,
                delta: message.initial_balance,
                mode: MutationMode::Create,
                operation: Operation::CreateAccount,
            },
        )
        .await
    }
}
