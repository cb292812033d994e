//! AddBalance Handler

use std::sync::Arc;

use crate::domain::{AddBalanceMessage, Operation};
use crate::store::{BalanceStore, LedgerStore, MutationMode};

use super::protocol::{commit_then_record, BalanceMutation};
use super::{CommandReceipt, HandlerError};

/// Handler for crediting an existing account
#[derive(Clone)]
pub struct AddBalanceHandler {
    balances: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl AddBalanceHandler {
    pub fn new(balances: Arc<dyn BalanceStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { balances, ledger }
    }

    pub async fn execute(&self, message: &AddBalanceMessage) -> Result<CommandReceipt, HandlerError> {
        commit_then_record(
            self.balances.as_ref(),
            self.ledger.as_ref(),
            BalanceMutation {
                account_id: &message.base.user_id,
                delta: message.amount,
                mode: MutationMode::Adjust,
                operation: Operation::AddBalance,
            },
        )
        .await
    }
}
