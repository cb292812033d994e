//! DeductBalance Handler
//!
//! Applies the negated amount to an existing account. There is no floor:
//! a deduction larger than the balance leaves it negative.

use std::sync::Arc;

use crate::domain::{DeductBalanceMessage, Operation};
use crate::store::{BalanceStore, LedgerStore, MutationMode};

use super::protocol::{commit_then_record, BalanceMutation};
use super::{CommandReceipt, HandlerError};

/// Handler for debiting an existing account
#[derive(Clone)]
pub struct DeductBalanceHandler {
    balances: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl DeductBalanceHandler {
    pub fn new(balances: Arc<dyn BalanceStore>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { balances, ledger }
    }

    /// Execute the deduct command. The ledger record carries the negative amount.
    pub async fn execute(
        &self,
        message: &DeductBalanceMessage,
    ) -> Result<CommandReceipt, HandlerError> {
        commit_then_record(
            self.balances.as_ref(),
            self.ledger.as_ref(),
            BalanceMutation {
                account_id: &message.base.user_id,
                delta: -message.amount,
                mode: MutationMode::Adjust,
                operation: Operation::DeductBalance,
            },
        )
        .await
    }
}
