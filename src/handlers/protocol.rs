//! Balance-then-ledger commit protocol
//!
//! The two stores are not committed atomically. The balance transaction
//! commits first; only then is the ledger record built and appended. A failed
//! append leaves the balance committed and is reported as
//! [`HandlerError::LedgerAppendFailure`] for out-of-band reconciliation.

use uuid::Uuid;

use crate::domain::{LedgerRecord, Operation};
use crate::store::{BalanceStore, LedgerStore, MutationMode};

use super::{CommandState, HandlerError};

/// One balance mutation and the ledger operation that records it
#[derive(Debug, Clone, Copy)]
pub struct BalanceMutation<'a> {
    pub account_id: &'a str,
    /// Signed change; also the recorded ledger amount
    pub delta: f64,
    pub mode: MutationMode,
    pub operation: Operation,
}

/// Outcome of a command that reached `complete`
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReceipt {
    pub correlation_id: Uuid,
    pub record: LedgerRecord,
    pub state: CommandState,
}

fn transition(mutation: &BalanceMutation<'_>, state: CommandState) {
    if state.is_terminal() {
        tracing::debug!(
            account_id = mutation.account_id,
            operation = %mutation.operation,
            state = %state,
            "Command reached terminal state"
        );
    } else {
        tracing::trace!(
            account_id = mutation.account_id,
            operation = %mutation.operation,
            state = %state,
            "Command state"
        );
    }
}

/// Commit `mutation` to the balance store, then append its ledger record
pub async fn commit_then_record(
    balances: &dyn BalanceStore,
    ledger: &dyn LedgerStore,
    mutation: BalanceMutation<'_>,
) -> Result<CommandReceipt, HandlerError> {
    transition(&mutation, CommandState::Received);

    // Step 1-3: balance transaction
    transition(&mutation, CommandState::BalanceCommitting);
    let mut tx = balances.begin().await?;
    let mutated = balances
        .mutate(Some(tx.as_mut()), mutation.account_id, mutation.delta, mutation.mode)
        .await;
    if let Err(e) = mutated {
        tracing::debug!(
            account_id = mutation.account_id,
            rejected = e.is_rejection(),
            error = %e,
            "Balance mutation failed, rolling back"
        );
        if let Err(rollback_err) = tx.rollback().await {
            tracing::warn!(
                account_id = mutation.account_id,
                error = %rollback_err,
                "Balance rollback failed"
            );
        }
        return Err(e.into());
    }
    tx.commit().await?;
    transition(&mutation, CommandState::BalanceCommitted);

    // Step 4-5: ledger append, no rollback of the balance on failure
    let correlation_id = Uuid::new_v4();
    let record = LedgerRecord::new(
        mutation.account_id,
        mutation.operation,
        mutation.delta,
        correlation_id,
    );

    transition(&mutation, CommandState::LedgerAppending);
    if let Err(source) = ledger.append(std::slice::from_ref(&record)).await {
        return Err(HandlerError::LedgerAppendFailure {
            correlation_id,
            record: Box::new(record),
            source,
        });
    }
    transition(&mutation, CommandState::Complete);

    Ok(CommandReceipt {
        correlation_id,
        record,
        state: CommandState::Complete,
    })
}
