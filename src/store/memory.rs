//! In-memory stores for tests/dev.
//!
//! The balance store serializes transactions: a transaction holds the table
//! lock from `begin` until commit or rollback, and stages its writes until
//! commit. Both stores can be told to fail, to exercise the handlers' partial
//! failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::LedgerRecord;

use super::{
    AccountBalance, BalanceError, BalanceStore, BalanceTransaction, LedgerStore,
    LedgerStoreError, MutationMode,
};

// =========================================================================
// Balance Store
// =========================================================================

/// In-memory Balance Store
#[derive(Debug, Clone, Default)]
pub struct InMemoryBalanceStore {
    accounts: Arc<Mutex<HashMap<String, f64>>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction commit fail (its writes are discarded)
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Balance row of an account, `None` when it has no row
    pub async fn get(&self, account_id: &str) -> Option<f64> {
        self.accounts.lock().await.get(account_id).copied()
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn begin(&self) -> Result<Box<dyn BalanceTransaction>, BalanceError> {
        let accounts = self.accounts.clone().lock_owned().await;
        Ok(Box::new(InMemoryBalanceTransaction {
            accounts,
            staged: HashMap::new(),
            fail_commit: self.fail_next_commit.clone(),
        }))
    }

    async fn read(&self, account_id: &str) -> Result<f64, BalanceError> {
        Ok(self.get(account_id).await.unwrap_or(0.0))
    }

    async fn list(&self) -> Result<Vec<AccountBalance>, BalanceError> {
        let accounts = self.accounts.lock().await;
        let mut rows: Vec<AccountBalance> = accounts
            .iter()
            .map(|(user_id, balance)| AccountBalance {
                user_id: user_id.clone(),
                balance: *balance,
            })
            .collect();
        rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(rows)
    }
}

struct InMemoryBalanceTransaction {
    accounts: OwnedMutexGuard<HashMap<String, f64>>,
    staged: HashMap<String, f64>,
    fail_commit: Arc<AtomicBool>,
}

impl InMemoryBalanceTransaction {
    fn current(&self, account_id: &str) -> Option<f64> {
        self.staged
            .get(account_id)
            .or_else(|| self.accounts.get(account_id))
            .copied()
    }
}

#[async_trait]
impl BalanceTransaction for InMemoryBalanceTransaction {
    async fn mutate(
        &mut self,
        account_id: &str,
        delta: f64,
        mode: MutationMode,
    ) -> Result<(), BalanceError> {
        let next = match (mode, self.current(account_id)) {
            (MutationMode::Create, Some(_)) => {
                return Err(BalanceError::AccountAlreadyExists(account_id.to_string()))
            }
            (MutationMode::Create, None) => delta,
            (MutationMode::Adjust, None) => {
                return Err(BalanceError::AccountNotFound(account_id.to_string()))
            }
            (MutationMode::Adjust, Some(balance)) => balance + delta,
        };

        self.staged.insert(account_id.to_string(), next);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BalanceError> {
        let mut this = *self;
        if this.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(BalanceError::Transaction("commit failed".to_string()));
        }

        let staged = std::mem::take(&mut this.staged);
        this.accounts.extend(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BalanceError> {
        Ok(())
    }
}

// =========================================================================
// Ledger Store
// =========================================================================

/// In-memory Ledger Store
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    records: Arc<RwLock<Vec<LedgerRecord>>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following append fail until reset
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every record, in insertion order
    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, records: &[LedgerRecord]) -> Result<(), LedgerStoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(LedgerStoreError::Rejected("ledger store unavailable".to_string()));
        }

        let mut stored = self
            .records
            .write()
            .map_err(|_| LedgerStoreError::Rejected("lock poisoned".to_string()))?;
        stored.extend_from_slice(records);
        Ok(())
    }

    async fn query(&self, account_id: &str) -> Result<Vec<LedgerRecord>, LedgerStoreError> {
        let stored = self
            .records
            .read()
            .map_err(|_| LedgerStoreError::Rejected("lock poisoned".to_string()))?;

        Ok(stored
            .iter()
            .filter(|record| record.user_id == account_id)
            .cloned()
            .collect())
    }

    async fn totals(&self) -> Result<BTreeMap<String, f64>, LedgerStoreError> {
        let stored = self
            .records
            .read()
            .map_err(|_| LedgerStoreError::Rejected("lock poisoned".to_string()))?;

        let mut totals = BTreeMap::new();
        for record in stored.iter() {
            *totals.entry(record.user_id.clone()).or_insert(0.0) += record.amount;
        }
        Ok(totals)
    }
}
