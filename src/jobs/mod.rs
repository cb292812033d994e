//! Scheduled Jobs
//!
//! Periodic reconciliation between the Balance Store and the Ledger Store.
//! A ledger append that fails after the balance commit leaves the two stores
//! disagreeing; this job finds those accounts. It reports and never repairs.
//!
//! The two stores are read one after the other, so a single pass can see a
//! command that is still between its balance commit and its ledger append.
//! The job only warns about findings that an earlier pass saw unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;

use crate::shutdown::Shutdown;
use crate::store::{BalanceError, BalanceStore, LedgerStore, LedgerStoreError};

/// Differences smaller than this are float noise
const DRIFT_TOLERANCE: f64 = 1e-9;

/// Job errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Balance store error: {0}")]
    Balance(#[from] BalanceError),

    #[error("Ledger store error: {0}")]
    Ledger(#[from] LedgerStoreError),
}

// =========================================================================
// Reconciliation
// =========================================================================

/// An account whose balance differs from the sum of its ledger amounts
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceDrift {
    pub user_id: String,
    pub balance: f64,
    pub ledger_total: f64,
    /// `balance - ledger_total`; positive means the ledger is behind
    pub difference: f64,
}

/// Report from one reconciliation pass
#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub drifts: Vec<BalanceDrift>,
    /// Accounts with ledger records but no balance row
    pub orphaned_ledger_accounts: Vec<String>,
    /// Drifts the previous job pass saw with the same difference
    pub confirmed_drifts: Vec<BalanceDrift>,
    /// Orphaned accounts the previous job pass also saw
    pub confirmed_orphans: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty() && self.orphaned_ledger_accounts.is_empty()
    }
}

/// Compare every balance row with its ledger total
pub async fn reconcile(
    balances: &dyn BalanceStore,
    ledger: &dyn LedgerStore,
) -> Result<ReconciliationReport, JobError> {
    let rows = balances.list().await?;
    let mut totals = ledger.totals().await?;

    let mut drifts = Vec::new();
    for row in &rows {
        let ledger_total = totals.remove(&row.user_id).unwrap_or(0.0);
        let difference = row.balance - ledger_total;

        if difference.abs() > DRIFT_TOLERANCE {
            drifts.push(BalanceDrift {
                user_id: row.user_id.clone(),
                balance: row.balance,
                ledger_total,
                difference,
            });
        }
    }

    // Whatever is left has no balance row
    let orphaned_ledger_accounts: Vec<String> = totals.into_keys().collect();

    Ok(ReconciliationReport {
        accounts_checked: rows.len(),
        drifts,
        orphaned_ledger_accounts,
        confirmed_drifts: Vec::new(),
        confirmed_orphans: Vec::new(),
        completed_at: Utc::now(),
    })
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Findings of the last pass, keyed by account
#[derive(Debug, Default)]
struct PreviousPass {
    drifts: HashMap<String, f64>,
    orphans: Vec<String>,
}

/// Runs [`reconcile`] on a fixed interval until shutdown
pub struct ReconciliationJob {
    balances: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerStore>,
    interval: Duration,
    previous: Mutex<PreviousPass>,
}

impl ReconciliationJob {
    pub fn new(
        balances: Arc<dyn BalanceStore>,
        ledger: Arc<dyn LedgerStore>,
        interval: Duration,
    ) -> Self {
        Self {
            balances,
            ledger,
            interval,
            previous: Mutex::new(PreviousPass::default()),
        }
    }

    /// Start the job in the background
    pub fn start(self, shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: Shutdown) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reconciliation job started");

        let mut ticker = interval(self.interval);
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "Reconciliation failed");
                    }
                }
            }
        }

        tracing::info!("Reconciliation job stopped");
    }

    /// Run one pass and log what it found.
    ///
    /// Findings first seen in this pass are logged at debug level and
    /// confirmed, or forgotten, by the next pass.
    pub async fn run_once(&self) -> Result<ReconciliationReport, JobError> {
        let mut report = reconcile(self.balances.as_ref(), self.ledger.as_ref()).await?;

        {
            let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
            report.confirmed_drifts = report
                .drifts
                .iter()
                .filter(|drift| {
                    previous.drifts.get(&drift.user_id).is_some_and(|difference| {
                        (difference - drift.difference).abs() <= DRIFT_TOLERANCE
                    })
                })
                .cloned()
                .collect();
            report.confirmed_orphans = report
                .orphaned_ledger_accounts
                .iter()
                .filter(|account_id| previous.orphans.contains(account_id))
                .cloned()
                .collect();

            *previous = PreviousPass {
                drifts: report
                    .drifts
                    .iter()
                    .map(|drift| (drift.user_id.clone(), drift.difference))
                    .collect(),
                orphans: report.orphaned_ledger_accounts.clone(),
            };
        }

        for drift in &report.drifts {
            if report.confirmed_drifts.contains(drift) {
                tracing::warn!(
                    account_id = %drift.user_id,
                    balance = drift.balance,
                    ledger_total = drift.ledger_total,
                    difference = drift.difference,
                    "Balance and ledger disagree"
                );
            } else {
                tracing::debug!(
                    account_id = %drift.user_id,
                    difference = drift.difference,
                    "Possible drift, rechecking on the next pass"
                );
            }
        }
        for account_id in &report.orphaned_ledger_accounts {
            if report.confirmed_orphans.contains(account_id) {
                tracing::warn!(account_id = %account_id, "Ledger records without a balance row");
            } else {
                tracing::debug!(account_id = %account_id, "Possible orphaned ledger account");
            }
        }

        tracing::info!(
            accounts_checked = report.accounts_checked,
            drifts = report.confirmed_drifts.len(),
            orphaned = report.confirmed_orphans.len(),
            unconfirmed = report.drifts.len() + report.orphaned_ledger_accounts.len()
                - report.confirmed_drifts.len()
                - report.confirmed_orphans.len(),
            "Reconciliation completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedgerRecord, Operation};
    use crate::shutdown;
    use crate::store::{InMemoryBalanceStore, InMemoryLedgerStore, MutationMode};
    use uuid::Uuid;

    async fn seed(balances: &InMemoryBalanceStore, ledger: &InMemoryLedgerStore, id: &str, amount: f64) {
        balances
            .mutate(None, id, amount, MutationMode::Create)
            .await
            .unwrap();
        ledger
            .append(&[LedgerRecord::new(id, Operation::CreateAccount, amount, Uuid::new_v4())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_consistent_stores_report_nothing() {
        let balances = InMemoryBalanceStore::new();
        let ledger = InMemoryLedgerStore::new();
        seed(&balances, &ledger, "u1", 100.0).await;
        seed(&balances, &ledger, "u2", 0.0).await;

        let report = reconcile(&balances, &ledger).await.unwrap();

        assert_eq!(report.accounts_checked, 2);
        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn test_missing_ledger_record_is_drift() {
        let balances = InMemoryBalanceStore::new();
        let ledger = InMemoryLedgerStore::new();
        seed(&balances, &ledger, "u1", 100.0).await;

        // Balance committed, ledger append lost
        balances
            .mutate(None, "u1", 25.0, MutationMode::Adjust)
            .await
            .unwrap();

        let report = reconcile(&balances, &ledger).await.unwrap();

        assert_eq!(
            report.drifts,
            vec![BalanceDrift {
                user_id: "u1".to_string(),
                balance: 125.0,
                ledger_total: 100.0,
                difference: 25.0,
            }]
        );
    }

    #[tokio::test]
    async fn test_ledger_without_balance_row_is_orphaned() {
        let balances = InMemoryBalanceStore::new();
        let ledger = InMemoryLedgerStore::new();
        ledger
            .append(&[LedgerRecord::new("ghost", Operation::AddBalance, 5.0, Uuid::new_v4())])
            .await
            .unwrap();

        let report = reconcile(&balances, &ledger).await.unwrap();

        assert_eq!(report.orphaned_ledger_accounts, vec!["ghost".to_string()]);
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn test_job_stops_on_shutdown() {
        let job = ReconciliationJob::new(
            Arc::new(InMemoryBalanceStore::new()),
            Arc::new(InMemoryLedgerStore::new()),
            Duration::from_millis(10),
        );
        let (trigger, shutdown) = shutdown::channel();

        let handle = job.start(shutdown);
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_job_confirms_only_persistent_drift() {
        let balances = InMemoryBalanceStore::new();
        let ledger = InMemoryLedgerStore::new();
        seed(&balances, &ledger, "u1", 100.0).await;
        let job = ReconciliationJob::new(
            Arc::new(balances.clone()),
            Arc::new(ledger.clone()),
            Duration::from_secs(60),
        );

        // Ledger append still pending when the first pass runs
        balances
            .mutate(None, "u1", 10.0, MutationMode::Adjust)
            .await
            .unwrap();
        let first = job.run_once().await.unwrap();
        assert_eq!(first.drifts.len(), 1);
        assert!(first.confirmed_drifts.is_empty());

        ledger
            .append(&[LedgerRecord::new("u1", Operation::AddBalance, 10.0, Uuid::new_v4())])
            .await
            .unwrap();
        let second = job.run_once().await.unwrap();
        assert!(second.is_consistent());

        // This time the append never lands
        balances
            .mutate(None, "u1", 5.0, MutationMode::Adjust)
            .await
            .unwrap();
        let third = job.run_once().await.unwrap();
        assert!(third.confirmed_drifts.is_empty());
        let fourth = job.run_once().await.unwrap();
        assert_eq!(fourth.confirmed_drifts.len(), 1);
        assert_eq!(fourth.confirmed_drifts[0].difference, 5.0);
    }

    #[tokio::test]
    async fn test_job_confirms_orphan_on_second_pass() {
        let ledger = InMemoryLedgerStore::new();
        ledger
            .append(&[LedgerRecord::new("ghost", Operation::AddBalance, 5.0, Uuid::new_v4())])
            .await
            .unwrap();
        let job = ReconciliationJob::new(
            Arc::new(InMemoryBalanceStore::new()),
            Arc::new(ledger),
            Duration::from_secs(60),
        );

        assert!(job.run_once().await.unwrap().confirmed_orphans.is_empty());
        assert_eq!(
            job.run_once().await.unwrap().confirmed_orphans,
            vec!["ghost".to_string()]
        );
    }
}
