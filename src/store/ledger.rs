//! Ledger Store
//!
//! Append-only collection of immutable [`LedgerRecord`]s. An append of
//! several records is all-or-nothing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{LedgerRecord, Operation};

use super::LedgerStoreError;

/// Append-only transaction history
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically append `records` in order
    async fn append(&self, records: &[LedgerRecord]) -> Result<(), LedgerStoreError>;

    /// Records of one account, in insertion order
    async fn query(&self, account_id: &str) -> Result<Vec<LedgerRecord>, LedgerStoreError>;

    /// Sum of recorded amounts per account
    async fn totals(&self) -> Result<BTreeMap<String, f64>, LedgerStoreError>;
}

// =========================================================================
// Postgres implementation
// =========================================================================

/// Ledger Store over the `ledger_records` collection table.
///
/// Meant to live on its own database (`LEDGER_DATABASE_URL`), separate from
/// the Balance Store, so the two stores share no transaction.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type LedgerRow = (Uuid, String, String, f64, DateTime<Utc>, Uuid);

fn record_from_row(row: LedgerRow) -> Result<LedgerRecord, LedgerStoreError> {
    let (id, user_id, operation, amount, timestamp, correlation_id) = row;
    let operation: Operation = operation
        .parse()
        .map_err(LedgerStoreError::InvalidDocument)?;

    Ok(LedgerRecord {
        id,
        user_id,
        operation,
        amount,
        timestamp,
        correlation_id,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append(&self, records: &[LedgerRecord]) -> Result<(), LedgerStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        // One insert per document inside a single transaction
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO ledger_records (id, user_id, operation, amount, recorded_at, transaction_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(&record.user_id)
            .bind(record.operation.as_str())
            .bind(record.amount)
            .bind(record.timestamp)
            .bind(record.correlation_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, account_id: &str) -> Result<Vec<LedgerRecord>, LedgerStoreError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, operation, amount, recorded_at, transaction_id
            FROM ledger_records
            WHERE user_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn totals(&self) -> Result<BTreeMap<String, f64>, LedgerStoreError> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT user_id, COALESCE(SUM(amount), 0) FROM ledger_records GROUP BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_row_rejects_unknown_operation() {
        let row: LedgerRow = (
            Uuid::new_v4(),
            "u1".to_string(),
            "Transfer".to_string(),
            1.0,
            Utc::now(),
            Uuid::new_v4(),
        );

        let err = record_from_row(row).unwrap_err();
        assert!(matches!(err, LedgerStoreError::InvalidDocument(_)));
    }

    #[test]
    fn test_record_from_row() {
        let correlation_id = Uuid::new_v4();
        let row: LedgerRow = (
            Uuid::new_v4(),
            "u1".to_string(),
            "AddBalance".to_string(),
            50.0,
            Utc::now(),
            correlation_id,
        );

        let record = record_from_row(row).unwrap();
        assert_eq!(record.operation, Operation::AddBalance);
        assert_eq!(record.correlation_id, correlation_id);
    }
}
