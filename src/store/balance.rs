//! Balance Store
//!
//! Keyed table of account identifier -> current balance. Every mutation runs
//! inside a transaction, either one the caller opened with
//! [`BalanceStore::begin`] or one the store opens and finishes itself.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::BalanceError;

/// How a mutation treats the account row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    /// Insert a new row holding `delta`; fails if the row exists
    Create,
    /// Add `delta` to the existing row; fails if the row does not exist
    Adjust,
}

/// A row of the balance table
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub user_id: String,
    pub balance: f64,
}

/// An open Balance Store transaction.
///
/// Dropping it without calling [`commit`](BalanceTransaction::commit) discards
/// its mutations.
#[async_trait]
pub trait BalanceTransaction: Send {
    async fn mutate(
        &mut self,
        account_id: &str,
        delta: f64,
        mode: MutationMode,
    ) -> Result<(), BalanceError>;

    async fn commit(self: Box<Self>) -> Result<(), BalanceError>;

    async fn rollback(self: Box<Self>) -> Result<(), BalanceError>;
}

/// Authoritative current-balance projection
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BalanceTransaction>, BalanceError>;

    /// Apply one mutation.
    ///
    /// With `tx` the mutation joins the caller's transaction and the caller
    /// decides commit or rollback. Without it the store opens a transaction,
    /// commits on success and rolls back on failure.
    async fn mutate(
        &self,
        tx: Option<&mut dyn BalanceTransaction>,
        account_id: &str,
        delta: f64,
        mode: MutationMode,
    ) -> Result<(), BalanceError> {
        if let Some(tx) = tx {
            return tx.mutate(account_id, delta, mode).await;
        }

        let mut tx = self.begin().await?;
        if let Err(e) = tx.mutate(account_id, delta, mode).await {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, account_id, "Rollback failed");
            }
            return Err(e);
        }
        tx.commit().await
    }

    /// Current balance, or 0 when the account has no row
    async fn read(&self, account_id: &str) -> Result<f64, BalanceError>;

    /// Every balance row, ordered by account identifier
    async fn list(&self) -> Result<Vec<AccountBalance>, BalanceError>;
}

// =========================================================================
// Postgres implementation
// =========================================================================

/// Balance Store over the `user_balances` table
#[derive(Debug, Clone)]
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn begin(&self) -> Result<Box<dyn BalanceTransaction>, BalanceError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBalanceTransaction { tx }))
    }

    async fn read(&self, account_id: &str) -> Result<f64, BalanceError> {
        let balance: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT balance FROM user_balances WHERE user_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or(0.0))
    }

    async fn list(&self) -> Result<Vec<AccountBalance>, BalanceError> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT user_id, balance FROM user_balances ORDER BY user_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, balance)| AccountBalance { user_id, balance })
            .collect())
    }
}

struct PgBalanceTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BalanceTransaction for PgBalanceTransaction {
    async fn mutate(
        &mut self,
        account_id: &str,
        delta: f64,
        mode: MutationMode,
    ) -> Result<(), BalanceError> {
        match mode {
            MutationMode::Create => {
                sqlx::query(
                    r#"
                    INSERT INTO user_balances (user_id, balance)
                    VALUES ($1, $2)
                    "#,
                )
                .bind(account_id)
                .bind(delta)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        BalanceError::AccountAlreadyExists(account_id.to_string())
                    } else {
                        BalanceError::Database(e)
                    }
                })?;
            }
            MutationMode::Adjust => {
                let rows_affected = sqlx::query(
                    r#"
                    UPDATE user_balances
                    SET balance = balance + $2, updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(account_id)
                .bind(delta)
                .execute(&mut *self.tx)
                .await?
                .rows_affected();

                if rows_affected == 0 {
                    return Err(BalanceError::AccountNotFound(account_id.to_string()));
                }
            }
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BalanceError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BalanceError> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}

/// Postgres `unique_violation`
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
