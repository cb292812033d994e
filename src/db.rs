//! Database module
//!
//! Schema checks. DDL lives in raw SQL files under
//! `migrations/`.

use sqlx::PgPool;

/// Tables the balance database must provide
pub const BALANCE_TABLES: &[&str] = &["user_balances", "bus_messages", "bus_consumer_offsets"];

/// Tables the ledger database must provide
pub const LEDGER_TABLES: &[&str] = &["ledger_records"];

/// Check that every table in `required_tables` exists
pub async fn check_schema(pool: &PgPool, required_tables: &[&str]) -> Result<bool, sqlx::Error> {
    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
