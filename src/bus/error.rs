//! Bus Errors

/// Errors reported by a bus client
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Database error from the Postgres-backed log
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The transport rejected or failed to deliver a publish
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The transport failed while reading
    #[error("Read failed: {0}")]
    Read(String),

    /// The bus has been shut down
    #[error("Bus closed")]
    Closed,
}

impl BusError {
    /// Check if the failure is worth retrying on the next read
    pub fn is_transient(&self) -> bool {
        !matches!(self, BusError::Closed)
    }
}
