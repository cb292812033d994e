//! Postgres-backed bus
//!
//! A durable append-only log (`bus_messages`) with committed offsets per
//! consumer group (`bus_consumer_offsets`). A consumer commits the offset of a
//! message only when it asks for the next one, so a message that was handed
//! out but not fully processed before a crash is delivered again.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::Topic;

use super::{BusClient, BusConsumer, BusError, BusMessage};

/// Polling configuration for [`PgBus`] consumers
#[derive(Debug, Clone)]
pub struct PgBusConfig {
    /// Consumer group whose committed offset is tracked
    pub consumer_group: String,
    /// Delay between polls when the log has no new messages
    pub poll_interval: Duration,
    /// Maximum number of messages fetched per poll
    pub batch_size: i64,
}

impl Default for PgBusConfig {
    fn default() -> Self {
        Self {
            consumer_group: "ledger-consumer".to_string(),
            poll_interval: Duration::from_millis(200),
            batch_size: 100,
        }
    }
}

/// Bus client over a Postgres log table
#[derive(Debug, Clone)]
pub struct PgBus {
    pool: PgPool,
    config: PgBusConfig,
}

impl PgBus {
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, PgBusConfig::default())
    }

    pub fn with_config(pool: PgPool, config: PgBusConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl BusClient for PgBus {
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let offset: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bus_messages (topic, partition_key, payload)
            VALUES ($1, $2, $3)
            RETURNING offset_id
            "#,
        )
        .bind(topic.as_str())
        .bind(key)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(topic = %topic, key, offset, "Message published");
        Ok(())
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<Box<dyn BusConsumer>, BusError> {
        let committed: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT committed_offset FROM bus_consumer_offsets WHERE group_id = $1
            "#,
        )
        .bind(&self.config.consumer_group)
        .fetch_optional(&self.pool)
        .await?;

        // No committed offset yet: start from the earliest retained message
        let position = committed.unwrap_or(0);

        tracing::info!(
            group = %self.config.consumer_group,
            position,
            "Bus subscription opened"
        );

        Ok(Box::new(PgConsumer {
            pool: self.pool.clone(),
            config: self.config.clone(),
            topics: topics.iter().map(|t| t.as_str().to_string()).collect(),
            position,
            buffer: VecDeque::new(),
            pending_commit: None,
        }))
    }
}

struct PgConsumer {
    pool: PgPool,
    config: PgBusConfig,
    topics: Vec<String>,
    /// Highest offset fetched so far
    position: i64,
    buffer: VecDeque<BusMessage>,
    /// Offset of the last message handed out, committed on the next call
    pending_commit: Option<i64>,
}

impl PgConsumer {
    async fn commit(&mut self, offset: i64) -> Result<(), BusError> {
        sqlx::query(
            r#"
            INSERT INTO bus_consumer_offsets (group_id, committed_offset, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (group_id)
            DO UPDATE SET committed_offset = GREATEST(bus_consumer_offsets.committed_offset, $2),
                          updated_at = NOW()
            "#,
        )
        .bind(&self.config.consumer_group)
        .bind(offset)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&mut self) -> Result<(), BusError> {
        let rows: Vec<(i64, String, String, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT offset_id, topic, partition_key, payload
            FROM bus_messages
            WHERE offset_id > $1 AND topic = ANY($2)
            ORDER BY offset_id ASC
            LIMIT $3
            "#,
        )
        .bind(self.position)
        .bind(&self.topics)
        .bind(self.config.batch_size)
        .fetch_all(&self.pool)
        .await?;

        for (offset, topic, key, payload) in rows {
            self.position = self.position.max(offset);
            self.buffer.push_back(BusMessage {
                topic,
                key,
                payload,
                offset,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl BusConsumer for PgConsumer {
    async fn next_message(&mut self) -> Result<BusMessage, BusError> {
        if let Some(offset) = self.pending_commit {
            self.commit(offset).await?;
            self.pending_commit = None;
        }

        loop {
            if let Some(message) = self.buffer.pop_front() {
                self.pending_commit = Some(message.offset);
                return Ok(message);
            }

            self.fetch().await?;

            if self.buffer.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }
}
