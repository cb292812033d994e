//! Message Bus module
//!
//! Client contract for the publish/subscribe transport that carries balance
//! commands, plus an in-memory log for tests and a Postgres-backed log.

mod client;
mod error;
mod in_memory;
mod postgres;

pub use client::{BusClient, BusConsumer, BusMessage};
pub use error::BusError;
pub use in_memory::InMemoryBus;
pub use postgres::{PgBus, PgBusConfig};
