//! Fan-Out Router module
//!
//! Reads every message the process is subscribed to off the bus and copies it
//! into each bounded subscriber queue registered for the message's topic.

mod fanout;
mod subscriber;

pub use fanout::{DispatchReport, FanOutRouter, RouterStats};
pub use subscriber::{SubscriberHandle, SubscriberStats};
