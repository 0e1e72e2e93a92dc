//! # event-intake
//!
//! Durable event-intake gateway. Each inbound request becomes an event
//! record with a status trail in a keyed store, is handed to an ordered,
//! deduplicating queue, and is then confirmed on the record.
//!
//! The store and the queue are capability traits ([`store::RecordStore`],
//! [`queue::QueueChannel`]) with Postgres/pgmq backends in [`db`] and
//! in-memory fakes for tests.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod intake;
pub mod ledger;
pub mod model;
pub mod queue;
pub mod server;
pub mod store;
pub mod telemetry;
