//! Datastore implementations.

pub mod postgres;

pub use postgres::{PostgresApprovalTransaction, PostgresClient, PostgresConfig};
