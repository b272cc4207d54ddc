//! Test utilities: in-memory datastore and helpers.

pub mod mocks;

pub use mocks::{MockConfig, MockDatastore};
