//! Operations back-office backend.
//!
//! Unified ranked search across accounts, withdrawal requests and promotional
//! orders, and a withdrawal approval workflow that debits balances exactly once.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
