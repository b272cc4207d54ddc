//! Error taxonomy shared by every layer.

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::WithdrawalStatus;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Withdrawal(#[from] WithdrawalError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Datastore failures. All of these are terminal for the current operation.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Postgres SQLSTATE raised when `statement_timeout` cancels a query
const QUERY_CANCELED: &str = "57014";

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => Self::Timeout("connection pool acquire".to_string()),
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(QUERY_CANCELED) =>
            {
                Self::Timeout(db_err.message().to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}

/// Business-rule outcomes of the withdrawal state machine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WithdrawalError {
    #[error("Withdrawal {0} not found")]
    NotFound(i64),

    #[error("Account {0} not found")]
    AccountNotFound(i64),

    #[error("Withdrawal {id} already processed (status: {status})")]
    AlreadyProcessed { id: i64, status: WithdrawalStatus },

    #[error("Insufficient balance on account {account_id}: balance {balance}, requested {amount}")]
    InsufficientBalance {
        account_id: i64,
        balance: Decimal,
        amount: Decimal,
    },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
}
