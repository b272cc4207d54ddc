//! Domain traits defining contracts for the datastore.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::AppError;
use super::search::LookupPlan;
use super::types::{Account, OrderView, WithdrawalRequest, WithdrawalStatus, WithdrawalView};

/// Datastore client for the search lookups and withdrawal transitions
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Check datastore connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Run an account lookup plan
    async fn search_accounts(&self, plan: &LookupPlan) -> Result<Vec<Account>, AppError>;

    /// Run a withdrawal lookup plan (joined with the owner's username)
    async fn search_withdrawals(&self, plan: &LookupPlan) -> Result<Vec<WithdrawalView>, AppError>;

    /// Run a promotional-order lookup plan (joined with the owner's username)
    async fn search_orders(&self, plan: &LookupPlan) -> Result<Vec<OrderView>, AppError>;

    /// Get a single withdrawal request by ID
    async fn get_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, AppError>;

    /// Unconditionally set a withdrawal's status to `rejected`.
    /// Returns the updated row, or `None` if no such withdrawal exists.
    async fn reject_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, AppError>;

    /// Open an isolated transaction for the approval read-check-debit-write sequence
    async fn begin_approval(&self) -> Result<Box<dyn ApprovalTransaction>, AppError>;
}

/// Transaction scope for one approval.
///
/// Reads take row locks that are held until commit or drop. Dropping the handle
/// without calling [`ApprovalTransaction::commit`] rolls every write back.
#[async_trait]
pub trait ApprovalTransaction: Send {
    /// Load and lock a withdrawal request
    async fn lock_withdrawal(&mut self, id: i64) -> Result<Option<WithdrawalRequest>, AppError>;

    /// Load and lock an account's balance
    async fn lock_balance(&mut self, account_id: i64) -> Result<Option<Decimal>, AppError>;

    /// Subtract `amount` from the balance. Returns the new balance, or `None` if the
    /// balance no longer covers the amount (nothing is written in that case).
    async fn debit(&mut self, account_id: i64, amount: Decimal)
    -> Result<Option<Decimal>, AppError>;

    /// Move a `pending` withdrawal to `status`. Returns `false` if it was no longer
    /// pending (nothing is written in that case).
    async fn transition_pending(
        &mut self,
        id: i64,
        status: WithdrawalStatus,
    ) -> Result<bool, AppError>;

    /// Make all writes visible atomically
    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
