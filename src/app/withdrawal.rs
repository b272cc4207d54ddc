//! Withdrawal approval and rejection.
//!
//! Approval is one transaction: lock the request, check it is pending, lock the
//! owner's balance, check it covers the amount, debit, flip the status, commit.
//! Any early return drops the transaction handle, which rolls back.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use crate::domain::{
    AppError, ApprovalReceipt, Datastore, ValidationError, WithdrawalError, WithdrawalRequest,
    WithdrawalStatus,
};

pub struct WithdrawalWorkflow {
    db_client: Arc<dyn Datastore>,
}

impl WithdrawalWorkflow {
    #[must_use]
    pub fn new(db_client: Arc<dyn Datastore>) -> Self {
        Self { db_client }
    }

    /// pending → approved, debiting the owning account exactly once.
    #[instrument(skip(self))]
    pub async fn approve(&self, withdrawal_id: i64) -> Result<ApprovalReceipt, AppError> {
        let result = self.run_approval(withdrawal_id).await;
        match &result {
            Ok(receipt) => info!(
                withdrawal_id,
                account_id = receipt.withdrawal.account_id,
                amount = %receipt.withdrawal.amount,
                remaining_balance = %receipt.remaining_balance,
                "Withdrawal approved"
            ),
            Err(AppError::Withdrawal(e)) => {
                warn!(withdrawal_id, error = %e, "Withdrawal approval refused")
            }
            Err(e) => error!(withdrawal_id, error = %e, "Withdrawal approval failed"),
        }
        result
    }

    async fn run_approval(&self, withdrawal_id: i64) -> Result<ApprovalReceipt, AppError> {
        let mut tx = self.db_client.begin_approval().await?;

        let mut withdrawal = tx
            .lock_withdrawal(withdrawal_id)
            .await?
            .ok_or(WithdrawalError::NotFound(withdrawal_id))?;

        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(WithdrawalError::AlreadyProcessed {
                id: withdrawal_id,
                status: withdrawal.status,
            }
            .into());
        }

        if withdrawal.amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidField {
                field: "amount".to_string(),
                message: format!("withdrawal amount must be positive, got {}", withdrawal.amount),
            }
            .into());
        }

        let account_id = withdrawal.account_id;
        let amount = withdrawal.amount;
        let balance = tx
            .lock_balance(account_id)
            .await?
            .ok_or(WithdrawalError::AccountNotFound(account_id))?;

        let insufficient = || WithdrawalError::InsufficientBalance {
            account_id,
            balance,
            amount,
        };
        if balance < amount {
            return Err(insufficient().into());
        }

        let remaining_balance = tx.debit(account_id, amount).await?.ok_or_else(insufficient)?;

        if !tx
            .transition_pending(withdrawal_id, WithdrawalStatus::Approved)
            .await?
        {
            let status = tx
                .lock_withdrawal(withdrawal_id)
                .await?
                .map_or(WithdrawalStatus::Approved, |w| w.status);
            return Err(WithdrawalError::AlreadyProcessed {
                id: withdrawal_id,
                status,
            }
            .into());
        }

        tx.commit().await?;

        withdrawal.status = WithdrawalStatus::Approved;
        Ok(ApprovalReceipt {
            withdrawal,
            remaining_balance,
        })
    }

    /// Set the status to rejected regardless of the current status. No balance change.
    #[instrument(skip(self))]
    pub async fn reject(&self, withdrawal_id: i64) -> Result<WithdrawalRequest, AppError> {
        match self.db_client.reject_withdrawal(withdrawal_id).await {
            Ok(Some(withdrawal)) => {
                info!(withdrawal_id, account_id = withdrawal.account_id, "Withdrawal rejected");
                Ok(withdrawal)
            }
            Ok(None) => {
                warn!(withdrawal_id, "Rejection target not found");
                Err(WithdrawalError::NotFound(withdrawal_id).into())
            }
            Err(e) => {
                error!(withdrawal_id, error = %e, "Withdrawal rejection failed");
                Err(e)
            }
        }
    }
}
