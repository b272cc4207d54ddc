//! Application service: the single entry point the HTTP layer talks to.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::domain::{
    AppError, ApprovalReceipt, Datastore, HealthResponse, HealthStatus, SearchResponse,
    WithdrawalError, WithdrawalRequest,
};

use super::search::SearchAggregator;
use super::withdrawal::WithdrawalWorkflow;

/// Application service containing business logic
pub struct AppService {
    db_client: Arc<dyn Datastore>,
    search: SearchAggregator,
    withdrawals: WithdrawalWorkflow,
}

impl AppService {
    #[must_use]
    pub fn new(db_client: Arc<dyn Datastore>) -> Self {
        Self {
            search: SearchAggregator::new(Arc::clone(&db_client)),
            withdrawals: WithdrawalWorkflow::new(Arc::clone(&db_client)),
            db_client,
        }
    }

    pub async fn search(&self, term: &str, page: u32) -> SearchResponse {
        self.search.search(term, page).await
    }

    pub async fn approve_withdrawal(&self, id: i64) -> Result<ApprovalReceipt, AppError> {
        self.withdrawals.approve(id).await
    }

    pub async fn reject_withdrawal(&self, id: i64) -> Result<WithdrawalRequest, AppError> {
        self.withdrawals.reject(id).await
    }

    /// Get a withdrawal request by ID
    #[instrument(skip(self))]
    pub async fn get_withdrawal(&self, id: i64) -> Result<WithdrawalRequest, AppError> {
        self.db_client
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id).into())
    }

    /// Perform health check on the datastore
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.db_client.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = %e, "Datastore health check failed");
                HealthStatus::Unhealthy
            }
        };
        HealthResponse::new(db_health)
    }
}
