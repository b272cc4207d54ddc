//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    Account, AppError, ApprovalReceipt, DatabaseError, ErrorDetail, ErrorResponse, HealthResponse,
    HealthStatus, OrderView, RateLimitResponse, SearchParams, SearchResponse, WithdrawalError,
    WithdrawalRequest, WithdrawalView,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Operations Backend API",
        version = "0.1.0",
        description = "Unified back-office search and withdrawal approval workflow",
        license(
            name = "MIT"
        )
    ),
    paths(
        search_handler,
        get_withdrawal_handler,
        approve_withdrawal_handler,
        reject_withdrawal_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            Account,
            WithdrawalRequest,
            WithdrawalView,
            OrderView,
            crate::domain::WithdrawalStatus,
            ApprovalReceipt,
            SearchResponse,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
            RateLimitResponse,
        )
    ),
    tags(
        (name = "search", description = "Unified search across accounts, withdrawals and promotional orders"),
        (name = "withdrawals", description = "Withdrawal approval workflow"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Unified search
///
/// A numeric term matches identifiers and order numbers exactly; any other
/// term matches text fields by prefix or substring, ranked by match strength.
/// An empty term returns empty sequences without touching the datastore.
/// When any lookup fails the envelope comes back with `failed: true` and
/// all sequences empty.
#[utoipa::path(
    get,
    path = "/search",
    tag = "search",
    params(
        ("q" = Option<String>, Query, description = "Search term (trimmed)"),
        ("page" = Option<String>, Query, description = "1-based page number; invalid values fall back to 1")
    ),
    responses(
        (status = 200, description = "Search results", body = SearchResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse),
        (status = 500, description = "A lookup failed; sequences are empty", body = SearchResponse)
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    let page = params.page_number();
    let term = params.q.as_deref().unwrap_or_default();
    let response = state.service.search(term, page).await;
    let status = if response.failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

/// Get a single withdrawal request by ID
#[utoipa::path(
    get,
    path = "/withdrawals/{id}",
    tag = "withdrawals",
    params(
        ("id" = i64, Path, description = "Withdrawal request ID")
    ),
    responses(
        (status = 200, description = "Withdrawal request found", body = WithdrawalRequest),
        (status = 404, description = "Withdrawal not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_withdrawal_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    let request = state.service.get_withdrawal(id).await?;
    Ok(Json(request))
}

/// Approve a pending withdrawal
///
/// Debits the owning account by the withdrawal amount and marks the request
/// approved, both or neither. Concurrent approvals of the same request debit
/// at most once.
#[utoipa::path(
    post,
    path = "/withdrawals/{id}/approve",
    tag = "withdrawals",
    params(
        ("id" = i64, Path, description = "Withdrawal request ID")
    ),
    responses(
        (status = 200, description = "Withdrawal approved and balance debited", body = ApprovalReceipt),
        (status = 400, description = "Withdrawal amount is not positive", body = ErrorResponse),
        (status = 402, description = "Insufficient balance", body = ErrorResponse),
        (status = 404, description = "Withdrawal or account not found", body = ErrorResponse),
        (status = 409, description = "Withdrawal already processed", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn approve_withdrawal_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApprovalReceipt>, AppError> {
    let receipt = state.service.approve_withdrawal(id).await?;
    Ok(Json(receipt))
}

/// Reject a withdrawal
///
/// Sets the status to rejected whatever the current status is. No balance
/// changes.
#[utoipa::path(
    post,
    path = "/withdrawals/{id}/reject",
    tag = "withdrawals",
    params(
        ("id" = i64, Path, description = "Withdrawal request ID")
    ),
    responses(
        (status = 200, description = "Withdrawal rejected", body = WithdrawalRequest),
        (status = 404, description = "Withdrawal not found", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn reject_withdrawal_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    let request = state.service.reject_withdrawal(id).await?;
    Ok(Json(request))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl AppError {
    /// HTTP status and machine-readable error type
    pub(crate) fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "database_error")
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DatabaseError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::Withdrawal(wd_err) => match wd_err {
                WithdrawalError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                WithdrawalError::AccountNotFound(_) => {
                    (StatusCode::NOT_FOUND, "account_not_found")
                }
                WithdrawalError::AlreadyProcessed { .. } => {
                    (StatusCode::CONFLICT, "already_processed")
                }
                WithdrawalError::InsufficientBalance { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "insufficient_balance")
                }
            },
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = self.classify();
        let message = self.to_string();

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
