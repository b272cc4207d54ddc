//! Domain types for accounts, withdrawals, promotional orders and search envelopes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of a withdrawal request. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Awaiting an operator decision
    #[default]
    Pending,
    /// Approved; the owning account has been debited
    Approved,
    /// Rejected; no balance change
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid withdrawal status: {}", s)),
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform user account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Account {
    #[schema(example = 1024)]
    pub id: i64,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: Option<String>,
    #[schema(example = "+15550100")]
    pub phone_number: Option<String>,
    /// Current balance; only the approval workflow debits it
    #[schema(value_type = String, example = "100.00")]
    pub balance: Decimal,
    pub vip_status: Option<String>,
    pub credit_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn new(id: i64, username: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            phone_number: None,
            balance,
            vip_status: None,
            credit_score: None,
            created_at: Utc::now(),
        }
    }
}

/// Withdrawal request as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WithdrawalRequest {
    #[schema(example = 501)]
    pub id: i64,
    /// Owning account
    #[schema(example = 1024)]
    pub account_id: i64,
    /// Fixed at creation, never changed by the workflow
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    #[schema(example = "bank_transfer")]
    pub method: String,
    pub holder_name: Option<String>,
    pub phone_number: Option<String>,
    pub crypto_address: Option<String>,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    #[must_use]
    pub fn new(id: i64, account_id: i64, amount: Decimal, method: impl Into<String>) -> Self {
        Self {
            id,
            account_id,
            amount,
            method: method.into(),
            holder_name: None,
            phone_number: None,
            crypto_address: None,
            status: WithdrawalStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Withdrawal joined with the owning account's username (absent when the account is gone)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WithdrawalView {
    pub id: i64,
    pub account_id: i64,
    pub username: Option<String>,
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    pub method: String,
    pub status: WithdrawalStatus,
    pub holder_name: Option<String>,
    pub phone_number: Option<String>,
    pub crypto_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WithdrawalView {
    #[must_use]
    pub fn from_request(request: &WithdrawalRequest, username: Option<String>) -> Self {
        Self {
            id: request.id,
            account_id: request.account_id,
            username,
            amount: request.amount,
            method: request.method.clone(),
            status: request.status,
            holder_name: request.holder_name.clone(),
            phone_number: request.phone_number.clone(),
            crypto_address: request.crypto_address.clone(),
            created_at: request.created_at,
        }
    }
}

/// Promotional ("lucky") order as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PromotionalOrder {
    pub id: i64,
    pub account_id: i64,
    pub order_number: i64,
    pub is_claimed: bool,
    pub created_at: DateTime<Utc>,
}

impl PromotionalOrder {
    #[must_use]
    pub fn new(id: i64, account_id: i64, order_number: i64) -> Self {
        Self {
            id,
            account_id,
            order_number,
            is_claimed: false,
            created_at: Utc::now(),
        }
    }
}

/// Promotional order joined with its owner's username
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct OrderView {
    pub id: i64,
    pub account_id: i64,
    pub username: String,
    pub order_number: i64,
    pub is_claimed: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful approval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ApprovalReceipt {
    pub withdrawal: WithdrawalRequest,
    /// Account balance after the debit
    #[schema(value_type = String, example = "0.00")]
    pub remaining_balance: Decimal,
}

/// Query string of `GET /search`. The page is kept raw so that garbage falls back to 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SearchParams {
    /// Free-text term
    #[serde(default)]
    #[schema(example = "alice")]
    pub q: Option<String>,
    /// 1-based page number
    #[serde(default)]
    #[schema(example = "1")]
    pub page: Option<String>,
}

impl SearchParams {
    /// Page number from the leading digits (`"2abc"` is page 2); no digits,
    /// a sign, overflow or zero all become 1.
    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| {
                let p = p.trim_start();
                let digits = p.bytes().take_while(u8::is_ascii_digit).count();
                p[..digits].parse::<u32>().ok()
            })
            .unwrap_or(1)
            .max(1)
    }
}

/// Unified search response envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SearchResponse {
    /// Trimmed query echo
    pub query: String,
    pub page: u32,
    pub page_size: u32,
    pub accounts: Vec<Account>,
    /// Deposits are not searchable; always empty
    #[schema(value_type = Vec<Object>)]
    pub deposits: Vec<serde_json::Value>,
    pub withdrawals: Vec<WithdrawalView>,
    pub orders: Vec<OrderView>,
    /// Set when a lookup failed; all sequences are then empty
    pub failed: bool,
}

impl SearchResponse {
    #[must_use]
    pub fn empty(query: impl Into<String>, page: u32, page_size: u32) -> Self {
        Self {
            query: query.into(),
            page,
            page_size,
            accounts: Vec::new(),
            deposits: Vec::new(),
            withdrawals: Vec::new(),
            orders: Vec::new(),
            failed: false,
        }
    }

    #[must_use]
    pub fn failed(query: impl Into<String>, page: u32, page_size: u32) -> Self {
        Self {
            failed: true,
            ..Self::empty(query, page, page_size)
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus) -> Self {
        Self {
            status: database,
            database,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "already_processed")]
    pub r#type: String,
    /// Human-readable error message
    #[schema(example = "Withdrawal 501 already processed (status: approved)")]
    pub message: String,
}

/// Rate limit exceeded response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    pub error: ErrorDetail,
    /// Seconds until a request would be admitted again
    #[schema(example = 1)]
    pub retry_after: u64,
}
