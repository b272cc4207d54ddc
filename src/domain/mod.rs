//! Domain layer containing core business types, traits, search rules and errors.

pub mod error;
pub mod search;
pub mod traits;
pub mod types;

pub use error::{AppError, DatabaseError, ValidationError, WithdrawalError};
pub use search::{
    AccountMatch, LookupPlan, MatchStrategy, MatchStrength, OrderMatch, PAGE_SIZE, Page,
    RankingPolicy, SearchQuery, TextQuery, WithdrawalMatch,
};
pub use traits::{ApprovalTransaction, Datastore};
pub use types::{
    Account, ApprovalReceipt, ErrorDetail, ErrorResponse, HealthResponse, HealthStatus,
    OrderView, PromotionalOrder, RateLimitResponse, SearchParams, SearchResponse,
    WithdrawalRequest, WithdrawalStatus, WithdrawalView,
};
