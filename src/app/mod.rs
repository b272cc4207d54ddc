//! Application layer containing business logic and shared state.

pub mod search;
pub mod service;
pub mod state;
pub mod withdrawal;

pub use search::SearchAggregator;
pub use service::AppService;
pub use state::AppState;
pub use withdrawal::WithdrawalWorkflow;
