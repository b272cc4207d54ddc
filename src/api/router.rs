//! Router construction, middleware and rate limiting.

use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    ApiDoc, approve_withdrawal_handler, get_withdrawal_handler, health_check_handler,
    liveness_handler, readiness_handler, reject_withdrawal_handler, search_handler,
};
use crate::app::AppState;
use crate::domain::{AppError, ErrorDetail, RateLimitResponse};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Global rate limit settings
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub burst_size: NonZeroU32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: NonZeroU32::new(50).unwrap_or(NonZeroU32::MIN),
            burst_size: NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl RateLimitConfig {
    /// Read `RATE_LIMIT_RPS` and `RATE_LIMIT_BURST`, ignoring zero or unparsable values
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            requests_per_second: env_non_zero("RATE_LIMIT_RPS")
                .unwrap_or(defaults.requests_per_second),
            burst_size: env_non_zero("RATE_LIMIT_BURST").unwrap_or(defaults.burst_size),
        }
    }

    fn quota(&self) -> Quota {
        Quota::per_second(self.requests_per_second).allow_burst(self.burst_size)
    }
}

fn env_non_zero(name: &str) -> Option<NonZeroU32> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .and_then(NonZeroU32::new)
}

/// Per-request deadline from `REQUEST_TIMEOUT_SECS` (default 10s)
#[must_use]
pub fn request_timeout() -> Duration {
    let secs = env::var("REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(search_handler))
        .route("/withdrawals/{id}", get(get_withdrawal_handler))
        .route("/withdrawals/{id}/approve", post(approve_withdrawal_handler))
        .route("/withdrawals/{id}/reject", post(reject_withdrawal_handler))
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
}

/// Create the router without rate limiting
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let router = api_routes()
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    with_outer_layers(router, request_timeout())
}

/// Create the router with a global token-bucket rate limiter in front of the API routes
pub fn create_router_with_rate_limit(app_state: Arc<AppState>, config: RateLimitConfig) -> Router {
    let limiter = Arc::new(RateLimiter::direct(config.quota()));

    let router = api_routes()
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit))
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    with_outer_layers(router, request_timeout())
}

/// Requests past the deadline are answered with 504, matching datastore timeouts
fn with_outer_layers(router: Router, timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

async fn rate_limit(
    State(limiter): State<Arc<GlobalLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait.as_secs().max(1);
            warn!(retry_after, path = %request.uri().path(), "Rate limit exceeded");
            let err = AppError::RateLimited;
            let (status, error_type) = err.classify();
            let body = RateLimitResponse {
                error: ErrorDetail {
                    r#type: error_type.to_string(),
                    message: err.to_string(),
                },
                retry_after,
            };
            (
                status,
                [("retry-after", retry_after.to_string())],
                Json(body),
            )
                .into_response()
        }
    }
}
