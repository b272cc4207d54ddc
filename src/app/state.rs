//! Application state management.

use std::sync::Arc;

use crate::domain::Datastore;

use super::service::AppService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
    pub db_client: Arc<dyn Datastore>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(db_client: Arc<dyn Datastore>) -> Self {
        let service = Arc::new(AppService::new(Arc::clone(&db_client)));
        Self { service, db_client }
    }
}
