//! Unified ranked search across accounts, withdrawals and promotional orders.

use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::domain::{
    AccountMatch, Datastore, MatchStrategy, OrderMatch, PAGE_SIZE, Page, SearchQuery,
    SearchResponse, WithdrawalMatch,
};

/// Runs one query against all three entity lookups and assembles the envelope.
pub struct SearchAggregator {
    db_client: Arc<dyn Datastore>,
}

impl SearchAggregator {
    #[must_use]
    pub fn new(db_client: Arc<dyn Datastore>) -> Self {
        Self { db_client }
    }

    /// Search with a raw term and a 1-based page number.
    ///
    /// Never fails: a lookup error is logged and yields an empty envelope with
    /// `failed` set, so no partial result ever reaches the caller.
    #[instrument(skip(self), fields(page = page))]
    pub async fn search(&self, term: &str, page: u32) -> SearchResponse {
        let term = term.trim();
        let page = Page::new(page);

        let Some(query) = SearchQuery::classify(term) else {
            debug!(query = %term, "Nothing to match, skipping datastore");
            return SearchResponse::empty(term, page.number(), PAGE_SIZE);
        };

        let accounts_plan = AccountMatch.plan(&query, page);
        let withdrawals_plan = WithdrawalMatch.plan(&query, page);
        let orders_plan = OrderMatch.plan(&query, page);

        let lookups = tokio::try_join!(
            self.db_client.search_accounts(&accounts_plan),
            self.db_client.search_withdrawals(&withdrawals_plan),
            self.db_client.search_orders(&orders_plan),
        );

        match lookups {
            Ok((accounts, withdrawals, orders)) => {
                info!(
                    query = %term,
                    numeric = query.is_numeric(),
                    accounts = accounts.len(),
                    withdrawals = withdrawals.len(),
                    orders = orders.len(),
                    "Search completed"
                );
                SearchResponse {
                    accounts,
                    withdrawals,
                    orders,
                    ..SearchResponse::empty(term, page.number(), PAGE_SIZE)
                }
            }
            Err(e) => {
                error!(query = %term, page = page.number(), error = %e, "Search lookup failed");
                SearchResponse::failed(term, page.number(), PAGE_SIZE)
            }
        }
    }
}
