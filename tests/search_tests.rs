//! Unified search against the in-memory datastore.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use ops_backend::app::AppService;
use ops_backend::domain::{Account, PAGE_SIZE, PromotionalOrder, WithdrawalRequest};
use ops_backend::test_utils::MockDatastore;

fn service(db: &Arc<MockDatastore>) -> AppService {
    AppService::new(Arc::clone(db) as _)
}

fn account_ids(response: &ops_backend::domain::SearchResponse) -> Vec<i64> {
    response.accounts.iter().map(|a| a.id).collect()
}

#[tokio::test]
async fn test_empty_term_skips_datastore() {
    let db = Arc::new(MockDatastore::new());
    let service = service(&db);

    for term in ["", "   ", "\t\n"] {
        let response = service.search(term, 1).await;
        assert!(response.accounts.is_empty());
        assert!(response.withdrawals.is_empty());
        assert!(response.orders.is_empty());
        assert!(!response.failed);
        assert_eq!(response.query, "");
    }
    assert_eq!(db.call_count(), 0);
}

#[tokio::test]
async fn test_overflowing_number_skips_datastore() {
    let db = Arc::new(MockDatastore::new());
    let response = service(&db).search("99999999999999999999999", 1).await;
    assert!(response.accounts.is_empty());
    assert!(!response.failed);
    assert_eq!(db.call_count(), 0);
}

#[tokio::test]
async fn test_numeric_term_matches_identifiers_exactly() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1024, "alice", dec!(10)));
    db.insert_account(Account::new(10240, "carol", dec!(10)));
    db.insert_account(Account::new(7, "user1024", dec!(10)));
    db.insert_withdrawal(WithdrawalRequest::new(1, 1024, dec!(5), "bank_transfer"));
    db.insert_withdrawal(WithdrawalRequest::new(1024, 7, dec!(5), "crypto"));
    db.insert_withdrawal(WithdrawalRequest::new(3, 7, dec!(5), "crypto"));
    db.insert_order(PromotionalOrder::new(1, 7, 1024));
    db.insert_order(PromotionalOrder::new(2, 1024, 55));
    db.insert_order(PromotionalOrder::new(1024, 7, 9));
    db.insert_order(PromotionalOrder::new(4, 7, 10));

    let response = service(&db).search("1024", 1).await;

    assert_eq!(account_ids(&response), vec![1024]);

    let mut withdrawal_ids: Vec<i64> = response.withdrawals.iter().map(|w| w.id).collect();
    withdrawal_ids.sort_unstable();
    assert_eq!(withdrawal_ids, vec![1, 1024]);

    let mut order_ids: Vec<i64> = response.orders.iter().map(|o| o.id).collect();
    order_ids.sort_unstable();
    assert_eq!(order_ids, vec![1, 2, 1024]);
    assert!(response.deposits.is_empty());
}

#[tokio::test]
async fn test_prefix_matches_rank_above_substring_matches() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "alice", dec!(0)));
    db.insert_account(Account::new(2, "malice", dec!(0)));
    db.insert_account(Account::new(3, "alicia", dec!(0)));
    db.insert_account(Account::new(4, "bob", dec!(0)));

    let response = service(&db).search("ali", 1).await;

    assert_eq!(account_ids(&response), vec![3, 1, 2]);
}

#[tokio::test]
async fn test_textual_match_ignores_case() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "Alice", dec!(0)));

    let response = service(&db).search("  aLiCe ", 1).await;

    assert_eq!(response.query, "aLiCe");
    assert_eq!(account_ids(&response), vec![1]);
}

#[tokio::test]
async fn test_account_tiers_prefix_contains_then_other_fields() {
    let db = Arc::new(MockDatastore::new());
    let mut by_email = Account::new(1, "zed", dec!(0));
    by_email.email = Some("kim@example.com".to_string());
    let mut by_phone = Account::new(2, "yan", dec!(0));
    by_phone.phone_number = Some("+1555kim".to_string());
    db.insert_account(by_email);
    db.insert_account(by_phone);
    db.insert_account(Account::new(3, "kimberly", dec!(0)));
    db.insert_account(Account::new(4, "joakim", dec!(0)));

    let response = service(&db).search("kim", 1).await;

    // Username prefix, then username substring, then the rest by id descending
    assert_eq!(account_ids(&response), vec![3, 4, 2, 1]);
}

#[tokio::test]
async fn test_wildcards_in_term_match_literally() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "user500", dec!(0)));
    db.insert_account(Account::new(2, "deal_50%", dec!(0)));

    let response = service(&db).search("50%", 1).await;
    assert_eq!(account_ids(&response), vec![2]);

    let response = service(&db).search("_", 1).await;
    assert_eq!(account_ids(&response), vec![2]);
}

#[tokio::test]
async fn test_withdrawals_rank_by_best_field_then_recency() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "crane", dec!(0)));
    db.insert_account(Account::new(2, "macro", dec!(0)));
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let mut newest_contains = WithdrawalRequest::new(10, 2, dec!(1), "bank_transfer");
    newest_contains.created_at = base + Duration::hours(3);
    let mut prefix_by_method = WithdrawalRequest::new(11, 2, dec!(1), "crypto");
    prefix_by_method.created_at = base + Duration::hours(1);
    let mut prefix_by_name = WithdrawalRequest::new(12, 1, dec!(1), "bank_transfer");
    prefix_by_name.created_at = base + Duration::hours(2);
    let mut orphan = WithdrawalRequest::new(13, 99, dec!(1), "bank_transfer");
    orphan.created_at = base;
    for w in [newest_contains, prefix_by_method, prefix_by_name, orphan] {
        db.insert_withdrawal(w);
    }

    let response = service(&db).search("cr", 1).await;
    let ids: Vec<i64> = response.withdrawals.iter().map(|w| w.id).collect();

    assert_eq!(ids, vec![12, 11, 10]);
    assert_eq!(response.withdrawals[0].username.as_deref(), Some("crane"));
}

#[tokio::test]
async fn test_withdrawal_without_account_is_found_by_number() {
    let db = Arc::new(MockDatastore::new());
    db.insert_withdrawal(WithdrawalRequest::new(13, 99, dec!(1), "bank_transfer"));

    let response = service(&db).search("13", 1).await;

    assert_eq!(response.withdrawals.len(), 1);
    assert_eq!(response.withdrawals[0].username, None);
}

#[tokio::test]
async fn test_orders_match_owner_and_skip_orphans() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "dana", dec!(0)));
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let mut older = PromotionalOrder::new(1, 1, 100);
    older.created_at = base;
    let mut newer = PromotionalOrder::new(2, 1, 101);
    newer.created_at = base + Duration::minutes(5);
    let orphan = PromotionalOrder::new(3, 77, 102);
    for o in [older, newer, orphan] {
        db.insert_order(o);
    }

    let response = service(&db).search("dan", 1).await;
    let ids: Vec<i64> = response.orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert!(response.orders.iter().all(|o| o.username == "dana"));

    let response = service(&db).search("102", 1).await;
    assert!(response.orders.is_empty());
}

#[tokio::test]
async fn test_pages_are_fixed_size_and_offset() {
    let db = Arc::new(MockDatastore::new());
    for id in 1..=120 {
        db.insert_account(Account::new(id, format!("user{id}"), dec!(0)));
    }
    let service = service(&db);

    let first = service.search("user", 1).await;
    assert_eq!(first.accounts.len(), PAGE_SIZE as usize);
    assert_eq!(first.accounts[0].id, 120);

    let second = service.search("user", 2).await;
    assert_eq!(second.page, 2);
    assert_eq!(account_ids(&second), (21..=70).rev().collect::<Vec<_>>());

    let third = service.search("user", 3).await;
    assert_eq!(account_ids(&third), (1..=20).rev().collect::<Vec<_>>());

    let past_end = service.search("user", 4).await;
    assert!(past_end.accounts.is_empty());
    assert!(!past_end.failed);
}

#[tokio::test]
async fn test_page_zero_is_treated_as_first_page() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "erin", dec!(0)));

    let response = service(&db).search("erin", 0).await;
    assert_eq!(response.page, 1);
    assert_eq!(account_ids(&response), vec![1]);
}

#[tokio::test]
async fn test_lookup_failure_yields_failed_envelope() {
    let db = Arc::new(MockDatastore::failing("statement timeout"));

    let response = service(&db).search("alice", 1).await;

    assert!(response.failed);
    assert!(response.accounts.is_empty());
    assert!(response.withdrawals.is_empty());
    assert!(response.orders.is_empty());
    assert!(response.deposits.is_empty());
}

#[tokio::test]
async fn test_single_lookup_failure_discards_sibling_results() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(1, "alice", dec!(0)));
    db.insert_withdrawal(WithdrawalRequest::new(1, 1, dec!(5), "bank_transfer"));
    db.insert_order(PromotionalOrder::new(1, 1, 100));
    let service = service(&db);

    let healthy = service.search("alice", 1).await;
    assert_eq!(account_ids(&healthy), vec![1]);
    assert_eq!(healthy.orders.len(), 1);

    db.set_fail_withdrawal_search(true);
    let response = service.search("alice", 1).await;

    assert!(response.failed);
    assert!(response.accounts.is_empty());
    assert!(response.withdrawals.is_empty());
    assert!(response.orders.is_empty());
    assert_eq!(response.query, "alice");
}

#[tokio::test]
async fn test_numeric_term_still_ranks_by_username_digits() {
    let db = Arc::new(MockDatastore::new());
    db.insert_account(Account::new(5, "user12", dec!(0)));
    db.insert_account(Account::new(12, "bob", dec!(0)));
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let mut by_id = WithdrawalRequest::new(12, 5, dec!(1), "bank_transfer");
    by_id.created_at = base;
    let mut by_owner = WithdrawalRequest::new(40, 12, dec!(1), "bank_transfer");
    by_owner.created_at = base + Duration::hours(1);
    db.insert_withdrawal(by_id);
    db.insert_withdrawal(by_owner);

    let response = service(&db).search("12", 1).await;
    let ids: Vec<i64> = response.withdrawals.iter().map(|w| w.id).collect();

    assert_eq!(ids, vec![12, 40]);
}
