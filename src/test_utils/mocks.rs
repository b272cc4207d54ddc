//! Mock implementations for testing.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    Account, AppError, ApprovalTransaction, Datastore, DatabaseError, LookupPlan, OrderView,
    PromotionalOrder, WithdrawalRequest, WithdrawalStatus, WithdrawalView,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    withdrawals: BTreeMap<i64, WithdrawalRequest>,
    orders: BTreeMap<i64, PromotionalOrder>,
}

/// In-memory datastore for testing.
///
/// Approval transactions and rejections are serialized through one async lock,
/// standing in for the row locks a real datastore would take.
pub struct MockDatastore {
    tables: Arc<Mutex<Tables>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    config: MockConfig,
    is_healthy: AtomicBool,
    fail_commits: Arc<AtomicBool>,
    fail_withdrawal_search: AtomicBool,
    calls: AtomicUsize,
    applied_debits: Arc<AtomicUsize>,
}

impl MockDatastore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            config,
            is_healthy: AtomicBool::new(true),
            fail_commits: Arc::new(AtomicBool::new(false)),
            fail_withdrawal_search: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            applied_debits: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Make every approval commit fail, discarding its staged writes
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::Relaxed);
    }

    /// Fail only the withdrawal lookup; the other lookups keep working
    pub fn set_fail_withdrawal_search(&self, fail: bool) {
        self.fail_withdrawal_search.store(fail, Ordering::Relaxed);
    }

    /// Number of datastore calls made through the trait
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of debits that reached committed state
    pub fn applied_debits(&self) -> usize {
        self.applied_debits.load(Ordering::SeqCst)
    }

    pub fn insert_account(&self, account: Account) {
        self.tables
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account);
    }

    pub fn insert_withdrawal(&self, withdrawal: WithdrawalRequest) {
        self.tables
            .lock()
            .unwrap()
            .withdrawals
            .insert(withdrawal.id, withdrawal);
    }

    pub fn insert_order(&self, order: PromotionalOrder) {
        self.tables.lock().unwrap().orders.insert(order.id, order);
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.tables.lock().unwrap().accounts.get(&id).cloned()
    }

    pub fn withdrawal(&self, id: i64) -> Option<WithdrawalRequest> {
        self.tables.lock().unwrap().withdrawals.get(&id).cloned()
    }

    fn record_call(&self) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(())
    }
}

impl Default for MockDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MockDatastore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.record_call()
    }

    async fn search_accounts(&self, plan: &LookupPlan) -> Result<Vec<Account>, AppError> {
        self.record_call()?;
        let tables = self.tables.lock().unwrap();
        Ok(plan.apply(tables.accounts.values()))
    }

    async fn search_withdrawals(&self, plan: &LookupPlan) -> Result<Vec<WithdrawalView>, AppError> {
        self.record_call()?;
        if self.fail_withdrawal_search.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Timeout(
                "withdrawal lookup".to_string(),
            )));
        }
        let tables = self.tables.lock().unwrap();
        let views: Vec<WithdrawalView> = tables
            .withdrawals
            .values()
            .map(|w| {
                let username = tables.accounts.get(&w.account_id).map(|a| a.username.clone());
                WithdrawalView::from_request(w, username)
            })
            .collect();
        Ok(plan.apply(&views))
    }

    async fn search_orders(&self, plan: &LookupPlan) -> Result<Vec<OrderView>, AppError> {
        self.record_call()?;
        let tables = self.tables.lock().unwrap();
        // Inner join: orders without an owning account are invisible
        let views: Vec<OrderView> = tables
            .orders
            .values()
            .filter_map(|o| {
                tables.accounts.get(&o.account_id).map(|a| OrderView {
                    id: o.id,
                    account_id: o.account_id,
                    username: a.username.clone(),
                    order_number: o.order_number,
                    is_claimed: o.is_claimed,
                    created_at: o.created_at,
                })
            })
            .collect();
        Ok(plan.apply(&views))
    }

    async fn get_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, AppError> {
        self.record_call()?;
        Ok(self.withdrawal(id))
    }

    async fn reject_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, AppError> {
        self.record_call()?;
        let _guard = self.write_lock.lock().await;
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.withdrawals.get_mut(&id).map(|w| {
            w.status = WithdrawalStatus::Rejected;
            w.clone()
        }))
    }

    async fn begin_approval(&self) -> Result<Box<dyn ApprovalTransaction>, AppError> {
        self.record_call()?;
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        Ok(Box::new(MockApprovalTransaction {
            tables: Arc::clone(&self.tables),
            _guard: guard,
            balances: HashMap::new(),
            statuses: HashMap::new(),
            debits: 0,
            fail_commit: self.fail_commits.load(Ordering::Relaxed),
            applied_debits: Arc::clone(&self.applied_debits),
        }))
    }
}

/// Stages writes until commit; dropping it discards them.
struct MockApprovalTransaction {
    tables: Arc<Mutex<Tables>>,
    _guard: OwnedMutexGuard<()>,
    balances: HashMap<i64, Decimal>,
    statuses: HashMap<i64, WithdrawalStatus>,
    debits: usize,
    fail_commit: bool,
    applied_debits: Arc<AtomicUsize>,
}

impl MockApprovalTransaction {
    fn current_balance(&self, account_id: i64) -> Option<Decimal> {
        if let Some(staged) = self.balances.get(&account_id) {
            return Some(*staged);
        }
        self.tables
            .lock()
            .unwrap()
            .accounts
            .get(&account_id)
            .map(|a| a.balance)
    }
}

#[async_trait]
impl ApprovalTransaction for MockApprovalTransaction {
    async fn lock_withdrawal(&mut self, id: i64) -> Result<Option<WithdrawalRequest>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.withdrawals.get(&id).cloned().map(|mut w| {
            if let Some(status) = self.statuses.get(&id) {
                w.status = *status;
            }
            w
        }))
    }

    async fn lock_balance(&mut self, account_id: i64) -> Result<Option<Decimal>, AppError> {
        Ok(self.current_balance(account_id))
    }

    async fn debit(
        &mut self,
        account_id: i64,
        amount: Decimal,
    ) -> Result<Option<Decimal>, AppError> {
        match self.current_balance(account_id) {
            Some(balance) if balance >= amount => {
                let remaining = balance - amount;
                self.balances.insert(account_id, remaining);
                self.debits += 1;
                Ok(Some(remaining))
            }
            _ => Ok(None),
        }
    }

    async fn transition_pending(
        &mut self,
        id: i64,
        status: WithdrawalStatus,
    ) -> Result<bool, AppError> {
        let current = match self.statuses.get(&id) {
            Some(staged) => Some(*staged),
            None => self
                .tables
                .lock()
                .unwrap()
                .withdrawals
                .get(&id)
                .map(|w| w.status),
        };
        if current == Some(WithdrawalStatus::Pending) {
            self.statuses.insert(id, status);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        if self.fail_commit {
            return Err(AppError::Database(DatabaseError::Transaction(
                "Mock commit failure".to_string(),
            )));
        }
        let mut tables = self.tables.lock().unwrap();
        for (account_id, balance) in &self.balances {
            if let Some(account) = tables.accounts.get_mut(account_id) {
                account.balance = *balance;
            }
        }
        for (id, status) in &self.statuses {
            if let Some(withdrawal) = tables.withdrawals.get_mut(id) {
                withdrawal.status = *status;
            }
        }
        self.applied_debits.fetch_add(self.debits, Ordering::SeqCst);
        Ok(())
    }
}
