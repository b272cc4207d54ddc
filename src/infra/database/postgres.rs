//! PostgreSQL datastore implementation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::search::{Column, OrderKey, Predicate, TextQuery};
use crate::domain::{
    Account, AppError, ApprovalTransaction, Datastore, DatabaseError, LookupPlan, OrderView,
    WithdrawalRequest, WithdrawalStatus, WithdrawalView,
};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Server-side cap on every statement, applied per connection
    pub statement_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            statement_timeout: Duration::from_millis(5000),
        }
    }
}

impl PostgresConfig {
    /// Read pool settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_connections);

        let acquire_timeout = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        let statement_timeout = env::var("DB_STATEMENT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.statement_timeout);

        Self {
            max_connections,
            min_connections,
            acquire_timeout,
            statement_timeout,
            ..defaults
        }
    }
}

const ACCOUNT_SELECT: &str = r#"
    SELECT a.id, a.username, a.email, a.phone_number, COALESCE(a.balance, 0) AS balance,
           a.vip_status, a.credit_score, a.created_at
    FROM accounts a"#;

const WITHDRAWAL_VIEW_SELECT: &str = r#"
    SELECT w.id, w.account_id, a.username, w.amount, w.method, w.status,
           w.holder_name, w.phone_number, w.crypto_address, w.created_at
    FROM withdrawal_requests w
    LEFT JOIN accounts a ON a.id = w.account_id"#;

const ORDER_VIEW_SELECT: &str = r#"
    SELECT o.id, o.account_id, a.username, o.order_number, o.is_claimed, o.created_at
    FROM promotional_orders o
    JOIN accounts a ON a.id = o.account_id"#;

const WITHDRAWAL_COLUMNS: &str = "id, account_id, amount, method, holder_name, phone_number, \
                                  crypto_address, status, created_at";

/// PostgreSQL datastore with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let statement_timeout_ms = config.statement_timeout.as_millis();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    let stmt = format!("SET statement_timeout = {statement_timeout_ms}");
                    sqlx::query(&stmt).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!(statement_timeout_ms = %statement_timeout_ms, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_account(row: &PgRow) -> Result<Account, AppError> {
        Ok(Account {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            phone_number: row.try_get("phone_number")?,
            balance: row.try_get("balance")?,
            vip_status: row.try_get("vip_status")?,
            credit_score: row.try_get("credit_score")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_withdrawal(row: &PgRow) -> Result<WithdrawalRequest, AppError> {
        Ok(WithdrawalRequest {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            amount: row.try_get("amount")?,
            method: row.try_get("method")?,
            holder_name: row.try_get("holder_name")?,
            phone_number: row.try_get("phone_number")?,
            crypto_address: row.try_get("crypto_address")?,
            status: parse_status(row)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_withdrawal_view(row: &PgRow) -> Result<WithdrawalView, AppError> {
        Ok(WithdrawalView {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            username: row.try_get("username")?,
            amount: row.try_get("amount")?,
            method: row.try_get("method")?,
            status: parse_status(row)?,
            holder_name: row.try_get("holder_name")?,
            phone_number: row.try_get("phone_number")?,
            crypto_address: row.try_get("crypto_address")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order_view(row: &PgRow) -> Result<OrderView, AppError> {
        Ok(OrderView {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            username: row.try_get("username")?,
            order_number: row.try_get("order_number")?,
            is_claimed: row.try_get("is_claimed")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn fetch_plan<T>(
        &self,
        select: &str,
        plan: &LookupPlan,
        map: fn(&PgRow) -> Result<T, AppError>,
    ) -> Result<Vec<T>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(select);
        push_plan(&mut qb, plan);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(map).collect()
    }
}

fn parse_status(row: &PgRow) -> Result<WithdrawalStatus, AppError> {
    let status: String = row.try_get("status")?;
    status
        .parse()
        .map_err(|e: String| AppError::Database(DatabaseError::Query(e)))
}

/// Append `WHERE … ORDER BY … LIMIT … OFFSET …` for a lookup plan.
fn push_plan(qb: &mut QueryBuilder<'_, Postgres>, plan: &LookupPlan) {
    qb.push(" WHERE ");
    push_predicate(qb, &plan.predicate);

    if !plan.order.is_empty() {
        qb.push(" ORDER BY ");
        for (i, key) in plan.order.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            match key {
                OrderKey::Strength { columns, query } => push_strength(qb, columns, query),
                OrderKey::Column(column) => {
                    qb.push(column.sql());
                }
            }
            qb.push(" DESC");
        }
    }

    qb.push(" LIMIT ")
        .push_bind(plan.page.limit())
        .push(" OFFSET ")
        .push_bind(plan.page.offset());
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    qb.push("(");
    match predicate {
        Predicate::AnyEquals { columns, value } => {
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(column.sql()).push(" = ").push_bind(*value);
            }
        }
        Predicate::AnyContains { columns, query } => {
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(column.sql())
                    .push(" ILIKE ")
                    .push_bind(query.contains_pattern().to_string());
            }
        }
    }
    qb.push(")");
}

/// `GREATEST(CASE WHEN col ILIKE prefix THEN 2 WHEN col ILIKE contains THEN 1 ELSE 0 END, …)`
fn push_strength(qb: &mut QueryBuilder<'_, Postgres>, columns: &[Column], query: &TextQuery) {
    qb.push("GREATEST(");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push("CASE WHEN ")
            .push(column.sql())
            .push(" ILIKE ")
            .push_bind(query.prefix_pattern().to_string())
            .push(" THEN 2 WHEN ")
            .push(column.sql())
            .push(" ILIKE ")
            .push_bind(query.contains_pattern().to_string())
            .push(" THEN 1 ELSE 0 END");
    }
    qb.push(")");
}

#[async_trait]
impl Datastore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self, plan))]
    async fn search_accounts(&self, plan: &LookupPlan) -> Result<Vec<Account>, AppError> {
        self.fetch_plan(ACCOUNT_SELECT, plan, Self::row_to_account)
            .await
    }

    #[instrument(skip(self, plan))]
    async fn search_withdrawals(&self, plan: &LookupPlan) -> Result<Vec<WithdrawalView>, AppError> {
        self.fetch_plan(WITHDRAWAL_VIEW_SELECT, plan, Self::row_to_withdrawal_view)
            .await
    }

    #[instrument(skip(self, plan))]
    async fn search_orders(&self, plan: &LookupPlan) -> Result<Vec<OrderView>, AppError> {
        self.fetch_plan(ORDER_VIEW_SELECT, plan, Self::row_to_order_view)
            .await
    }

    #[instrument(skip(self))]
    async fn get_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, AppError> {
        let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_withdrawal).transpose()
    }

    #[instrument(skip(self))]
    async fn reject_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, AppError> {
        let sql = format!(
            "UPDATE withdrawal_requests SET status = $1 WHERE id = $2 RETURNING {WITHDRAWAL_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(WithdrawalStatus::Rejected.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_withdrawal).transpose()
    }

    #[instrument(skip(self))]
    async fn begin_approval(&self) -> Result<Box<dyn ApprovalTransaction>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(DatabaseError::from(e)))?;
        Ok(Box::new(PostgresApprovalTransaction { tx }))
    }
}

/// Approval scope over a Postgres transaction. Reads use `FOR UPDATE`, always in
/// the order withdrawal row then account row. Dropping without commit rolls back.
pub struct PostgresApprovalTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ApprovalTransaction for PostgresApprovalTransaction {
    async fn lock_withdrawal(&mut self, id: i64) -> Result<Option<WithdrawalRequest>, AppError> {
        let sql = format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(PostgresClient::row_to_withdrawal).transpose()
    }

    async fn lock_balance(&mut self, account_id: i64) -> Result<Option<Decimal>, AppError> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(balance, 0) FROM accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(balance)
    }

    async fn debit(
        &mut self,
        account_id: i64,
        amount: Decimal,
    ) -> Result<Option<Decimal>, AppError> {
        let remaining = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE accounts
            SET balance = COALESCE(balance, 0) - $1
            WHERE id = $2 AND COALESCE(balance, 0) >= $1
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(remaining)
    }

    async fn transition_pending(
        &mut self,
        id: i64,
        status: WithdrawalStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE withdrawal_requests SET status = $1 WHERE id = $2 AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Transaction(e.to_string())))
    }
}
