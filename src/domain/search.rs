//! Query classification, per-entity match strategies and ranking policies.
//!
//! A strategy turns a [`SearchQuery`] into a [`LookupPlan`]: a predicate plus an
//! ordering. The Postgres adapter renders the plan to SQL; [`LookupPlan::apply`]
//! evaluates the same plan over in-memory rows, so both backends rank identically.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::types::{Account, OrderView, WithdrawalView};

/// Rows per page for every entity lookup
pub const PAGE_SIZE: u32 = 50;

/// A classified, non-empty search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// All-digit term: identifier equality. The digits still drive ranking tiers.
    Numeric { value: i64, text: TextQuery },
    /// Anything else: case-insensitive pattern matching
    Text(TextQuery),
}

impl SearchQuery {
    /// Classify a raw term. Returns `None` when nothing can match: an empty or
    /// whitespace-only term, or an all-digit term too large for any identifier.
    #[must_use]
    pub fn classify(raw: &str) -> Option<Self> {
        let term = raw.trim();
        if term.is_empty() {
            return None;
        }
        if term.bytes().all(|b| b.is_ascii_digit()) {
            return term
                .parse::<i64>()
                .ok()
                .map(|value| Self::Numeric {
                    value,
                    text: TextQuery::new(term),
                });
        }
        Some(Self::Text(TextQuery::new(term)))
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric { .. })
    }

    /// The trimmed term as a pattern query, whatever the mode
    #[must_use]
    pub fn text(&self) -> &TextQuery {
        match self {
            Self::Numeric { text, .. } | Self::Text(text) => text,
        }
    }
}

/// Textual query with its derived LIKE patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    term: String,
    folded: String,
    prefix_pattern: String,
    contains_pattern: String,
}

impl TextQuery {
    #[must_use]
    pub fn new(term: &str) -> Self {
        let escaped = escape_like(term);
        Self {
            term: term.to_string(),
            folded: term.to_lowercase(),
            prefix_pattern: format!("{escaped}%"),
            contains_pattern: format!("%{escaped}%"),
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// `term%` with LIKE metacharacters escaped
    pub fn prefix_pattern(&self) -> &str {
        &self.prefix_pattern
    }

    /// `%term%` with LIKE metacharacters escaped
    pub fn contains_pattern(&self) -> &str {
        &self.contains_pattern
    }

    /// How strongly `value` matches the term, ignoring case.
    #[must_use]
    pub fn strength(&self, value: Option<&str>) -> MatchStrength {
        let Some(value) = value else {
            return MatchStrength::None;
        };
        let value = value.to_lowercase();
        if value.starts_with(&self.folded) {
            MatchStrength::Prefix
        } else if value.contains(&self.folded) {
            MatchStrength::Contains
        } else {
            MatchStrength::None
        }
    }
}

/// Backslash-escape `%`, `_` and `\` so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Per-field match tier. Ordered so that `Prefix > Contains > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStrength {
    None = 0,
    Contains = 1,
    Prefix = 2,
}

impl MatchStrength {
    pub fn score(self) -> i32 {
        self as i32
    }
}

/// 1-based page of a single entity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
}

impl Page {
    /// Pages below 1 are clamped to 1.
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number: number.max(1),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn limit(&self) -> i64 {
        i64::from(PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(PAGE_SIZE)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Searchable columns. Each maps to one qualified SQL column under the aliases
/// `a` (accounts), `w` (withdrawal_requests) and `o` (promotional_orders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    AccountId,
    Username,
    Email,
    Phone,
    AccountCreatedAt,
    WithdrawalId,
    WithdrawalOwner,
    Method,
    WithdrawalCreatedAt,
    OrderId,
    OrderOwner,
    OrderNumber,
    OrderCreatedAt,
}

impl Column {
    pub fn sql(self) -> &'static str {
        match self {
            Self::AccountId => "a.id",
            Self::Username => "a.username",
            Self::Email => "a.email",
            Self::Phone => "a.phone_number",
            Self::AccountCreatedAt => "a.created_at",
            Self::WithdrawalId => "w.id",
            Self::WithdrawalOwner => "w.account_id",
            Self::Method => "w.method",
            Self::WithdrawalCreatedAt => "w.created_at",
            Self::OrderId => "o.id",
            Self::OrderOwner => "o.account_id",
            Self::OrderNumber => "o.order_number",
            Self::OrderCreatedAt => "o.created_at",
        }
    }
}

/// Value of a column in an in-memory row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Int(i64),
    Text(Option<&'a str>),
    Time(DateTime<Utc>),
}

/// Row types a [`LookupPlan`] can be evaluated against.
pub trait Searchable {
    fn value(&self, column: Column) -> Value<'_>;
}

impl Searchable for Account {
    fn value(&self, column: Column) -> Value<'_> {
        match column {
            Column::AccountId => Value::Int(self.id),
            Column::Username => Value::Text(Some(&self.username)),
            Column::Email => Value::Text(self.email.as_deref()),
            Column::Phone => Value::Text(self.phone_number.as_deref()),
            Column::AccountCreatedAt => Value::Time(self.created_at),
            _ => Value::Text(None),
        }
    }
}

impl Searchable for WithdrawalView {
    fn value(&self, column: Column) -> Value<'_> {
        match column {
            Column::WithdrawalId => Value::Int(self.id),
            Column::WithdrawalOwner => Value::Int(self.account_id),
            Column::Username => Value::Text(self.username.as_deref()),
            Column::Method => Value::Text(Some(&self.method)),
            Column::WithdrawalCreatedAt => Value::Time(self.created_at),
            _ => Value::Text(None),
        }
    }
}

impl Searchable for OrderView {
    fn value(&self, column: Column) -> Value<'_> {
        match column {
            Column::OrderId => Value::Int(self.id),
            Column::OrderOwner => Value::Int(self.account_id),
            Column::OrderNumber => Value::Int(self.order_number),
            Column::Username => Value::Text(Some(&self.username)),
            Column::OrderCreatedAt => Value::Time(self.created_at),
            _ => Value::Text(None),
        }
    }
}

/// Row filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// At least one column equals `value`
    AnyEquals {
        columns: &'static [Column],
        value: i64,
    },
    /// At least one column contains the term, case-insensitively
    AnyContains {
        columns: &'static [Column],
        query: TextQuery,
    },
}

impl Predicate {
    pub fn matches<R: Searchable>(&self, row: &R) -> bool {
        match self {
            Self::AnyEquals { columns, value } => columns
                .iter()
                .any(|c| matches!(row.value(*c), Value::Int(v) if v == *value)),
            Self::AnyContains { columns, query } => columns.iter().any(|c| match row.value(*c) {
                Value::Text(text) => query.strength(text) != MatchStrength::None,
                _ => false,
            }),
        }
    }
}

/// One key of the ordering, all descending
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    /// Greatest [`MatchStrength`] across the columns
    Strength {
        columns: &'static [Column],
        query: TextQuery,
    },
    /// Raw column value
    Column(Column),
}

impl OrderKey {
    fn compare_desc<R: Searchable>(&self, a: &R, b: &R) -> Ordering {
        match self {
            Self::Strength { columns, query } => {
                let strength = |row: &R| {
                    columns
                        .iter()
                        .map(|c| match row.value(*c) {
                            Value::Text(text) => query.strength(text),
                            _ => MatchStrength::None,
                        })
                        .max()
                        .unwrap_or(MatchStrength::None)
                };
                strength(b).cmp(&strength(a))
            }
            Self::Column(column) => match (a.value(*column), b.value(*column)) {
                (Value::Int(x), Value::Int(y)) => y.cmp(&x),
                (Value::Time(x), Value::Time(y)) => y.cmp(&x),
                (Value::Text(x), Value::Text(y)) => y.cmp(&x),
                _ => Ordering::Equal,
            },
        }
    }
}

/// Combines per-field match scores into an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingPolicy {
    /// Columns whose best match tier leads the ordering (empty: no tiers)
    pub scored: &'static [Column],
    /// Applied after the tier, in order, all descending
    pub tie_breaks: &'static [Column],
}

impl RankingPolicy {
    /// Tiers are scored against the raw term in both modes, so a numeric search
    /// still ranks a username containing the digits above one that does not.
    #[must_use]
    pub fn order_keys(&self, query: &SearchQuery) -> Vec<OrderKey> {
        let mut keys = Vec::with_capacity(self.tie_breaks.len() + 1);
        if !self.scored.is_empty() {
            keys.push(OrderKey::Strength {
                columns: self.scored,
                query: query.text().clone(),
            });
        }
        keys.extend(self.tie_breaks.iter().copied().map(OrderKey::Column));
        keys
    }
}

/// Fully resolved lookup for one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPlan {
    pub predicate: Predicate,
    pub order: Vec<OrderKey>,
    pub page: Page,
}

impl LookupPlan {
    /// Filter, rank and paginate in-memory rows exactly as the SQL rendering would.
    pub fn apply<'a, R, I>(&self, rows: I) -> Vec<R>
    where
        R: Searchable + Clone + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut matched: Vec<&R> = rows
            .into_iter()
            .filter(|row| self.predicate.matches(*row))
            .collect();
        matched.sort_by(|a, b| {
            self.order
                .iter()
                .map(|key| key.compare_desc(*a, *b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        matched
            .into_iter()
            .skip(self.page.offset() as usize)
            .take(self.page.limit() as usize)
            .cloned()
            .collect()
    }
}

/// Per-entity rule for turning a query into a [`LookupPlan`].
pub trait MatchStrategy {
    /// Row type returned by the lookup
    type Row: Searchable;

    fn predicate(&self, query: &SearchQuery) -> Predicate;

    fn ranking(&self) -> RankingPolicy;

    fn plan(&self, query: &SearchQuery, page: Page) -> LookupPlan {
        LookupPlan {
            predicate: self.predicate(query),
            order: self.ranking().order_keys(query),
            page,
        }
    }
}

/// Accounts: id equality, or username/email/phone contains; username tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountMatch;

impl MatchStrategy for AccountMatch {
    type Row = Account;

    fn predicate(&self, query: &SearchQuery) -> Predicate {
        match query {
            SearchQuery::Numeric { value, .. } => Predicate::AnyEquals {
                columns: &[Column::AccountId],
                value: *value,
            },
            SearchQuery::Text(text) => Predicate::AnyContains {
                columns: &[Column::Username, Column::Email, Column::Phone],
                query: text.clone(),
            },
        }
    }

    fn ranking(&self) -> RankingPolicy {
        RankingPolicy {
            scored: &[Column::Username],
            tie_breaks: &[Column::AccountId],
        }
    }
}

/// Withdrawals: id or owner equality, or owner username/method contains;
/// best tier of username and method.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithdrawalMatch;

impl MatchStrategy for WithdrawalMatch {
    type Row = WithdrawalView;

    fn predicate(&self, query: &SearchQuery) -> Predicate {
        match query {
            SearchQuery::Numeric { value, .. } => Predicate::AnyEquals {
                columns: &[Column::WithdrawalId, Column::WithdrawalOwner],
                value: *value,
            },
            SearchQuery::Text(text) => Predicate::AnyContains {
                columns: &[Column::Username, Column::Method],
                query: text.clone(),
            },
        }
    }

    fn ranking(&self) -> RankingPolicy {
        RankingPolicy {
            scored: &[Column::Username, Column::Method],
            tie_breaks: &[Column::WithdrawalCreatedAt, Column::WithdrawalId],
        }
    }
}

/// Promotional orders: id, owner or order number equality, or owner username
/// contains. Newest first, no tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderMatch;

impl MatchStrategy for OrderMatch {
    type Row = OrderView;

    fn predicate(&self, query: &SearchQuery) -> Predicate {
        match query {
            SearchQuery::Numeric { value, .. } => Predicate::AnyEquals {
                columns: &[Column::OrderId, Column::OrderOwner, Column::OrderNumber],
                value: *value,
            },
            SearchQuery::Text(text) => Predicate::AnyContains {
                columns: &[Column::Username],
                query: text.clone(),
            },
        }
    }

    fn ranking(&self) -> RankingPolicy {
        RankingPolicy {
            scored: &[],
            tie_breaks: &[Column::OrderCreatedAt, Column::OrderId],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn account(id: i64, username: &str, email: Option<&str>) -> Account {
        let mut a = Account::new(id, username, Decimal::ZERO);
        a.email = email.map(str::to_string);
        a
    }

    fn text(term: &str) -> SearchQuery {
        SearchQuery::classify(term).unwrap()
    }

    fn withdrawal(
        id: i64,
        account_id: i64,
        username: &str,
        created_at: DateTime<Utc>,
    ) -> WithdrawalView {
        WithdrawalView {
            id,
            account_id,
            username: Some(username.to_string()),
            amount: Decimal::ONE,
            method: "bank".to_string(),
            status: Default::default(),
            holder_name: None,
            phone_number: None,
            crypto_address: None,
            created_at,
        }
    }

    #[test]
    fn test_classify_empty_and_whitespace() {
        assert_eq!(SearchQuery::classify(""), None);
        assert_eq!(SearchQuery::classify("   \t "), None);
    }

    #[test]
    fn test_classify_numeric() {
        assert_eq!(
            SearchQuery::classify(" 0042 "),
            Some(SearchQuery::Numeric {
                value: 42,
                text: TextQuery::new("0042")
            })
        );
        // Beyond any identifier
        assert_eq!(SearchQuery::classify("99999999999999999999999"), None);
    }

    #[test]
    fn test_classify_mixed_is_text() {
        for term in ["12a", "-5", "1.5", "+7", "alice"] {
            assert!(
                matches!(SearchQuery::classify(term), Some(SearchQuery::Text(_))),
                "{term} should be textual"
            );
        }
    }

    #[test]
    fn test_like_patterns_escape_metacharacters() {
        let q = TextQuery::new("50%_off\\");
        assert_eq!(q.prefix_pattern(), "50\\%\\_off\\\\%");
        assert_eq!(q.contains_pattern(), "%50\\%\\_off\\\\%");
        assert_eq!(q.term(), "50%_off\\");
    }

    #[test]
    fn test_match_strength_tiers() {
        let q = TextQuery::new("Ali");
        assert_eq!(q.strength(Some("alice")), MatchStrength::Prefix);
        assert_eq!(q.strength(Some("Khalil")), MatchStrength::Contains);
        assert_eq!(q.strength(Some("bob")), MatchStrength::None);
        assert_eq!(q.strength(None), MatchStrength::None);
        assert!(MatchStrength::Prefix > MatchStrength::Contains);
        assert!(MatchStrength::Contains > MatchStrength::None);
        assert_eq!(MatchStrength::Prefix.score(), 2);
    }

    #[test]
    fn test_page_offsets() {
        assert_eq!(Page::new(0).number(), 1);
        assert_eq!(Page::new(1).offset(), 0);
        assert_eq!(Page::new(2).offset(), 50);
        assert_eq!(Page::new(3).limit(), 50);
    }

    #[test]
    fn test_account_ranking_prefix_then_contains_then_other() {
        let rows = vec![
            account(1, "zed", Some("ann@example.com")),
            account(2, "joanna", None),
            account(3, "annie", None),
            account(4, "bob", Some("x@ann.io")),
            account(5, "anna", None),
            account(6, "carl", None),
        ];
        let plan = AccountMatch.plan(&text("ann"), Page::default());
        let ids: Vec<i64> = plan.apply(&rows).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![5, 3, 2, 4, 1]);
    }

    #[test]
    fn test_account_numeric_matches_id_only() {
        let rows = vec![account(12, "12abc", None), account(7, "user7", None)];
        let plan = AccountMatch.plan(&text("7"), Page::default());
        let found = plan.apply(&rows);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 7);
    }

    #[test]
    fn test_withdrawal_ranking_takes_best_of_username_and_method() {
        let now = Utc::now();
        let view = |id: i64, username: Option<&str>, method: &str, age_mins: i64| WithdrawalView {
            id,
            account_id: id * 10,
            username: username.map(str::to_string),
            amount: Decimal::ONE,
            method: method.to_string(),
            status: Default::default(),
            holder_name: None,
            phone_number: None,
            crypto_address: None,
            created_at: now - Duration::minutes(age_mins),
        };
        let rows = vec![
            view(1, Some("xbank"), "card", 1),
            view(2, Some("carol"), "bank_transfer", 5),
            view(3, None, "usdt", 0),
            view(4, Some("bankrupt"), "usdt", 10),
            view(5, Some("dave"), "bank", 2),
        ];
        let plan = WithdrawalMatch.plan(&text("bank"), Page::default());
        let ids: Vec<i64> = plan.apply(&rows).iter().map(|w| w.id).collect();
        // prefix tier (5 newer than 2 newer than 4), then contains tier
        assert_eq!(ids, vec![5, 2, 4, 1]);
    }

    #[test]
    fn test_numeric_queries_rank_by_digits_in_text_fields() {
        let keys = WithdrawalMatch.ranking().order_keys(&text("3"));
        assert_eq!(
            keys,
            vec![
                OrderKey::Strength {
                    columns: &[Column::Username, Column::Method],
                    query: TextQuery::new("3"),
                },
                OrderKey::Column(Column::WithdrawalCreatedAt),
                OrderKey::Column(Column::WithdrawalId)
            ]
        );
    }

    #[test]
    fn test_numeric_withdrawal_owned_by_matching_username_ranks_first() {
        let now = Utc::now();
        let rows = vec![
            withdrawal(12, 5, "user12", now),
            withdrawal(40, 12, "bob", now + Duration::hours(1)),
        ];

        // Both match by number; the username hit outranks the newer row
        let plan = WithdrawalMatch.plan(&text("12"), Page::default());
        let ids: Vec<i64> = plan.apply(&rows).iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![12, 40]);
    }

    #[test]
    fn test_order_lookup_has_no_tiers() {
        let keys = OrderMatch.ranking().order_keys(&text("al"));
        assert!(keys.iter().all(|k| matches!(k, OrderKey::Column(_))));
    }

    #[test]
    fn test_order_numeric_three_way_match() {
        let now = Utc::now();
        let order = |id, account_id, order_number, age| OrderView {
            id,
            account_id,
            username: "u".to_string(),
            order_number,
            is_claimed: false,
            created_at: now - Duration::minutes(age),
        };
        let rows = vec![
            order(9, 1, 100, 3),
            order(1, 9, 101, 2),
            order(2, 3, 9, 1),
            order(4, 4, 4, 0),
        ];
        let plan = OrderMatch.plan(&text("9"), Page::default());
        let ids: Vec<i64> = plan.apply(&rows).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2, 1, 9]);
    }

    #[test]
    fn test_apply_paginates_after_ranking() {
        let rows: Vec<Account> = (1..=120).map(|i| account(i, &format!("user{i}"), None)).collect();
        let plan = AccountMatch.plan(&text("user"), Page::new(2));
        let ids: Vec<i64> = plan.apply(&rows).iter().map(|a| a.id).collect();
        let expected: Vec<i64> = (21..=70).rev().collect();
        assert_eq!(ids, expected);
    }
}
