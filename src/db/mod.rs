//! Database persistence for signals, subscriptions, accounts and executions.
//!
//! Stores everything the monitor needs to resume after restart:
//! - Published signals and their settled status
//! - Subscription tier per user
//! - Connected simulated accounts and their balances
//! - Auto-trade executions (one per signal/account pair)
//! - Last seen quotes
//!
//! Decimals are stored as TEXT to keep prices exact.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::api::Quote;
use crate::models::{
    Execution, ExecutionStatus, Signal, SignalStatus, Subscription, SubscriptionTier,
    TradingAccount,
};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored signal record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredSignal {
    id: String,
    symbol: String,
    direction: String,
    entry_price: String,
    stop_loss: String,
    take_profit: String,
    status: String,
    min_tier: String,
    note: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    close_price: Option<String>,
}

impl StoredSignal {
    fn into_signal(self) -> Result<Signal> {
        Ok(Signal {
            direction: self.direction.parse()?,
            entry_price: parse_decimal(&self.entry_price)?,
            stop_loss: parse_decimal(&self.stop_loss)?,
            take_profit: parse_decimal(&self.take_profit)?,
            status: self.status.parse()?,
            min_tier: self.min_tier.parse()?,
            close_price: self.close_price.as_deref().map(parse_decimal).transpose()?,
            id: self.id,
            symbol: self.symbol,
            note: self.note,
            created_at: self.created_at,
            closed_at: self.closed_at,
        })
    }
}

/// Stored subscription record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredSubscription {
    user_id: String,
    tier: String,
    started_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// Stored trading account record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredAccount {
    id: String,
    user_id: String,
    label: String,
    balance: String,
    risk_pct: String,
    auto_trade: bool,
    connected: bool,
    created_at: DateTime<Utc>,
}

impl StoredAccount {
    fn into_account(self) -> Result<TradingAccount> {
        Ok(TradingAccount {
            balance: parse_decimal(&self.balance)?,
            risk_pct: parse_decimal(&self.risk_pct)?,
            id: self.id,
            user_id: self.user_id,
            label: self.label,
            auto_trade: self.auto_trade,
            connected: self.connected,
            created_at: self.created_at,
        })
    }
}

/// Stored execution record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredExecution {
    id: String,
    signal_id: String,
    account_id: String,
    direction: String,
    status: String,
    lots: String,
    entry_price: String,
    stop_loss: String,
    take_profit: String,
    order_id: Option<String>,
    close_price: Option<String>,
    realized_pnl: Option<String>,
    reason: String,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl StoredExecution {
    fn into_execution(self) -> Result<Execution> {
        Ok(Execution {
            direction: self.direction.parse()?,
            status: self.status.parse()?,
            lots: parse_decimal(&self.lots)?,
            entry_price: parse_decimal(&self.entry_price)?,
            stop_loss: parse_decimal(&self.stop_loss)?,
            take_profit: parse_decimal(&self.take_profit)?,
            close_price: self.close_price.as_deref().map(parse_decimal).transpose()?,
            realized_pnl: self.realized_pnl.as_deref().map(parse_decimal).transpose()?,
            id: self.id,
            signal_id: self.signal_id,
            account_id: self.account_id,
            order_id: self.order_id,
            reason: self.reason,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
        })
    }
}

/// Counts of executions by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCounts {
    pub open: i64,
    pub closed: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl ExecutionCounts {
    pub fn total(&self) -> i64 {
        self.open + self.closed + self.failed + self.skipped
    }
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("Invalid decimal in database: {}", s))
}

impl Database {
    /// Create a new database connection and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database
        let in_memory = database_url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Close the pool. Later queries fail instead of reconnecting.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                min_tier TEXT NOT NULL DEFAULT 'premium',
                note TEXT NOT NULL DEFAULT '',
                auto_traded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                closed_at TEXT,
                close_price TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id TEXT PRIMARY KEY,
                tier TEXT NOT NULL,
                started_at TEXT NOT NULL,
                expires_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                label TEXT NOT NULL DEFAULT '',
                balance TEXT NOT NULL,
                risk_pct TEXT NOT NULL,
                auto_trade INTEGER NOT NULL DEFAULT 0,
                connected INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                signal_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                lots TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                order_id TEXT,
                close_price TEXT,
                realized_pnl TEXT,
                reason TEXT NOT NULL DEFAULT '',
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                UNIQUE(signal_id, account_id),
                FOREIGN KEY (signal_id) REFERENCES signals(id),
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_ticks (
                symbol TEXT PRIMARY KEY,
                bid TEXT NOT NULL,
                ask TEXT NOT NULL,
                quoted_at TEXT NOT NULL,
                recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Signals ====================

    /// Store a newly published signal.
    pub async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, direction, entry_price, stop_loss, take_profit,
                status, min_tier, note, created_at, closed_at, close_price
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.id)
        .bind(&signal.symbol)
        .bind(signal.direction.as_str())
        .bind(signal.entry_price.to_string())
        .bind(signal.stop_loss.to_string())
        .bind(signal.take_profit.to_string())
        .bind(signal.status.as_str())
        .bind(signal.min_tier.as_str())
        .bind(&signal.note)
        .bind(signal.created_at)
        .bind(signal.closed_at)
        .bind(signal.close_price.map(|p| p.to_string()))
        .execute(&self.pool)
        .await
        .context("Failed to insert signal")?;

        Ok(())
    }

    /// Fetch a signal by id, accepting a unique id prefix.
    pub async fn get_signal(&self, id: &str) -> Result<Option<Signal>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            "SELECT * FROM signals WHERE id = ? OR id LIKE ? || '%' LIMIT 2",
        )
        .bind(id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        if let Some(exact) = rows.iter().find(|r| r.id == id) {
            return exact.clone().into_signal().map(Some);
        }
        match rows.len() {
            0 => Ok(None),
            1 => rows.into_iter().next().map(StoredSignal::into_signal).transpose(),
            _ => anyhow::bail!("Signal id prefix '{}' is ambiguous", id),
        }
    }

    /// List signals newest first, optionally filtered by status.
    pub async fn list_signals(&self, status: Option<SignalStatus>, limit: i64) -> Result<Vec<Signal>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, StoredSignal>(
                    "SELECT * FROM signals WHERE status = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredSignal>(
                    "SELECT * FROM signals ORDER BY created_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(StoredSignal::into_signal).collect()
    }

    /// All signals still active.
    pub async fn get_active_signals(&self) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            "SELECT * FROM signals WHERE status = 'active' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch active signals")?;

        rows.into_iter().map(StoredSignal::into_signal).collect()
    }

    /// Signals created at or after `since`, oldest first.
    pub async fn list_signals_since(&self, since: DateTime<Utc>) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            "SELECT * FROM signals WHERE created_at >= ? ORDER BY created_at",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch signals")?;

        rows.into_iter().map(StoredSignal::into_signal).collect()
    }

    /// Move an active signal to a terminal status.
    ///
    /// Returns false if the signal was already settled; terminal rows are
    /// never rewritten.
    pub async fn settle_signal(
        &self,
        id: &str,
        status: SignalStatus,
        close_price: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE signals SET
                status = ?,
                close_price = ?,
                closed_at = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(status.as_str())
        .bind(close_price.to_string())
        .bind(closed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Active signals whose auto-trade fan-out has not run yet.
    pub async fn get_signals_pending_auto_trade(&self) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            "SELECT * FROM signals WHERE status = 'active' AND auto_traded = 0 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredSignal::into_signal).collect()
    }

    pub async fn mark_auto_traded(&self, signal_id: &str) -> Result<()> {
        sqlx::query("UPDATE signals SET auto_traded = 1 WHERE id = ?")
            .bind(signal_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Subscriptions ====================

    /// Save or replace a user's subscription.
    pub async fn upsert_subscription(&self, sub: &Subscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, tier, started_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                tier = excluded.tier,
                started_at = excluded.started_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&sub.user_id)
        .bind(sub.tier.as_str())
        .bind(sub.started_at)
        .bind(sub.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// A user's subscription; users with no record are on the free tier.
    pub async fn get_subscription(&self, user_id: &str) -> Result<Subscription> {
        let row = sqlx::query_as::<_, StoredSubscription>(
            "SELECT * FROM subscriptions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Subscription {
                tier: r.tier.parse::<SubscriptionTier>()?,
                user_id: r.user_id,
                started_at: r.started_at,
                expires_at: r.expires_at,
            }),
            None => Ok(Subscription::free(user_id)),
        }
    }

    // ==================== Accounts ====================

    pub async fn insert_account(&self, account: &TradingAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, label, balance, risk_pct, auto_trade, connected, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(&account.label)
        .bind(account.balance.to_string())
        .bind(account.risk_pct.to_string())
        .bind(account.auto_trade)
        .bind(account.connected)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert account")?;

        Ok(())
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<TradingAccount>> {
        sqlx::query_as::<_, StoredAccount>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(StoredAccount::into_account)
            .transpose()
    }

    /// List accounts, optionally for one user.
    pub async fn list_accounts(&self, user_id: Option<&str>) -> Result<Vec<TradingAccount>> {
        let rows = match user_id {
            Some(user) => {
                sqlx::query_as::<_, StoredAccount>(
                    "SELECT * FROM accounts WHERE user_id = ? ORDER BY created_at",
                )
                .bind(user)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredAccount>("SELECT * FROM accounts ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(StoredAccount::into_account).collect()
    }

    /// Connected accounts with auto-trade switched on.
    pub async fn get_auto_trade_accounts(&self) -> Result<Vec<TradingAccount>> {
        let rows = sqlx::query_as::<_, StoredAccount>(
            "SELECT * FROM accounts WHERE auto_trade = 1 AND connected = 1 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredAccount::into_account).collect()
    }

    /// Number of connected accounts a user has.
    pub async fn count_connected_accounts(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE user_id = ? AND connected = 1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn set_account_connected(&self, id: &str, connected: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET connected = ? WHERE id = ?")
            .bind(connected)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_account_risk(&self, id: &str, risk_pct: Decimal) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET risk_pct = ? WHERE id = ?")
            .bind(risk_pct.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_account_auto_trade(&self, id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET auto_trade = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Executions ====================

    /// Check whether a signal has already been attempted on an account.
    pub async fn has_execution(&self, signal_id: &str, account_id: &str) -> Result<bool> {
        let result: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM executions WHERE signal_id = ? AND account_id = ?")
                .bind(signal_id)
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.is_some())
    }

    /// Record an execution. Returns false if the signal/account pair already exists.
    pub async fn insert_execution(&self, exec: &Execution) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO executions (
                id, signal_id, account_id, direction, status, lots, entry_price,
                stop_loss, take_profit, order_id, close_price, realized_pnl,
                reason, opened_at, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&exec.id)
        .bind(&exec.signal_id)
        .bind(&exec.account_id)
        .bind(exec.direction.as_str())
        .bind(exec.status.as_str())
        .bind(exec.lots.to_string())
        .bind(exec.entry_price.to_string())
        .bind(exec.stop_loss.to_string())
        .bind(exec.take_profit.to_string())
        .bind(&exec.order_id)
        .bind(exec.close_price.map(|p| p.to_string()))
        .bind(exec.realized_pnl.map(|p| p.to_string()))
        .bind(&exec.reason)
        .bind(exec.opened_at)
        .bind(exec.closed_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert execution")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_open_executions(&self) -> Result<Vec<Execution>> {
        let rows = sqlx::query_as::<_, StoredExecution>(
            "SELECT * FROM executions WHERE status = 'open' ORDER BY opened_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch open executions")?;

        rows.into_iter().map(StoredExecution::into_execution).collect()
    }

    /// Executions newest first, optionally for one account.
    pub async fn list_executions(&self, account_id: Option<&str>) -> Result<Vec<Execution>> {
        let rows = match account_id {
            Some(id) => {
                sqlx::query_as::<_, StoredExecution>(
                    "SELECT * FROM executions WHERE account_id = ? ORDER BY opened_at DESC",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredExecution>(
                    "SELECT * FROM executions ORDER BY opened_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(StoredExecution::into_execution).collect()
    }

    /// Close an open execution and credit its P&L to the account, atomically.
    ///
    /// Returns false if the execution was no longer open.
    pub async fn close_execution(
        &self,
        execution_id: &str,
        account_id: &str,
        close_price: Decimal,
        realized_pnl: Decimal,
        reason: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE executions SET
                status = 'closed',
                close_price = ?,
                realized_pnl = ?,
                reason = ?,
                closed_at = ?
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(close_price.to_string())
        .bind(realized_pnl.to_string())
        .bind(reason)
        .bind(closed_at)
        .bind(execution_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let (balance,): (String,) = sqlx::query_as("SELECT balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await
            .context("Account for execution not found")?;
        let new_balance = parse_decimal(&balance)? + realized_pnl;

        sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
            .bind(new_balance.to_string())
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_execution_counts(&self) -> Result<ExecutionCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM executions GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = ExecutionCounts::default();
        for (status, n) in rows {
            match status.parse::<ExecutionStatus>()? {
                ExecutionStatus::Open => counts.open = n,
                ExecutionStatus::Closed => counts.closed = n,
                ExecutionStatus::Failed => counts.failed = n,
                ExecutionStatus::Skipped => counts.skipped = n,
            }
        }
        Ok(counts)
    }

    // ==================== Price Ticks ====================

    /// Store `quote` as the last seen quote for its symbol. One row per symbol.
    pub async fn record_tick(&self, quote: &Quote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_ticks (symbol, bid, ask, quoted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                bid = excluded.bid,
                ask = excluded.ask,
                quoted_at = excluded.quoted_at,
                recorded_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&quote.symbol)
        .bind(quote.bid.to_string())
        .bind(quote.ask.to_string())
        .bind(quote.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recently recorded quote, if any.
    pub async fn latest_tick(&self, symbol: &str) -> Result<Option<Quote>> {
        let row: Option<(String, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT bid, ask, quoted_at FROM price_ticks WHERE symbol = ?")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(bid, ask, ts)| {
            Ok(Quote {
                symbol: symbol.to_string(),
                bid: parse_decimal(&bid)?,
                ask: parse_decimal(&ask)?,
                timestamp: ts,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalDirection;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn buy_signal() -> Signal {
        Signal::new("XAUUSD", SignalDirection::Buy, dec!(2350.5), dec!(2340.25), dec!(2370))
            .unwrap()
            .with_note("london open")
    }

    #[tokio::test]
    async fn test_signal_roundtrip_and_prefix_lookup() {
        let db = memory_db().await;
        let signal = buy_signal();
        db.insert_signal(&signal).await.unwrap();

        let loaded = db.get_signal(&signal.id[..8]).await.unwrap().unwrap();
        assert_eq!(loaded.id, signal.id);
        assert_eq!(loaded.entry_price, dec!(2350.5));
        assert_eq!(loaded.stop_loss, dec!(2340.25));
        assert_eq!(loaded.note, "london open");
        assert_eq!(loaded.status, SignalStatus::Active);

        assert!(db.get_signal("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_signal_only_once() {
        let db = memory_db().await;
        let signal = buy_signal();
        db.insert_signal(&signal).await.unwrap();

        let now = Utc::now();
        assert!(db
            .settle_signal(&signal.id, SignalStatus::HitTarget, dec!(2370), now)
            .await
            .unwrap());
        assert!(!db
            .settle_signal(&signal.id, SignalStatus::HitStop, dec!(2340.25), now)
            .await
            .unwrap());

        let loaded = db.get_signal(&signal.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SignalStatus::HitTarget);
        assert_eq!(loaded.close_price, Some(dec!(2370)));

        assert!(db.get_active_signals().await.unwrap().is_empty());
        let since = Utc::now() - ChronoDuration::hours(1);
        assert_eq!(db.list_signals_since(since).await.unwrap().len(), 1);
        assert_eq!(
            db.list_signals(Some(SignalStatus::HitTarget), 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_subscription_defaults_to_free() {
        let db = memory_db().await;
        let sub = db.get_subscription("nobody").await.unwrap();
        assert_eq!(sub.tier, SubscriptionTier::Free);

        let vip = Subscription {
            user_id: "alice".to_string(),
            tier: SubscriptionTier::Vip,
            started_at: Utc::now(),
            expires_at: Some(Utc::now() + ChronoDuration::days(30)),
        };
        db.upsert_subscription(&vip).await.unwrap();
        let loaded = db.get_subscription("alice").await.unwrap();
        assert_eq!(loaded.tier, SubscriptionTier::Vip);
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_execution_is_unique_per_signal_and_account() {
        let db = memory_db().await;
        let signal = buy_signal();
        db.insert_signal(&signal).await.unwrap();
        let account = TradingAccount::new("alice", "demo", dec!(10000));
        db.insert_account(&account).await.unwrap();

        let first = Execution::skipped(&signal.id, &account.id, signal.direction, "test");
        let second = Execution::skipped(&signal.id, &account.id, signal.direction, "again");
        assert!(db.insert_execution(&first).await.unwrap());
        assert!(!db.insert_execution(&second).await.unwrap());
        assert!(db.has_execution(&signal.id, &account.id).await.unwrap());

        let counts = db.get_execution_counts().await.unwrap();
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn test_close_execution_credits_balance() {
        let db = memory_db().await;
        let signal = buy_signal();
        db.insert_signal(&signal).await.unwrap();
        let account = TradingAccount::new("alice", "demo", dec!(10000));
        db.insert_account(&account).await.unwrap();

        let exec = Execution {
            status: ExecutionStatus::Open,
            lots: dec!(0.1),
            entry_price: dec!(2350.65),
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            order_id: Some("ord-1".to_string()),
            ..Execution::skipped(&signal.id, &account.id, signal.direction, "")
        };
        db.insert_execution(&exec).await.unwrap();
        assert_eq!(db.get_open_executions().await.unwrap().len(), 1);

        let closed = db
            .close_execution(&exec.id, &account.id, dec!(2370), dec!(193.5), "take profit", Utc::now())
            .await
            .unwrap();
        assert!(closed);

        // Second close is a no-op and must not double-credit
        assert!(!db
            .close_execution(&exec.id, &account.id, dec!(2370), dec!(193.5), "take profit", Utc::now())
            .await
            .unwrap());

        let acc = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(acc.balance, dec!(10193.5));
        assert!(db.get_open_executions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_toggles() {
        let db = memory_db().await;
        let account = TradingAccount::new("bob", "", dec!(5000));
        db.insert_account(&account).await.unwrap();

        assert!(db.get_auto_trade_accounts().await.unwrap().is_empty());
        db.set_account_auto_trade(&account.id, true).await.unwrap();
        db.set_account_risk(&account.id, dec!(2.5)).await.unwrap();
        let auto = db.get_auto_trade_accounts().await.unwrap();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].risk_pct, dec!(2.5));

        db.set_account_connected(&account.id, false).await.unwrap();
        assert!(db.get_auto_trade_accounts().await.unwrap().is_empty());
        assert_eq!(db.count_connected_accounts("bob").await.unwrap(), 0);
        assert!(!db.set_account_connected("missing", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_ticks() {
        let db = memory_db().await;
        assert!(db.latest_tick("XAUUSD").await.unwrap().is_none());
        db.record_tick(&Quote::flat("XAUUSD", dec!(2350))).await.unwrap();
        db.record_tick(&Quote::flat("XAUUSD", dec!(2351.7))).await.unwrap();
        assert_eq!(db.latest_tick("XAUUSD").await.unwrap().unwrap().bid, dec!(2351.7));
    }

    #[tokio::test]
    async fn test_ticks_keep_one_row_per_symbol() {
        let db = memory_db().await;
        for price in [dec!(2350), dec!(2350.4), dec!(2349.9)] {
            db.record_tick(&Quote::flat("XAUUSD", price)).await.unwrap();
        }
        db.record_tick(&Quote::flat("XAGUSD", dec!(29.5))).await.unwrap();

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_ticks")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(db.latest_tick("XAUUSD").await.unwrap().unwrap().ask, dec!(2349.9));
        assert_eq!(db.latest_tick("XAGUSD").await.unwrap().unwrap().bid, dec!(29.5));
    }
}
