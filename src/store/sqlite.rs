//! SQLite-backed subscription store.
//!
//! # Responsibilities
//! - Append grant rows, deduplicated by order reference
//! - Report the effective expiry per user
//! - Prune lapsed rows, one user or a whole sweep batch in one transaction
//!
//! # Design Decisions
//! - Expiries are stored as epoch milliseconds so comparisons are numeric
//! - Deduplication is a unique index plus `ON CONFLICT DO NOTHING`, so two
//!   concurrent deliveries of one notification cannot both insert
//! - Deletes are always scoped to `expires_at <= cutoff`; a row that is still
//!   valid at the cutoff can never be removed by a sweep

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::config::StoreConfig;
use crate::store::types::{
    InsertOutcome, StoreError, StoreResult, StoreSummary, Subscription, UserId,
};

const COLUMNS: &str = "id, user_id, plan, expires_at, order_ref";

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: i64,
    user_id: i64,
    plan: String,
    expires_at: i64,
    order_ref: Option<String>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            plan: row.plan,
            expires_at: from_millis(row.expires_at)?,
            order_ref: row.order_ref,
        })
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("expires_at {millis} out of range")))
}

/// Durable record of grants.
#[derive(Clone, Debug)]
pub struct SubscriptionStore {
    pool: SqlitePool,
}

impl SubscriptionStore {
    /// Open (creating if needed) the database described by the config and run migrations.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let in_memory = config.database_url.contains(":memory:");

        let mut opts = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        // Every in-memory connection is its own database, so keep exactly one alive.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(opts)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(database_url = %config.database_url, "Subscription store ready");
        Ok(store)
    }

    /// Private in-memory database, used by tests and local runs.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect(&StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            ..StoreConfig::default()
        })
        .await
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                plan       TEXT    NOT NULL,
                expires_at INTEGER NOT NULL,
                order_ref  TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_user_expiry
                ON subscriptions (user_id, expires_at)",
        )
        .execute(&self.pool)
        .await?;

        // NULL order references stay distinct, so rows without one never conflict.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_order_ref
                ON subscriptions (order_ref)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a grant row. A repeated order reference writes nothing.
    pub async fn insert(
        &self,
        user_id: UserId,
        plan: &str,
        expires_at: DateTime<Utc>,
        order_ref: Option<&str>,
    ) -> StoreResult<InsertOutcome> {
        let inserted: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "INSERT INTO subscriptions (user_id, plan, expires_at, order_ref)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (order_ref) DO NOTHING
             RETURNING {COLUMNS}"
        ))
        .bind(user_id)
        .bind(plan)
        .bind(to_millis(expires_at))
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(row.try_into()?));
        }

        let existing = match order_ref {
            Some(order_ref) => self.find_by_order_ref(order_ref).await?,
            None => None,
        };
        existing
            .map(InsertOutcome::Duplicate)
            .ok_or_else(|| StoreError::Corrupt("insert skipped without a conflicting row".into()))
    }

    /// The greatest expiry per user: each user's effective expiry.
    pub async fn max_expiry_per_user(&self) -> StoreResult<Vec<(UserId, DateTime<Utc>)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT user_id, MAX(expires_at) FROM subscriptions GROUP BY user_id ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(user_id, max_exp)| Ok((user_id, from_millis(max_exp)?)))
            .collect()
    }

    /// The row with the greatest expiry for a user (the "current" plan).
    pub async fn latest_row(&self, user_id: UserId) -> StoreResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM subscriptions
             WHERE user_id = ?
             ORDER BY expires_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    /// Every row for a user, newest expiry first.
    pub async fn list_by_user(&self, user_id: UserId) -> StoreResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM subscriptions
             WHERE user_id = ?
             ORDER BY expires_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    /// Look up the row created by a given order.
    pub async fn find_by_order_ref(&self, order_ref: &str) -> StoreResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE order_ref = ?"
        ))
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    /// Remove a user's rows with `expires_at <= cutoff`.
    pub async fn delete_lapsed(&self, user_id: UserId, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND expires_at <= ?")
            .bind(user_id)
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove lapsed rows for many users in one transaction.
    ///
    /// Either every user's lapsed rows are gone or, on error, none are.
    pub async fn delete_lapsed_batch(
        &self,
        user_ids: &[UserId],
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for user_id in user_ids {
            deleted += sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND expires_at <= ?")
                .bind(user_id)
                .bind(to_millis(cutoff))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        // Dropping the transaction on an early return rolls it back.
        tx.commit().await?;
        Ok(deleted)
    }

    /// Row, user and active-user counts at `now`.
    pub async fn summary(&self, now: DateTime<Utc>) -> StoreResult<StoreSummary> {
        let (rows, users): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT user_id) FROM subscriptions")
                .fetch_one(&self.pool)
                .await?;
        let (active_users,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT user_id) FROM subscriptions WHERE expires_at > ?",
        )
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreSummary {
            rows,
            users,
            active_users,
        })
    }

    /// Connectivity check used by `/health`.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool. Subsequent operations fail with `StoreError::Unavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
