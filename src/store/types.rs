//! Subscription record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat user identifier. Telegram ids exceed the 32-bit range.
pub type UserId = i64;

/// One stored grant. Rows are never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: UserId,
    pub plan: String,
    pub expires_at: DateTime<Utc>,
    /// Order reference of the payment that created this row.
    pub order_ref: Option<String>,
}

impl Subscription {
    /// A row grants access while its expiry is strictly in the future.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Result of an insert with order-reference deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted(Subscription),
    /// The order reference was already recorded; this is the existing row.
    Duplicate(Subscription),
}

/// Aggregate counts for the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub rows: i64,
    pub users: i64,
    pub active_users: i64,
}

/// Errors that can occur in the subscription store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached or the statement failed.
    #[error("subscription store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// A stored value could not be decoded.
    #[error("corrupt subscription row: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
