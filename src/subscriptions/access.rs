//! Access-control capabilities consumed by the grant engine and the sweeper.
//!
//! The chat platform is the source of truth for who can read the channel.
//! The core only asks it to revoke or restore access; both calls may fail and
//! the caller decides what a failure means.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::UserId;

/// Errors returned by the access-control system.
#[derive(Debug, Clone, Error)]
pub enum AccessError {
    /// Network failure, timeout, rate limit or server error. Worth retrying.
    #[error("access control unavailable: {0}")]
    Unavailable(String),

    /// The platform refused the request (unknown user, missing rights).
    #[error("access control rejected request: {0}")]
    Rejected(String),
}

/// Removes a user's access to the channel when their subscription lapses.
#[async_trait]
pub trait AccessRevoker: Send + Sync {
    async fn revoke(&self, user_id: UserId, plan: &str) -> Result<(), AccessError>;
}

/// Gives a user access back after a confirmed payment.
#[async_trait]
pub trait AccessRestorer: Send + Sync {
    async fn restore(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<(), AccessError>;
}

/// Access control for runs without a chat platform: every change is only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAccess;

#[async_trait]
impl AccessRevoker for LoggingAccess {
    async fn revoke(&self, user_id: UserId, plan: &str) -> Result<(), AccessError> {
        tracing::info!(user_id, plan, "Access revoked (no chat platform configured)");
        Ok(())
    }
}

#[async_trait]
impl AccessRestorer for LoggingAccess {
    async fn restore(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<(), AccessError> {
        tracing::info!(user_id, plan, %expires_at, "Access restored (no chat platform configured)");
        Ok(())
    }
}
