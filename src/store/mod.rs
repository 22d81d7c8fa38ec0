//! Subscription store subsystem.
//!
//! # Data Flow
//! ```text
//! Grant engine ──insert──▶ subscriptions table ◀──max/latest/delete── Expiry sweeper
//!                                  ▲
//!                    list_by_user (bot, admin API)
//! ```
//!
//! # Design Decisions
//! - Insert-only rows; extending access adds a row
//! - Effective access is derived: active iff some row has `expires_at > now`
//! - The store is the only shared mutable resource between components

pub mod sqlite;
pub mod types;

pub use sqlite::SubscriptionStore;
pub use types::{InsertOutcome, StoreError, StoreResult, StoreSummary, Subscription, UserId};
