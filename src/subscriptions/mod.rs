//! Subscription lifecycle.
//!
//! # Data Flow
//! ```text
//! Webhook ingestion ──▶ grant.rs ──insert──▶ store ──▶ restore (chat platform)
//!
//! Timer ──▶ sweeper.rs ──max expiry──▶ store
//!                │
//!                ├──▶ revoke (chat platform)
//!                └──▶ prune lapsed rows
//! ```
//!
//! # Design Decisions
//! - Time comes from an injected `Clock` so expiry boundaries are testable
//! - The chat platform is reached only through `AccessRevoker` / `AccessRestorer`

pub mod access;
pub mod clock;
pub mod grant;
pub mod plans;
pub mod sweeper;

pub use access::{AccessError, AccessRestorer, AccessRevoker, LoggingAccess};
pub use clock::{Clock, ManualClock, SystemClock};
pub use grant::{GrantEngine, GrantError, GrantOutcome, RestoreHandle};
pub use plans::{Plan, PlanTable};
pub use sweeper::{ExpirySweeper, SweepReport, TickOutcome};
