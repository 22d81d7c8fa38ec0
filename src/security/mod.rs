//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Payment webhook:
//!     → payments::signature (RSA verification of the raw body)
//!     → rate_limit.rs (throttle the invalid-signature alarm per source)
//! Admin API:
//!     → admin::auth (bearer token)
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unverifiable notification never changes state
//! - No trust in client input

pub mod rate_limit;

pub use rate_limit::SignatureAlarm;
