//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Side effect against the chat platform (access restoration):
//!     → retries.rs (re-run with backoff until success or budget exhausted)
//!     → backoff.rs (jittered exponential delay per attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline (set on the HTTP clients)
//! - Retries only for idempotent side effects
//! - Jittered backoff prevents thundering herd after an outage

pub mod backoff;
pub mod retries;

pub use backoff::RetryPolicy;
pub use retries::retry_with_backoff;
