//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, trace span)
//!     → handlers.rs (payment webhook, chat webhook, health)
//!     → testpay.rs (offline mode only)
//!     → admin (bearer-protected, when enabled)
//! ```

pub mod handlers;
pub mod request;
pub mod server;
pub mod testpay;

pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
