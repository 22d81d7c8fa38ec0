//! Payment processor integration.
//!
//! # Data Flow
//! ```text
//! Bot "buy" ──▶ gateway.rs ──POST /links──▶ processor
//!
//! processor ──POST /payment_webhook──▶ webhook.rs
//!                                        ├──▶ gateway.rs ──▶ keys.rs (TTL cache) ──▶ signature.rs
//!                                        └──▶ subscriptions::GrantEngine
//! ```

pub mod gateway;
pub mod keys;
pub mod signature;
pub mod types;
pub mod webhook;

pub use gateway::{GatewayMode, PaymentGateway};
pub use keys::PublicKeyCache;
pub use types::{GatewayError, LinkRequest, OrderRef, PaymentLink, PaymentNotification};
pub use webhook::{IngestError, IngestOutcome, WebhookIngestor, STATUS_PAID};
