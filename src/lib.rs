//! Paid-subscription access gate for a restricted messaging channel.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                      CHANNEL GATE                        │
//!                     │                                                          │
//!  Chat user ─────────┼─▶ telegram (bot menus) ──▶ payments::gateway ──▶ link ───┼──▶ Processor
//!                     │                                                          │
//!  Processor ─────────┼─▶ http ──▶ payments::webhook ──▶ subscriptions::grant    │
//!   (webhook)         │              (verify RSA)            │                   │
//!                     │                                      ▼                   │
//!                     │                                    store ◀──┐            │
//!                     │                                      │      │            │
//!                     │            subscriptions::sweeper ◀──┘      │            │
//!                     │                   │  (timer, single-flight) │            │
//!                     │                   ▼                         │            │
//!  Chat platform ◀────┼──── revoke / restore (subscriptions::access)┘            │
//!                     │                                                          │
//!                     │  config · observability · lifecycle · resilience ·       │
//!                     │  security · admin                                        │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod payments;
pub mod store;
pub mod subscriptions;

// Adapters
pub mod admin;
pub mod http;
pub mod telegram;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GateConfig;
pub use http::HttpServer;
pub use lifecycle::{App, Shutdown};
