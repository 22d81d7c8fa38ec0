//! Telegram chat platform adapter.
//!
//! # Data Flow
//! ```text
//! Updates (webhook or getUpdates) ──▶ bot.rs ──▶ menus / payment links
//!
//! Grant engine ──AccessRestorer──▶ client.rs ──unban + invite──▶ Bot API
//! Sweeper      ──AccessRevoker───▶ client.rs ──ban──────────────▶ Bot API
//! ```

pub mod bot;
pub mod client;
pub mod poller;
pub mod types;

pub use bot::{Action, BotDispatcher};
pub use client::TelegramClient;
pub use poller::UpdatePoller;
pub use types::{TelegramError, Update};
