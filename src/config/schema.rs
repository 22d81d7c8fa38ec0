//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the subscription gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// HTTP listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Subscription store settings.
    pub store: StoreConfig,

    /// Payment processor settings.
    pub payments: PaymentsConfig,

    /// Chat platform (Telegram Bot API) settings.
    pub telegram: TelegramConfig,

    /// Expiry sweep scheduling.
    pub sweeper: SweeperConfig,

    /// Retry policy for access restoration after a grant.
    pub restore: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,

    /// Plan catalogue. Loaded once and immutable for the process lifetime.
    pub plans: Vec<PlanConfig>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            store: StoreConfig::default(),
            payments: PaymentsConfig::default(),
            telegram: TelegramConfig::default(),
            sweeper: SweeperConfig::default(),
            restore: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
            security: SecurityConfig::default(),
            plans: default_plans(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 256 * 1024,
        }
    }
}

/// Subscription store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite connection URL.
    pub database_url: String,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// How long a writer waits on a locked database, in seconds.
    pub busy_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://subscriptions.db".to_string(),
            max_connections: 4,
            busy_timeout_secs: 5,
        }
    }
}

/// Payment processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Local loopback mode with no real processor. Must be enabled explicitly.
    pub offline: bool,

    /// Processor API base URL.
    pub base_url: String,

    /// Processor bearer token. Required unless `offline` is set.
    pub token: Option<String>,

    /// Invoice currency code.
    pub currency: String,

    /// Public base URL of this service (redirects and offline links).
    pub app_base_url: Option<String>,

    /// Timeout for processor calls in seconds.
    pub request_timeout_secs: u64,

    /// How long a fetched processor public key stays valid, in seconds.
    pub public_key_ttl_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            offline: false,
            base_url: "https://api-sandbox.wata.pro/api/h2h".to_string(),
            token: None,
            currency: "RUB".to_string(),
            app_base_url: None,
            request_timeout_secs: 15,
            public_key_ttl_secs: 600,
        }
    }
}

/// How the bot receives chat updates.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Updates are pushed to `/telegram/webhook`.
    Webhook,
    /// Updates are pulled with `getUpdates` long polling.
    Polling,
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Enable the chat platform adapter. When disabled, access changes are only logged.
    pub enabled: bool,

    /// Bot token.
    pub token: String,

    /// Restricted channel the subscription grants access to.
    pub channel_id: i64,

    /// Bot API base URL.
    pub api_base_url: String,

    /// Update delivery mode.
    pub mode: UpdateMode,

    /// Optional secret expected in `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<String>,

    /// Lifetime of single-use invite links, in seconds.
    pub invite_ttl_secs: u64,

    /// Timeout for Bot API calls in seconds.
    pub request_timeout_secs: u64,

    /// Long-poll timeout passed to `getUpdates`, in seconds.
    pub poll_timeout_secs: u64,

    /// Contact shown in the help message.
    pub admin_contact: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            channel_id: 0,
            api_base_url: "https://api.telegram.org".to_string(),
            mode: UpdateMode::Webhook,
            webhook_secret: None,
            invite_ttl_secs: 3600,
            request_timeout_secs: 10,
            poll_timeout_secs: 30,
            admin_contact: "@YourAdmin".to_string(),
        }
    }
}

/// Expiry sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Enable the recurring sweep.
    pub enabled: bool,

    /// Seconds between ticks.
    pub interval_secs: u64,

    /// Per-tick time budget in seconds. Users not reached are deferred.
    pub tick_budget_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            tick_budget_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Placeholder admin key; validation refuses to enable the admin API with it.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Invalid-signature warnings logged per source per minute.
    pub signature_alarm_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            signature_alarm_per_minute: 6,
        }
    }
}

/// A purchasable plan.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PlanConfig {
    /// Identifier used in chat callback data.
    pub id: String,

    /// Display name; also the first token of the invoice description.
    pub name: String,

    /// Price in the configured currency.
    pub price: f64,

    /// Access granted per purchase, in seconds.
    pub duration_secs: i64,
}

fn default_plans() -> Vec<PlanConfig> {
    const DAY: i64 = 24 * 3600;
    vec![
        PlanConfig { id: "week".into(), name: "Week".into(), price: 100.0, duration_secs: 7 * DAY },
        PlanConfig { id: "month".into(), name: "Month".into(), price: 300.0, duration_secs: 30 * DAY },
        PlanConfig { id: "chat".into(), name: "Chat".into(), price: 50.0, duration_secs: DAY },
        PlanConfig { id: "test".into(), name: "Test".into(), price: 1.0, duration_secs: 60 },
    ]
}
