//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Offline mode must be explicit: a missing processor token is an error, not a fallback
//! - Validate value ranges (timeouts > 0, intervals > 0)
//! - Plan catalogue integrity (unique ids and names, single-token names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GateConfig, ADMIN_KEY_PLACEHOLDER};

/// Longest plan a config may declare: one hundred years.
pub const MAX_PLAN_DURATION_SECS: i64 = 100 * 365 * 24 * 3600;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    if config.store.max_connections == 0 {
        errors.push(ValidationError::new("store.max_connections", "must be > 0"));
    }

    validate_payments(config, &mut errors);
    validate_telegram(config, &mut errors);

    if config.sweeper.interval_secs == 0 {
        errors.push(ValidationError::new("sweeper.interval_secs", "must be > 0"));
    }
    if config.sweeper.tick_budget_secs == 0 {
        errors.push(ValidationError::new("sweeper.tick_budget_secs", "must be > 0"));
    }
    if config.restore.max_attempts == 0 {
        errors.push(ValidationError::new("restore.max_attempts", "must be > 0"));
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER)
    {
        errors.push(ValidationError::new("admin.api_key", "set a real key before enabling the admin API"));
    }

    validate_plans(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_payments(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let payments = &config.payments;

    if payments.offline {
        match payments.app_base_url.as_deref() {
            Some(base) if Url::parse(base).is_ok() => {}
            Some(_) => errors.push(ValidationError::new("payments.app_base_url", "not a valid URL")),
            None => errors.push(ValidationError::new(
                "payments.app_base_url",
                "required in offline mode",
            )),
        }
    } else {
        if payments.token.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::new(
                "payments.token",
                "missing; set payments.offline = true to run without a processor",
            ));
        }
        if Url::parse(&payments.base_url).is_err() {
            errors.push(ValidationError::new("payments.base_url", "not a valid URL"));
        }
        if let Some(base) = payments.app_base_url.as_deref() {
            if Url::parse(base).is_err() {
                errors.push(ValidationError::new("payments.app_base_url", "not a valid URL"));
            }
        }
    }

    if payments.request_timeout_secs == 0 {
        errors.push(ValidationError::new("payments.request_timeout_secs", "must be > 0"));
    }
    if payments.public_key_ttl_secs == 0 {
        errors.push(ValidationError::new("payments.public_key_ttl_secs", "must be > 0"));
    }
}

fn validate_telegram(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    let telegram = &config.telegram;
    if !telegram.enabled {
        return;
    }
    if telegram.token.is_empty() {
        errors.push(ValidationError::new("telegram.token", "required when telegram is enabled"));
    }
    if telegram.channel_id == 0 {
        errors.push(ValidationError::new("telegram.channel_id", "required when telegram is enabled"));
    }
    if Url::parse(&telegram.api_base_url).is_err() {
        errors.push(ValidationError::new("telegram.api_base_url", "not a valid URL"));
    }
    if telegram.request_timeout_secs == 0 {
        errors.push(ValidationError::new("telegram.request_timeout_secs", "must be > 0"));
    }
}

fn validate_plans(config: &GateConfig, errors: &mut Vec<ValidationError>) {
    if config.plans.is_empty() {
        errors.push(ValidationError::new("plans", "at least one plan is required"));
        return;
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for plan in &config.plans {
        if !ids.insert(plan.id.as_str()) {
            errors.push(ValidationError::new("plans.id", format!("duplicate id '{}'", plan.id)));
        }
        if !names.insert(plan.name.as_str()) {
            errors.push(ValidationError::new("plans.name", format!("duplicate name '{}'", plan.name)));
        }
        // The webhook recovers the plan from the first token of the description.
        if plan.name.is_empty() || plan.name.split_whitespace().count() != 1 {
            errors.push(ValidationError::new(
                "plans.name",
                format!("'{}' must be a single non-empty word", plan.name),
            ));
        }
        if plan.duration_secs > MAX_PLAN_DURATION_SECS {
            errors.push(ValidationError::new(
                "plans.duration_secs",
                format!("plan '{}' exceeds {MAX_PLAN_DURATION_SECS} seconds", plan.id),
            ));
        }
        if !(plan.price > 0.0) {
            errors.push(ValidationError::new("plans.price", format!("plan '{}' must cost > 0", plan.id)));
        }
    }
}
