//! Immutable plan catalogue.

use chrono::Duration;
use serde::Serialize;

use crate::config::PlanConfig;

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(skip)]
    pub duration: Duration,
}

impl Plan {
    /// Plans with a non-positive duration are listed but never grant access.
    pub fn grants_access(&self) -> bool {
        self.duration > Duration::zero()
    }
}

/// Plan table loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct PlanTable {
    plans: Vec<Plan>,
}

impl PlanTable {
    pub fn from_config(plans: &[PlanConfig]) -> Self {
        let plans = plans
            .iter()
            .map(|p| Plan {
                id: p.id.clone(),
                name: p.name.clone(),
                price: p.price,
                duration: Duration::try_seconds(p.duration_secs).unwrap_or_else(|| {
                    tracing::error!(plan = %p.name, duration_secs = p.duration_secs, "Plan duration out of range");
                    Duration::zero()
                }),
            })
            .collect::<Vec<_>>();

        for plan in plans.iter().filter(|p| !p.grants_access()) {
            tracing::warn!(plan = %plan.name, "Plan has a non-positive duration and will never grant access");
        }

        Self { plans }
    }

    /// Lookup by display name, as recovered from an invoice description.
    pub fn by_name(&self, name: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.name == name)
    }

    /// Lookup by identifier, as carried in chat callback data.
    pub fn by_id(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
