//! Grant engine: turns a confirmed payment into a stored subscription.
//!
//! # Responsibilities
//! - Resolve the plan and compute the new expiry from "now"
//! - Insert the row, deduplicated by order reference
//! - Restore channel access in the background with bounded retries
//!
//! # Design Decisions
//! - The row is the commitment. Restoration runs after the insert and its
//!   failure never removes the row; it is logged and counted instead
//! - A failed insert returns before any side effect is started

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryPolicy};
use crate::store::{InsertOutcome, StoreError, Subscription, SubscriptionStore, UserId};
use crate::subscriptions::access::AccessRestorer;
use crate::subscriptions::clock::Clock;
use crate::subscriptions::plans::PlanTable;

/// Errors that abort a grant.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Background access restoration started by a successful grant.
///
/// Dropping the handle detaches the task; it keeps running.
#[derive(Debug)]
pub struct RestoreHandle(JoinHandle<bool>);

impl RestoreHandle {
    /// Wait for the restoration to finish. Returns whether access was restored.
    pub async fn wait(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

/// Result of a grant request.
#[derive(Debug)]
pub enum GrantOutcome {
    /// A new row was stored and restoration was started.
    Granted {
        subscription: Subscription,
        restore: RestoreHandle,
    },
    /// The order was already granted. Nothing was written or restored.
    Duplicate { expires_at: DateTime<Utc> },
    /// The plan is not in the table or never grants access.
    UnknownPlan(String),
}

/// Applies confirmed payments to the subscription store.
pub struct GrantEngine {
    store: SubscriptionStore,
    plans: Arc<PlanTable>,
    clock: Arc<dyn Clock>,
    restorer: Arc<dyn AccessRestorer>,
    retry: RetryPolicy,
}

impl GrantEngine {
    pub fn new(
        store: SubscriptionStore,
        plans: Arc<PlanTable>,
        clock: Arc<dyn Clock>,
        restorer: Arc<dyn AccessRestorer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            plans,
            clock,
            restorer,
            retry,
        }
    }

    pub fn plans(&self) -> &PlanTable {
        &self.plans
    }

    /// Record a paid subscription and start restoring access.
    pub async fn grant(
        &self,
        user_id: UserId,
        plan_name: &str,
        order_ref: Option<&str>,
    ) -> Result<GrantOutcome, GrantError> {
        let Some(plan) = self.plans.by_name(plan_name).filter(|p| p.grants_access()) else {
            tracing::warn!(user_id, plan = plan_name, order_ref, "Grant for unknown plan ignored");
            metrics::record_grant("unknown_plan");
            return Ok(GrantOutcome::UnknownPlan(plan_name.to_string()));
        };

        let Some(expires_at) = self.clock.now().checked_add_signed(plan.duration) else {
            tracing::error!(user_id, plan = %plan.name, order_ref, "Plan duration overflows the expiry; grant refused");
            metrics::record_grant("unknown_plan");
            return Ok(GrantOutcome::UnknownPlan(plan_name.to_string()));
        };

        let subscription = match self.store.insert(user_id, &plan.name, expires_at, order_ref).await {
            Ok(InsertOutcome::Inserted(subscription)) => subscription,
            Ok(InsertOutcome::Duplicate(existing)) => {
                tracing::info!(
                    user_id,
                    order_ref,
                    expires_at = %existing.expires_at,
                    "Order already granted, skipping"
                );
                metrics::record_grant("duplicate");
                return Ok(GrantOutcome::Duplicate {
                    expires_at: existing.expires_at,
                });
            }
            Err(e) => {
                tracing::error!(user_id, plan = %plan.name, order_ref, error = %e, "Failed to store grant");
                metrics::record_grant("store_error");
                return Err(e.into());
            }
        };

        tracing::info!(
            user_id,
            plan = %plan.name,
            order_ref,
            expires_at = %subscription.expires_at,
            "Subscription granted"
        );
        metrics::record_grant("granted");

        let restore = self.spawn_restore(&subscription);
        Ok(GrantOutcome::Granted {
            subscription,
            restore,
        })
    }

    fn spawn_restore(&self, subscription: &Subscription) -> RestoreHandle {
        let restorer = self.restorer.clone();
        let policy = self.retry;
        let user_id = subscription.user_id;
        let plan = subscription.plan.clone();
        let expires_at = subscription.expires_at;

        RestoreHandle(tokio::spawn(async move {
            let result = retry_with_backoff(&policy, "restore_access", |_| {
                restorer.restore(user_id, &plan, expires_at)
            })
            .await;

            match result {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        user_id,
                        plan = %plan,
                        error = %e,
                        "Access restoration failed after retries; user is paid but locked out"
                    );
                    metrics::record_restore_failure();
                    false
                }
            }
        }))
    }
}
