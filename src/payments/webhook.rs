//! Inbound payment notifications.
//!
//! # Data Flow
//! ```text
//! POST /payment_webhook (raw body + X-Signature)
//!     → verify signature (fail closed)
//!     → decode notification
//!     → status == Closed?
//!     → derive user and plan
//!     → GrantEngine::grant (deduplicated by order reference)
//! ```
//!
//! # Design Decisions
//! - Verification runs on the exact raw bytes, before any decoding
//! - Anything that verified but cannot be acted on is acknowledged and
//!   logged as an anomaly; a retry would not fix it
//! - A store failure is not acknowledged so the processor redelivers; the
//!   order-reference dedup makes redelivery safe

use std::sync::Arc;

use thiserror::Error;

use crate::observability::metrics;
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{GatewayError, PaymentNotification};
use crate::security::SignatureAlarm;
use crate::store::{StoreError, Subscription, UserId};
use crate::subscriptions::{GrantEngine, GrantError, GrantOutcome, RestoreHandle};

/// Notification status meaning the payment completed.
pub const STATUS_PAID: &str = "Closed";

/// Handled notifications. Every variant is acknowledged to the processor.
#[derive(Debug)]
pub enum IngestOutcome {
    Granted {
        subscription: Subscription,
        restore: RestoreHandle,
    },
    /// Redelivery of an order that was already granted.
    Duplicate { user_id: UserId },
    UnknownPlan(String),
    /// Verified, but not a completed payment.
    Ignored { status: String },
    /// Verified, but the body could not be decoded.
    Malformed(String),
    /// Decoded, but the user or plan could not be derived.
    Anomaly(String),
}

impl IngestOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Granted { .. } => "granted",
            Self::Duplicate { .. } => "duplicate",
            Self::UnknownPlan(_) => "unknown_plan",
            Self::Ignored { .. } => "ignored",
            Self::Malformed(_) => "malformed",
            Self::Anomaly(_) => "anomaly",
        }
    }
}

/// Notifications that must not be acknowledged as handled.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing or invalid notification signature")]
    SignatureInvalid,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GrantError> for IngestError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::Store(e) => Self::Store(e),
        }
    }
}

pub struct WebhookIngestor {
    gateway: Arc<PaymentGateway>,
    grants: Arc<GrantEngine>,
    alarm: SignatureAlarm,
}

impl WebhookIngestor {
    pub fn new(gateway: Arc<PaymentGateway>, grants: Arc<GrantEngine>, alarm: SignatureAlarm) -> Self {
        Self {
            gateway,
            grants,
            alarm,
        }
    }

    /// Verify and apply a notification.
    pub async fn ingest(&self, raw: &[u8], signature: Option<&str>) -> Result<IngestOutcome, IngestError> {
        self.ingest_from("unknown", raw, signature).await
    }

    /// Like [`ingest`](Self::ingest), attributing rejected signatures to `source`.
    pub async fn ingest_from(
        &self,
        source: &str,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        let verified = match signature {
            Some(sig) => self.gateway.verify_notification(raw, sig).await.map_err(|e| {
                tracing::error!(error = %e, "Cannot verify payment notification; rejecting");
                metrics::record_webhook("key_unavailable");
                e
            })?,
            None => false,
        };

        if !verified {
            metrics::record_signature_rejected();
            metrics::record_webhook("signature_invalid");
            if self.alarm.should_log(source) {
                tracing::warn!(
                    source,
                    has_signature = signature.is_some(),
                    body_len = raw.len(),
                    "Rejected payment notification with invalid signature"
                );
            }
            return Err(IngestError::SignatureInvalid);
        }

        let notification = match serde_json::from_slice::<PaymentNotification>(raw) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %String::from_utf8_lossy(raw),
                    "Verified payment notification could not be decoded"
                );
                metrics::record_webhook("malformed");
                return Ok(IngestOutcome::Malformed(e.to_string()));
            }
        };

        self.process_notification(notification).await
    }

    /// Apply a notification that is already trusted.
    pub async fn process_notification(&self, notification: PaymentNotification) -> Result<IngestOutcome, IngestError> {
        let outcome = self.apply(&notification).await;
        match &outcome {
            Ok(outcome) => metrics::record_webhook(outcome.label()),
            Err(_) => metrics::record_webhook("store_error"),
        }
        outcome
    }

    async fn apply(&self, notification: &PaymentNotification) -> Result<IngestOutcome, IngestError> {
        if notification.status != STATUS_PAID {
            tracing::info!(
                status = %notification.status,
                order_id = ?notification.order_id,
                "Payment notification is not a completed payment, ignoring"
            );
            return Ok(IngestOutcome::Ignored {
                status: notification.status.clone(),
            });
        }

        let order_ref = notification.order_ref();
        let user_id = order_ref.as_ref().and_then(|o| o.user_id());
        let plan = notification.plan_name();

        let (Some(order_ref), Some(user_id), Some(plan)) = (order_ref.as_ref(), user_id, plan) else {
            tracing::error!(
                order_id = ?notification.order_id,
                description = ?notification.description,
                amount = ?notification.amount,
                "Paid notification without a derivable user or plan; needs manual follow-up"
            );
            return Ok(IngestOutcome::Anomaly(format!(
                "order_id={:?} description={:?}",
                notification.order_id, notification.description
            )));
        };

        tracing::info!(user_id, plan, order_ref = %order_ref, amount = ?notification.amount, "Payment confirmed");

        let dedup_key = if order_ref.is_per_order() {
            Some(order_ref.as_str())
        } else {
            tracing::warn!(
                user_id,
                plan,
                order_ref = %order_ref,
                "Order reference is a bare user id; granting without deduplication"
            );
            None
        };

        let outcome = match self.grants.grant(user_id, plan, dedup_key).await? {
            GrantOutcome::Granted {
                subscription,
                restore,
            } => IngestOutcome::Granted {
                subscription,
                restore,
            },
            GrantOutcome::Duplicate { .. } => IngestOutcome::Duplicate { user_id },
            GrantOutcome::UnknownPlan(plan) => IngestOutcome::UnknownPlan(plan),
        };
        Ok(outcome)
    }
}
