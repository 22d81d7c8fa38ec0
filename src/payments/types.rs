//! Payment processor wire types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::UserId;

const ORDER_PREFIX: &str = "tg-";

/// Correlates a payment link with its confirmation notification.
///
/// Generated refs look like `tg-<user_id>-<nonce>`. A bare user id is also
/// accepted when parsing, as older links carried only that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRef(String);

impl OrderRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// A fresh, unique reference for one purchase by `user_id`.
    pub fn generate(user_id: UserId) -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{ORDER_PREFIX}{user_id}-{}", &nonce[..12]))
    }

    /// The buyer encoded in the reference, if it can be recovered.
    pub fn user_id(&self) -> Option<UserId> {
        let raw = self.0.trim();
        let id = match raw.strip_prefix(ORDER_PREFIX) {
            Some(rest) => rest.split('-').next()?,
            None => raw,
        };
        id.parse::<UserId>().ok().filter(|id| *id > 0)
    }

    /// Whether this reference names one purchase. A bare user id is shared by
    /// every payment of that user, so it cannot deduplicate notifications.
    pub fn is_per_order(&self) -> bool {
        self.0.trim().starts_with(ORDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for a new payment link.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub user_id: UserId,
    pub amount: f64,
    pub plan: String,
    pub order_ref: OrderRef,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
}

impl LinkRequest {
    /// Invoice description. The plan name is recovered from its first word.
    pub fn description(&self) -> String {
        format!("{} user {}", self.plan, self.user_id)
    }
}

/// A payable link returned by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub url: String,
    #[serde(rename = "id")]
    pub link_id: String,
    #[serde(default)]
    pub status: String,
}

/// Body of `POST {base_url}/links`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateLinkBody<'a> {
    pub amount: f64,
    pub currency: &'a str,
    pub description: String,
    pub order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_redirect_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_redirect_url: Option<&'a str>,
}

/// Body of `GET {base_url}/public-key`.
#[derive(Debug, Deserialize)]
pub(crate) struct PublicKeyBody {
    pub value: String,
}

/// Inbound payment notification, decoded after signature verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    pub status: String,
    /// Echo of the order reference. Processors send it as a string or a number.
    #[serde(default)]
    pub order_id: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl PaymentNotification {
    pub fn order_ref(&self) -> Option<OrderRef> {
        match self.order_id.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(OrderRef::new(s.trim())),
            serde_json::Value::Number(n) => Some(OrderRef::new(n.to_string())),
            _ => None,
        }
    }

    /// Plan name: the first whitespace-separated token of the description.
    pub fn plan_name(&self) -> Option<&str> {
        self.description.as_deref()?.split_whitespace().next()
    }
}

/// Errors from the payment processor client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure, timeout or a 5xx response.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// The processor refused the request (4xx).
    #[error("payment processor rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The verification key could not be obtained.
    #[error("processor public key unavailable: {0}")]
    KeyUnavailable(String),

    /// Local configuration cannot produce a request.
    #[error("payment gateway misconfigured: {0}")]
    Misconfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_order_ref_carries_user() {
        let order = OrderRef::generate(6_123_456_789);
        assert!(order.as_str().starts_with("tg-6123456789-"));
        assert_eq!(order.user_id(), Some(6_123_456_789));
        assert_ne!(order, OrderRef::generate(6_123_456_789));
    }

    #[test]
    fn test_order_ref_user_id_parsing() {
        assert_eq!(OrderRef::new("42").user_id(), Some(42));
        assert_eq!(OrderRef::new("tg-42-abc").user_id(), Some(42));
        assert_eq!(OrderRef::new("tg-x-abc").user_id(), None);
        assert_eq!(OrderRef::new("order-77").user_id(), None);
        assert_eq!(OrderRef::new("0").user_id(), None);

        assert!(OrderRef::generate(42).is_per_order());
        assert!(!OrderRef::new("42").is_per_order());
    }

    #[test]
    fn test_notification_decoding() {
        let n: PaymentNotification = serde_json::from_str(
            r#"{"status":"Closed","orderId":12345,"description":"Week user 12345","amount":100.0}"#,
        )
        .unwrap();
        assert_eq!(n.order_ref().unwrap().user_id(), Some(12345));
        assert_eq!(n.plan_name(), Some("Week"));

        let n: PaymentNotification = serde_json::from_str(r#"{"status":"Closed","description":"  "}"#).unwrap();
        assert!(n.order_ref().is_none());
        assert!(n.plan_name().is_none());
    }

    #[test]
    fn test_link_body_omits_missing_redirects() {
        let body = CreateLinkBody {
            amount: 100.0,
            currency: "RUB",
            description: "Week user 1".into(),
            order_id: "tg-1-a",
            success_redirect_url: None,
            fail_redirect_url: Some("https://t.me/bot"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["orderId"], "tg-1-a");
        assert_eq!(json["failRedirectUrl"], "https://t.me/bot");
        assert!(json.get("successRedirectUrl").is_none());
    }
}
