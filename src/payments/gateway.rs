//! Payment processor client.
//!
//! # Responsibilities
//! - Create payment links for a user's chosen plan
//! - Verify the signature of inbound notifications
//!
//! # Design Decisions
//! - Offline mode is an explicit configuration flag, never inferred from a
//!   missing token; it produces local `/testpay` links and trusts every
//!   notification
//! - Link creation is not retried: the user simply asks for a new link

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::PaymentsConfig;
use crate::observability::metrics;
use crate::payments::keys::PublicKeyCache;
use crate::payments::signature;
use crate::payments::types::{CreateLinkBody, GatewayError, LinkRequest, PaymentLink};

/// How links are produced and notifications verified.
#[derive(Debug, Clone)]
pub enum GatewayMode {
    /// Talk to the real processor with a bearer token.
    Live { token: String },
    /// Loopback links served by this process.
    Offline { app_base_url: Url },
}

pub struct PaymentGateway {
    client: reqwest::Client,
    mode: GatewayMode,
    base_url: String,
    currency: String,
    keys: Arc<PublicKeyCache>,
}

impl PaymentGateway {
    /// Build the client and its key cache from configuration.
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Misconfigured(format!("http client: {e}")))?;

        let keys = Arc::new(PublicKeyCache::new(
            client.clone(),
            &config.base_url,
            Duration::from_secs(config.public_key_ttl_secs),
        ));

        Self::new(config, client, keys)
    }

    /// Build with an explicitly supplied key cache.
    pub fn new(
        config: &PaymentsConfig,
        client: reqwest::Client,
        keys: Arc<PublicKeyCache>,
    ) -> Result<Self, GatewayError> {
        let mode = if config.offline {
            let raw = config.app_base_url.as_deref().ok_or_else(|| {
                GatewayError::Misconfigured("offline mode requires payments.app_base_url".into())
            })?;
            let app_base_url = Url::parse(raw)
                .map_err(|e| GatewayError::Misconfigured(format!("app_base_url: {e}")))?;
            GatewayMode::Offline { app_base_url }
        } else {
            let token = config.token.clone().filter(|t| !t.is_empty()).ok_or_else(|| {
                GatewayError::Misconfigured("payments.token is required outside offline mode".into())
            })?;
            GatewayMode::Live { token }
        };

        Ok(Self {
            client,
            mode,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
            keys,
        })
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.mode, GatewayMode::Offline { .. })
    }

    /// Ask the processor for a link the user can pay.
    pub async fn create_payment_link(&self, request: &LinkRequest) -> Result<PaymentLink, GatewayError> {
        let result = match &self.mode {
            GatewayMode::Offline { app_base_url } => offline_link(app_base_url, request),
            GatewayMode::Live { token } => self.create_live_link(token, request).await,
        };

        match &result {
            Ok(link) => {
                tracing::info!(
                    user_id = request.user_id,
                    plan = %request.plan,
                    order_ref = %request.order_ref,
                    link_id = %link.link_id,
                    "Payment link created"
                );
                metrics::record_gateway_call("create_link", "ok");
            }
            Err(e) => {
                tracing::error!(
                    user_id = request.user_id,
                    plan = %request.plan,
                    order_ref = %request.order_ref,
                    error = %e,
                    "Payment link creation failed"
                );
                metrics::record_gateway_call("create_link", "error");
            }
        }
        result
    }

    async fn create_live_link(&self, token: &str, request: &LinkRequest) -> Result<PaymentLink, GatewayError> {
        let url = format!("{}/links", self.base_url);
        let body = CreateLinkBody {
            amount: (request.amount * 100.0).round() / 100.0,
            currency: &self.currency,
            description: request.description(),
            order_id: request.order_ref.as_str(),
            success_redirect_url: request.success_url.as_deref(),
            fail_redirect_url: request.fail_url.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("{status} from {url}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<PaymentLink>()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("invalid link response: {e}")))
    }

    /// Check that `raw_body` was signed by the processor.
    ///
    /// `Ok(false)` for any bad signature, `Err` only when the key cannot be
    /// obtained.
    pub async fn verify_notification(&self, raw_body: &[u8], signature_header: &str) -> Result<bool, GatewayError> {
        if self.is_offline() {
            return Ok(true);
        }

        let pem = self.keys.get_or_refresh().await?;
        Ok(signature::verify(&pem, raw_body, signature_header))
    }
}

fn offline_link(app_base_url: &Url, request: &LinkRequest) -> Result<PaymentLink, GatewayError> {
    let base = app_base_url.as_str().trim_end_matches('/');
    let url = Url::parse_with_params(
        &format!("{base}/testpay"),
        &[
            ("user_id", request.user_id.to_string()),
            ("plan", request.plan.clone()),
            ("amount", format!("{:.2}", request.amount)),
            ("orderId", request.order_ref.to_string()),
        ],
    )
    .map_err(|e| GatewayError::Misconfigured(format!("offline link: {e}")))?;

    Ok(PaymentLink {
        url: url.into(),
        link_id: "offline".to_string(),
        status: "Opened".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::OrderRef;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    fn request() -> LinkRequest {
        LinkRequest {
            user_id: 42,
            amount: 100.0,
            plan: "Week".into(),
            order_ref: OrderRef::new("tg-42-abc"),
            success_url: None,
            fail_url: None,
        }
    }

    async fn links_server(status: StatusCode) -> String {
        let app = Router::new().route(
            "/links",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("");
                if auth != "Bearer secret" {
                    return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "auth"})));
                }
                (
                    status,
                    Json(serde_json::json!({
                        "id": "link-1",
                        "url": format!("https://pay.example/{}", body["orderId"].as_str().unwrap_or("")),
                        "status": "Opened",
                        "description": body["description"],
                    })),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn live_config(base_url: &str, token: &str) -> PaymentsConfig {
        PaymentsConfig {
            base_url: base_url.to_string(),
            token: Some(token.to_string()),
            ..PaymentsConfig::default()
        }
    }

    #[test]
    fn test_missing_token_is_not_offline() {
        let err = PaymentGateway::from_config(&PaymentsConfig::default()).err().unwrap();
        assert!(matches!(err, GatewayError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn test_offline_link_is_deterministic() {
        let gateway = PaymentGateway::from_config(&PaymentsConfig {
            offline: true,
            app_base_url: Some("https://gate.example/".into()),
            ..PaymentsConfig::default()
        })
        .unwrap();

        let link = gateway.create_payment_link(&request()).await.unwrap();
        assert_eq!(
            link.url,
            "https://gate.example/testpay?user_id=42&plan=Week&amount=100.00&orderId=tg-42-abc"
        );
        assert_eq!(link.link_id, "offline");
        assert_eq!(link.status, "Opened");
        assert!(gateway.verify_notification(b"{}", "garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_live_link_created() {
        let base = links_server(StatusCode::OK).await;
        let gateway = PaymentGateway::from_config(&live_config(&base, "secret")).unwrap();

        let link = gateway.create_payment_link(&request()).await.unwrap();
        assert_eq!(link.url, "https://pay.example/tg-42-abc");
        assert_eq!(link.link_id, "link-1");
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let base = links_server(StatusCode::OK).await;
        let gateway = PaymentGateway::from_config(&live_config(&base, "wrong")).unwrap();

        let err = gateway.create_payment_link(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let base = links_server(StatusCode::BAD_GATEWAY).await;
        let gateway = PaymentGateway::from_config(&live_config(&base, "secret")).unwrap();

        let err = gateway.create_payment_link(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_processor_is_unavailable() {
        let gateway = PaymentGateway::from_config(&live_config("http://127.0.0.1:1", "secret")).unwrap();
        let err = gateway.create_payment_link(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }
}
