//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every endpoint the gate exposes
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Serve until the shutdown broadcast fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::GateConfig;
use crate::http::handlers::{health, payment_webhook, telegram_webhook};
use crate::http::request::{make_span, propagate_request_id_layer, set_request_id_layer};
use crate::http::testpay::{testpay_confirm, testpay_page};
use crate::payments::{PaymentGateway, WebhookIngestor};
use crate::store::SubscriptionStore;
use crate::subscriptions::{Clock, ExpirySweeper};
use crate::telegram::BotDispatcher;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub store: SubscriptionStore,
    pub gateway: Arc<PaymentGateway>,
    pub ingestor: Arc<WebhookIngestor>,
    pub sweeper: Arc<ExpirySweeper>,
    /// Present when the chat platform adapter is enabled.
    pub bot: Option<Arc<BotDispatcher>>,
    pub clock: Arc<dyn Clock>,
    pub started_at: Instant,
}

/// HTTP front of the gate.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
///
/// Offline test-payment routes and the chat webhook are mounted only when
/// their mode is configured.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/payment_webhook", post(payment_webhook));

    if state.bot.is_some() {
        router = router.route("/telegram/webhook", post(telegram_webhook));
    }

    if state.gateway.is_offline() {
        tracing::warn!("Offline payment mode: /testpay routes are mounted and notifications are not verified");
        router = router
            .route("/testpay", get(testpay_page))
            .route("/testpay/confirm", post(testpay_confirm));
    }

    if config.admin.enabled {
        router = router.merge(admin::setup_admin_router(state.clone()));
    }

    router
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(set_request_id_layer())
}
