//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order: store, plans, access
//!   control, gateway, grant engine, ingestion, sweeper, chat adapter
//! - Start background tasks (sweeper, update poller, signal watcher)
//! - Serve HTTP until shutdown, then drain background tasks
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Clock and access-control collaborators can be injected, which is how
//!   integration tests drive the full stack with a manual clock

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{GateConfig, UpdateMode};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::payments::{GatewayError, PaymentGateway, WebhookIngestor};
use crate::resilience::RetryPolicy;
use crate::security::SignatureAlarm;
use crate::store::{StoreError, SubscriptionStore};
use crate::subscriptions::{
    AccessRestorer, AccessRevoker, Clock, ExpirySweeper, GrantEngine, LoggingAccess, PlanTable, SystemClock,
};
use crate::telegram::{BotDispatcher, TelegramClient, TelegramError, UpdatePoller};

/// Bound on waiting for background tasks after the server stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Replaceable collaborators. Unset fields use the production defaults.
#[derive(Default)]
pub struct Collaborators {
    pub clock: Option<Arc<dyn Clock>>,
    pub revoker: Option<Arc<dyn AccessRevoker>>,
    pub restorer: Option<Arc<dyn AccessRestorer>>,
    pub store: Option<SubscriptionStore>,
}

/// A fully wired gate, ready to serve.
pub struct App {
    state: AppState,
    sweeper: Arc<ExpirySweeper>,
    poller: Option<UpdatePoller>,
    shutdown: Shutdown,
}

impl App {
    pub async fn build(config: GateConfig) -> Result<Self, StartupError> {
        Self::build_with(config, Collaborators::default()).await
    }

    pub async fn build_with(config: GateConfig, collaborators: Collaborators) -> Result<Self, StartupError> {
        let config = Arc::new(config);

        let store = match collaborators.store {
            Some(store) => store,
            None => SubscriptionStore::connect(&config.store).await?,
        };

        let plans = Arc::new(PlanTable::from_config(&config.plans));
        tracing::info!(plans = plans.len(), "Plan table loaded");

        let clock: Arc<dyn Clock> = collaborators.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let telegram = if config.telegram.enabled {
            Some(Arc::new(TelegramClient::from_config(&config.telegram)?))
        } else {
            tracing::warn!("Chat platform disabled; access changes will only be logged");
            None
        };

        let revoker: Arc<dyn AccessRevoker> = match (collaborators.revoker, &telegram) {
            (Some(revoker), _) => revoker,
            (None, Some(client)) => client.clone(),
            (None, None) => Arc::new(LoggingAccess),
        };
        let restorer: Arc<dyn AccessRestorer> = match (collaborators.restorer, &telegram) {
            (Some(restorer), _) => restorer,
            (None, Some(client)) => client.clone(),
            (None, None) => Arc::new(LoggingAccess),
        };

        let gateway = Arc::new(PaymentGateway::from_config(&config.payments)?);
        if gateway.is_offline() {
            tracing::warn!("Payments running in offline mode; no real processor is contacted");
        }

        let grants = Arc::new(GrantEngine::new(
            store.clone(),
            plans.clone(),
            clock.clone(),
            restorer,
            RetryPolicy::from(&config.restore),
        ));

        let ingestor = Arc::new(WebhookIngestor::new(
            gateway.clone(),
            grants,
            SignatureAlarm::new(config.security.signature_alarm_per_minute),
        ));

        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            revoker,
            clock.clone(),
            config.sweeper.clone(),
        ));

        let bot = telegram.as_ref().map(|client| {
            Arc::new(BotDispatcher::new(
                client.clone(),
                gateway.clone(),
                store.clone(),
                plans.clone(),
                clock.clone(),
                config.telegram.admin_contact.clone(),
            ))
        });

        let poller = match (&telegram, &bot) {
            (Some(client), Some(bot)) if config.telegram.mode == UpdateMode::Polling => Some(UpdatePoller::new(
                client.clone(),
                bot.clone(),
                Duration::from_secs(config.telegram.poll_timeout_secs),
                RetryPolicy::from(&config.restore),
            )),
            _ => None,
        };

        let state = AppState {
            config,
            store,
            gateway,
            ingestor,
            sweeper: sweeper.clone(),
            bot,
            clock,
            started_at: Instant::now(),
        };

        Ok(Self {
            state,
            sweeper,
            poller,
            shutdown: Shutdown::new(),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn sweeper(&self) -> Arc<ExpirySweeper> {
        self.sweeper.clone()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        HttpServer::new(self.state.clone()).router()
    }

    /// Serve until SIGINT/SIGTERM or until the shutdown handle is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), StartupError> {
        let Self {
            state,
            sweeper,
            poller,
            shutdown,
        } = self;

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(sweeper.run(shutdown.subscribe())));
        if let Some(poller) = poller {
            tasks.push(tokio::spawn(poller.run(shutdown.subscribe())));
        }

        let signal_shutdown = shutdown.clone();
        let signal_task = tokio::spawn(async move {
            signals::wait_for_shutdown_signal().await;
            signal_shutdown.trigger();
        });

        let store = state.store.clone();
        let result = HttpServer::new(state).run(listener, shutdown.subscribe()).await;

        // The server may also stop on its own error; make sure the rest follows.
        shutdown.trigger();
        signal_task.abort();

        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "Background tasks did not stop in time");
        }

        store.close().await;
        tracing::info!("Shutdown complete");
        result.map_err(StartupError::from)
    }
}
