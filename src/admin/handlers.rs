use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::server::AppState;
use crate::store::UserId;
use crate::subscriptions::TickOutcome;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub offline_payments: bool,
    pub chat_platform: bool,
    pub sweeper_running: bool,
}

#[derive(Serialize)]
pub struct SubscriptionView {
    pub plan: String,
    pub expires_at: DateTime<Utc>,
    pub order_ref: Option<String>,
    pub active: bool,
}

#[derive(Serialize)]
pub struct UserSubscriptions {
    pub user_id: UserId,
    pub active: bool,
    pub subscriptions: Vec<SubscriptionView>,
}

fn store_unavailable(e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, "Admin request failed: store unavailable");
    (StatusCode::SERVICE_UNAVAILABLE, "Subscription store unavailable").into_response()
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        offline_payments: state.gateway.is_offline(),
        chat_platform: state.bot.is_some(),
        sweeper_running: state.sweeper.is_running(),
    })
}

pub async fn get_summary(State(state): State<AppState>) -> Response {
    match state.store.summary(state.clock.now()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => store_unavailable(e),
    }
}

pub async fn get_user_subscriptions(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Response {
    let rows = match state.store.list_by_user(user_id).await {
        Ok(rows) => rows,
        Err(e) => return store_unavailable(e),
    };

    let now = state.clock.now();
    let subscriptions: Vec<SubscriptionView> = rows
        .into_iter()
        .map(|row| SubscriptionView {
            active: row.is_active_at(now),
            plan: row.plan,
            expires_at: row.expires_at,
            order_ref: row.order_ref,
        })
        .collect();

    Json(UserSubscriptions {
        user_id,
        active: subscriptions.iter().any(|s| s.active),
        subscriptions,
    })
    .into_response()
}

pub async fn trigger_sweep(State(state): State<AppState>) -> Response {
    match state.sweeper.tick().await {
        TickOutcome::Completed(report) => Json(report).into_response(),
        TickOutcome::Skipped => (StatusCode::CONFLICT, "Sweep already running").into_response(),
        TickOutcome::Failed(e) => store_unavailable(e),
    }
}
