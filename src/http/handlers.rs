//! Webhook and health endpoints.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::http::request::peer_key;
use crate::http::server::AppState;
use crate::payments::IngestError;
use crate::telegram::Update;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    let timestamp = state.clock.now().to_rfc3339();
    match state.store.ping().await {
        Ok(()) => Json(json!({ "ok": true, "timestamp": timestamp })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ok": false, "timestamp": timestamp })),
            )
                .into_response()
        }
    }
}

/// `POST /payment_webhook`: processor notification, verified over the raw body.
pub async fn payment_webhook(State(state): State<AppState>, request: Request<Body>) -> Response {
    let source = peer_key(&request);
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let raw = match to_bytes(request.into_body(), state.config.listener.max_body_bytes).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(source = %source, error = %e, "Could not read payment notification body");
            return (StatusCode::BAD_REQUEST, "Unreadable body").into_response();
        }
    };

    match state.ingestor.ingest_from(&source, &raw, signature.as_deref()).await {
        Ok(outcome) => {
            tracing::debug!(outcome = ?outcome, "Payment notification handled");
            Json(json!({ "ok": true })).into_response()
        }
        Err(IngestError::SignatureInvalid) => (StatusCode::BAD_REQUEST, "Invalid signature").into_response(),
        Err(IngestError::Gateway(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "Verification temporarily unavailable").into_response()
        }
        Err(IngestError::Store(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Could not record payment").into_response()
        }
    }
}

/// `POST /telegram/webhook`: Bot API update push.
///
/// Always acknowledged so the platform does not redeliver; handling runs in
/// the background.
pub async fn telegram_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = state.config.telegram.webhook_secret.as_deref() {
        let given = headers.get(TELEGRAM_SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            tracing::warn!("Telegram webhook called with a wrong secret token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let Some(bot) = state.bot.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "Bad Telegram update payload");
            return Json(json!({ "ok": false })).into_response();
        }
    };

    tokio::spawn(async move { bot.dispatch(update).await });
    Json(json!({ "ok": true })).into_response()
}
