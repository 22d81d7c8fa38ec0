//! Offline-mode payment pages.
//!
//! `GET /testpay` renders the link produced by the offline gateway as a
//! confirmation form; `POST /testpay/confirm` feeds a `Closed` notification
//! straight into ingestion. Mounted only when `payments.offline` is set.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::http::server::AppState;
use crate::payments::{IngestOutcome, PaymentNotification, STATUS_PAID};

#[derive(Debug, Deserialize)]
pub struct TestPayParams {
    pub user_id: i64,
    pub plan: String,
    pub amount: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// `GET /testpay`
pub async fn testpay_page(Query(params): Query<TestPayParams>) -> Html<String> {
    let user_id = params.user_id.to_string();
    let fields = [
        ("user_id", user_id.as_str()),
        ("plan", params.plan.as_str()),
        ("amount", params.amount.as_str()),
        ("orderId", params.order_id.as_str()),
    ];
    let hidden: String = fields
        .iter()
        .map(|(name, value)| format!(r#"<input type="hidden" name="{name}" value="{}">"#, escape(value)))
        .collect();

    Html(format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Test payment</title></head>
<body>
<h1>Test payment</h1>
<p>Plan: <b>{plan}</b>, amount: <b>{amount}</b>, user: <b>{user_id}</b></p>
<form method="post" action="/testpay/confirm">{hidden}<button type="submit">Pay</button></form>
</body></html>"#,
        plan = escape(&params.plan),
        amount = escape(&params.amount),
        user_id = params.user_id,
    ))
}

/// `POST /testpay/confirm`
pub async fn testpay_confirm(State(state): State<AppState>, Form(params): Form<TestPayParams>) -> Response {
    let notification = PaymentNotification {
        status: STATUS_PAID.to_string(),
        order_id: Some(serde_json::Value::String(params.order_id.clone())),
        description: Some(format!("{} user {}", params.plan, params.user_id)),
        amount: params.amount.parse().ok(),
    };
    tracing::info!(user_id = params.user_id, plan = %params.plan, order_id = %params.order_id, "Offline payment confirmed");

    match state.ingestor.process_notification(notification).await {
        Ok(IngestOutcome::Granted { subscription, .. }) => Html(format!(
            "<p>Paid. {} active until {} UTC.</p>",
            escape(&subscription.plan),
            subscription.expires_at.format("%d.%m.%Y %H:%M")
        ))
        .into_response(),
        Ok(IngestOutcome::Duplicate { .. }) => Html("<p>This order was already paid.</p>".to_string()).into_response(),
        Ok(other) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(format!("<p>Payment not applied: {}</p>", escape(&format!("{other:?}")))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Offline payment could not be recorded");
            (StatusCode::INTERNAL_SERVER_ERROR, Html("<p>Could not record payment.</p>".to_string())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
