//! Expiry sweeps over grants made through the webhook, plus the admin API.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Duration;
use serde_json::Value;
use tower::ServiceExt;

use channel_gate::config::TelegramConfig;
use channel_gate::subscriptions::{AccessRestorer, AccessRevoker, Clock, SweepReport, TickOutcome};
use channel_gate::telegram::TelegramClient;

use common::{build_app, live_config, sign, start_mock_processor, start_mock_telegram, t0, TestApp, ADMIN_KEY};

async fn paid(router: &Router, order_id: &str, plan: &str, user_id: i64) {
    let body = serde_json::json!({
        "status": "Closed",
        "orderId": order_id,
        "description": format!("{plan} user {user_id}"),
    })
    .to_string();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payment_webhook")
                .header("x-signature", sign(body.as_bytes()))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn live_app() -> (TestApp, Router) {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();
    (test, router)
}

fn completed(outcome: TickOutcome) -> SweepReport {
    match outcome {
        TickOutcome::Completed(report) => report,
        other => panic!("sweep did not complete: {other:?}"),
    }
}

async fn admin(router: &Router, method: &str, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        request = request.header("authorization", format!("Bearer {key}"));
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_week_purchase_lapses_and_is_revoked() {
    let (test, router) = live_app().await;
    paid(&router, "tg-7-week", "Week", 7).await;

    // Still inside the week: nothing happens.
    test.clock.set(t0() + Duration::days(6));
    let report = completed(test.app.sweeper().tick().await);
    assert_eq!(report.active, 1);
    assert_eq!(report.expired, 0);
    assert!(test.access.revoked_users().is_empty());

    test.clock.set(t0() + Duration::days(7) + Duration::seconds(1));
    let report = completed(test.app.sweeper().tick().await);
    assert_eq!(report.expired, 1);
    assert_eq!(report.revoked, 1);
    assert_eq!(report.deleted_rows, 1);

    let revoked = test.access.revoked.lock().unwrap().clone();
    assert_eq!(revoked, vec![(7, "Week".to_string())]);
    assert!(test.store.list_by_user(7).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_overlapping_purchases_keep_latest_expiry() {
    let (test, router) = live_app().await;
    paid(&router, "tg-8-week", "Week", 8).await;
    test.clock.advance(Duration::days(1));
    paid(&router, "tg-8-month", "Month", 8).await;

    let rows = test.store.list_by_user(8).await.unwrap();
    assert_eq!(rows.len(), 2);
    let max = rows.iter().map(|r| r.expires_at).max().unwrap();
    assert_eq!(max, t0() + Duration::days(31));

    // The week row has lapsed but the month row keeps the user active.
    test.clock.set(t0() + Duration::days(10));
    let report = completed(test.app.sweeper().tick().await);
    assert_eq!(report.active, 1);
    assert_eq!(report.expired, 0);
    assert!(test.access.revoked_users().is_empty());
    assert_eq!(test.store.list_by_user(8).await.unwrap().len(), 2);

    test.clock.set(t0() + Duration::days(31));
    let report = completed(test.app.sweeper().tick().await);
    assert_eq!(report.revoked, 1);
    assert_eq!(report.deleted_rows, 2);
    assert_eq!(test.access.revoked.lock().unwrap()[0].1, "Month");
}

#[tokio::test]
async fn test_expiry_exactly_now_counts_as_lapsed() {
    let (test, router) = live_app().await;
    paid(&router, "tg-9-week", "Week", 9).await;

    test.clock.set(t0() + Duration::days(7) - Duration::milliseconds(1));
    completed(test.app.sweeper().tick().await);
    assert!(test.access.revoked_users().is_empty());

    test.clock.set(t0() + Duration::days(7));
    let report = completed(test.app.sweeper().tick().await);
    assert_eq!(report.revoked, 1);
    assert_eq!(test.access.revoked_users(), vec![9]);
}

#[tokio::test]
async fn test_unreachable_user_is_still_pruned() {
    let (test, router) = live_app().await;
    paid(&router, "tg-10-a", "Week", 10).await;
    paid(&router, "tg-11-a", "Week", 11).await;
    test.access.fail_revoke_for.lock().unwrap().push(10);

    test.clock.advance(Duration::days(8));
    let report = completed(test.app.sweeper().tick().await);
    assert_eq!(report.revoked, 1);
    assert_eq!(report.revoke_failures, 1);
    assert_eq!(report.deleted_rows, 2);

    assert!(test.store.list_by_user(10).await.unwrap().is_empty());
    assert!(test.store.list_by_user(11).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_active_user_is_ever_revoked() {
    let (test, router) = live_app().await;
    let plans = ["Week", "Month", "Chat", "Test"];

    for step in 0..24i64 {
        let user = 100 + step % 5;
        let plan = plans[(step % 4) as usize];
        paid(&router, &format!("tg-{user}-{step}"), plan, user).await;
        test.clock.advance(Duration::hours(17 * (step % 3) + 1));

        let before = test.store.max_expiry_per_user().await.unwrap();
        let revoked_before = test.access.revoked_users().len();
        let now = test.clock.now();
        completed(test.app.sweeper().tick().await);

        let revoked = test.access.revoked_users();
        for user_id in &revoked[revoked_before..] {
            let (_, max_expiry) = before.iter().find(|(u, _)| u == user_id).unwrap();
            assert!(*max_expiry <= now, "user {user_id} revoked while active");
        }
        for (user_id, max_expiry) in &before {
            if *max_expiry > now {
                assert!(!test.store.list_by_user(*user_id).await.unwrap().is_empty());
            }
        }
    }
}

#[tokio::test]
async fn test_admin_api_requires_key() {
    let (_test, router) = live_app().await;

    let (status, _) = admin(&router, "GET", "/admin/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = admin(&router, "POST", "/admin/sweep", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = admin(&router, "GET", "/admin/status", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["offline_payments"], false);
    assert_eq!(body["chat_platform"], false);
}

#[tokio::test]
async fn test_admin_sweep_and_lookups() {
    let (test, router) = live_app().await;
    paid(&router, "tg-20-a", "Week", 20).await;
    paid(&router, "tg-21-a", "Month", 21).await;
    test.clock.advance(Duration::days(8));

    let (status, body) = admin(&router, "GET", "/admin/summary", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 2);
    assert_eq!(body["users"], 2);
    assert_eq!(body["active_users"], 1);

    let (status, body) = admin(&router, "GET", "/admin/subscriptions/20", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);
    assert_eq!(body["subscriptions"][0]["plan"], "Week");

    let (status, body) = admin(&router, "POST", "/admin/sweep", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 1);
    assert_eq!(body["revoked"], 1);
    assert_eq!(body["deleted_rows"], 1);

    let (_, body) = admin(&router, "GET", "/admin/subscriptions/21", Some(ADMIN_KEY)).await;
    assert_eq!(body["active"], true);
    assert_eq!(test.access.revoked_users(), vec![20]);
}

#[tokio::test]
async fn test_telegram_client_restores_and_revokes_membership() {
    let (api, recorded) = start_mock_telegram().await;
    let client = TelegramClient::from_config(&TelegramConfig {
        enabled: true,
        token: "123:abc".to_string(),
        channel_id: -100_500,
        api_base_url: api,
        ..TelegramConfig::default()
    })
    .unwrap();

    client.restore(42, "Week", t0() + Duration::days(7)).await.unwrap();
    assert_eq!(
        recorded.paths(),
        vec!["unbanChatMember", "createChatInviteLink", "sendMessage"]
    );
    let calls = recorded.all();
    assert_eq!(calls[0].1["chat_id"], -100_500);
    assert_eq!(calls[0].1["user_id"], 42);
    assert_eq!(calls[1].1["member_limit"], 1);
    assert!(calls[2].1["text"].as_str().unwrap().contains("https://t.me/+invite"));

    client.revoke(42, "Week").await.unwrap();
    assert_eq!(recorded.paths()[3], "banChatMember");
}
