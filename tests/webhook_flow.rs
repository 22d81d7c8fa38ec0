//! Payment link → processor callback → grant, over the HTTP surface.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Duration;
use tower::ServiceExt;

use channel_gate::payments::{LinkRequest, OrderRef};

use common::{build_app, eventually, live_config, offline_config, sign, start_mock_processor, t0};

const FIXTURE_BODY: &str = include_str!("fixtures/closed_notification.json");
const FIXTURE_SIGNATURE: &str = include_str!("fixtures/closed_notification.sig");

fn notification(order_id: &str, plan: &str, user_id: i64) -> String {
    serde_json::json!({
        "status": "Closed",
        "orderId": order_id,
        "description": format!("{plan} user {user_id}"),
        "amount": 100.0,
    })
    .to_string()
}

async fn post_webhook(router: &Router, body: &str, signature: Option<&str>) -> StatusCode {
    let mut request = Request::builder().method("POST").uri("/payment_webhook");
    if let Some(signature) = signature {
        request = request.header("x-signature", signature);
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_link_callback_grant_round_trip() {
    let (processor, recorded) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();

    let order_ref = OrderRef::generate(42);
    let link = test
        .app
        .state()
        .gateway
        .create_payment_link(&LinkRequest {
            user_id: 42,
            amount: 100.0,
            plan: "Week".into(),
            order_ref: order_ref.clone(),
            success_url: None,
            fail_url: None,
        })
        .await
        .unwrap();
    assert_eq!(link.url, format!("https://pay.example/{order_ref}"));

    let sent = recorded.all();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1["description"], "Week user 42");
    assert_eq!(sent[0].1["orderId"], order_ref.as_str());
    assert_eq!(sent[0].1["currency"], "RUB");

    // The processor calls back with the same order reference.
    let body = notification(order_ref.as_str(), "Week", 42);
    assert_eq!(post_webhook(&router, &body, Some(&sign(body.as_bytes()))).await, StatusCode::OK);

    let rows = test.store.list_by_user(42).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].plan, "Week");
    assert_eq!(rows[0].expires_at, t0() + Duration::days(7));
    assert_eq!(rows[0].order_ref.as_deref(), Some(order_ref.as_str()));

    let access = test.access.clone();
    eventually(|| access.restored_users() == vec![42]).await;
}

#[tokio::test]
async fn test_replayed_notification_grants_once() {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();

    let body = notification("tg-42-replay", "Week", 42);
    let signature = sign(body.as_bytes());

    assert_eq!(post_webhook(&router, &body, Some(&signature)).await, StatusCode::OK);
    test.clock.advance(Duration::hours(1));
    assert_eq!(post_webhook(&router, &body, Some(&signature)).await, StatusCode::OK);

    let rows = test.store.list_by_user(42).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].expires_at, t0() + Duration::days(7));

    let access = test.access.clone();
    eventually(|| !access.restored_users().is_empty()).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(test.access.restored_users(), vec![42]);
}

#[tokio::test]
async fn test_invalid_signature_changes_nothing() {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();

    let body = notification("tg-42-forged", "Month", 42);
    let signature = sign(body.as_bytes());
    let tampered = body.replace("Month", "Week");

    assert_eq!(
        post_webhook(&router, &tampered, Some(&signature)).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(post_webhook(&router, &body, None).await, StatusCode::BAD_REQUEST);
    assert_eq!(
        post_webhook(&router, &body, Some("bm90IGEgc2lnbmF0dXJl")).await,
        StatusCode::BAD_REQUEST
    );

    assert!(test.store.list_by_user(42).await.unwrap().is_empty());
    assert!(test.access.restored_users().is_empty());
}

#[tokio::test]
async fn test_fixture_notification_verifies_on_exact_bytes() {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();

    assert_eq!(
        post_webhook(&router, FIXTURE_BODY, Some(FIXTURE_SIGNATURE.trim())).await,
        StatusCode::OK
    );

    let rows = test.store.list_by_user(42).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].order_ref.as_deref(), Some("tg-42-abc"));
}

#[tokio::test]
async fn test_unreachable_key_source_fails_closed() {
    let test = build_app(live_config("http://127.0.0.1:1")).await;
    let router = test.app.router();

    let body = notification("tg-42-a", "Week", 42);
    assert_eq!(
        post_webhook(&router, &body, Some(&sign(body.as_bytes()))).await,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert!(test.store.list_by_user(42).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_verified_but_unusable_notifications_are_acknowledged() {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();

    let pending = serde_json::json!({ "status": "Opened", "orderId": "tg-42-a", "description": "Week user 42" }).to_string();
    let no_user = notification("shop-17", "Week", 42);
    let unknown_plan = notification("tg-42-b", "Forever", 42);

    for body in [pending, no_user, unknown_plan, "{}".to_string()] {
        assert_eq!(post_webhook(&router, &body, Some(&sign(body.as_bytes()))).await, StatusCode::OK);
    }
    assert!(test.store.list_by_user(42).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_asks_processor_to_retry() {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;
    let router = test.app.router();
    test.store.close().await;

    let body = notification("tg-42-a", "Week", 42);
    assert_eq!(
        post_webhook(&router, &body, Some(&sign(body.as_bytes()))).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(test.access.restored_users().is_empty());
}

#[tokio::test]
async fn test_offline_link_confirmation_grants_like_processor() {
    let test = build_app(offline_config()).await;
    let router = test.app.router();

    let link = test
        .app
        .state()
        .gateway
        .create_payment_link(&LinkRequest {
            user_id: 77,
            amount: 100.0,
            plan: "Week".into(),
            order_ref: OrderRef::new("tg-77-offline"),
            success_url: None,
            fail_url: None,
        })
        .await
        .unwrap();
    assert_eq!(
        link.url,
        "http://gate.local/testpay?user_id=77&plan=Week&amount=100.00&orderId=tg-77-offline"
    );

    let path = link.url.trim_start_matches("http://gate.local");
    let page = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let html = to_bytes(page.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&html).contains(r#"name="orderId" value="tg-77-offline""#));

    let confirm = || {
        Request::builder()
            .method("POST")
            .uri("/testpay/confirm")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("user_id=77&plan=Week&amount=100.00&orderId=tg-77-offline"))
            .unwrap()
    };
    assert_eq!(router.clone().oneshot(confirm()).await.unwrap().status(), StatusCode::OK);
    assert_eq!(router.clone().oneshot(confirm()).await.unwrap().status(), StatusCode::OK);

    let rows = test.store.list_by_user(77).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].expires_at, t0() + Duration::days(7));
    assert_eq!(rows[0].order_ref.as_deref(), Some("tg-77-offline"));
}

#[tokio::test]
async fn test_testpay_routes_absent_outside_offline_mode() {
    let (processor, _) = start_mock_processor().await;
    let test = build_app(live_config(&processor)).await;

    let response = test
        .app
        .router()
        .oneshot(
            Request::builder()
                .uri("/testpay?user_id=1&plan=Week&amount=1.00&orderId=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
