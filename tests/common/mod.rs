//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::Sha512;
use tokio::net::TcpListener;

use channel_gate::config::GateConfig;
use channel_gate::lifecycle::{App, Collaborators};
use channel_gate::store::{SubscriptionStore, UserId};
use channel_gate::subscriptions::{AccessError, AccessRestorer, AccessRevoker, ManualClock};

pub const PROCESSOR_PRIVATE_KEY: &str = include_str!("../fixtures/processor_private.pem");
pub const PROCESSOR_PUBLIC_KEY: &str = include_str!("../fixtures/processor_public.pem");
pub const ADMIN_KEY: &str = "test-admin-key";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Base64 RSA/SHA-512 signature over `body`, as the processor sends it.
pub fn sign(body: &[u8]) -> String {
    let key = RsaPrivateKey::from_pkcs8_pem(PROCESSOR_PRIVATE_KEY).unwrap();
    let signature = SigningKey::<Sha512>::new(key).sign(body);
    STANDARD.encode(signature.to_bytes())
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Requests received by a mock server, as `(path, body)`.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<(String, Value)>>>);

impl Recorded {
    fn push(&self, path: String, body: Value) {
        self.0.lock().unwrap().push((path, body));
    }

    pub fn all(&self) -> Vec<(String, Value)> {
        self.0.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.all().into_iter().map(|(p, _)| p).collect()
    }
}

/// Mock payment processor: serves the public key and creates links.
pub async fn start_mock_processor() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            "/public-key",
            get(|| async { Json(json!({ "value": PROCESSOR_PUBLIC_KEY })) }),
        )
        .route(
            "/links",
            post(|State(recorded): State<Recorded>, Json(body): Json<Value>| async move {
                recorded.push("/links".to_string(), body.clone());
                let order_id = body["orderId"].as_str().unwrap_or_default().to_string();
                Json(json!({
                    "id": format!("link-{order_id}"),
                    "url": format!("https://pay.example/{order_id}"),
                    "status": "Opened",
                }))
            }),
        )
        .with_state(recorded.clone());
    (serve(app).await, recorded)
}

/// Mock Bot API: records every method call and answers `ok: true`.
pub async fn start_mock_telegram() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            "/{bot}/{method}",
            post(
                |State(recorded): State<Recorded>, Path((_bot, method)): Path<(String, String)>, Json(body): Json<Value>| async move {
                    recorded.push(method.clone(), body);
                    let result = match method.as_str() {
                        "createChatInviteLink" => json!({ "invite_link": "https://t.me/+invite" }),
                        "sendMessage" | "editMessageText" => json!({ "message_id": 1 }),
                        "getUpdates" => json!([]),
                        _ => json!(true),
                    };
                    Json(json!({ "ok": true, "result": result }))
                },
            ),
        )
        .with_state(recorded.clone());
    (serve(app).await, recorded)
}

/// Access control that records calls and fails for selected users.
#[derive(Default)]
pub struct RecordingAccess {
    pub revoked: Mutex<Vec<(UserId, String)>>,
    pub restored: Mutex<Vec<(UserId, String, DateTime<Utc>)>>,
    pub fail_revoke_for: Mutex<Vec<UserId>>,
}

impl RecordingAccess {
    pub fn revoked_users(&self) -> Vec<UserId> {
        self.revoked.lock().unwrap().iter().map(|(u, _)| *u).collect()
    }

    pub fn restored_users(&self) -> Vec<UserId> {
        self.restored.lock().unwrap().iter().map(|(u, _, _)| *u).collect()
    }
}

#[async_trait]
impl AccessRevoker for RecordingAccess {
    async fn revoke(&self, user_id: UserId, plan: &str) -> Result<(), AccessError> {
        self.revoked.lock().unwrap().push((user_id, plan.to_string()));
        if self.fail_revoke_for.lock().unwrap().contains(&user_id) {
            return Err(AccessError::Rejected("user not found".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessRestorer for RecordingAccess {
    async fn restore(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<(), AccessError> {
        self.restored.lock().unwrap().push((user_id, plan.to_string(), expires_at));
        Ok(())
    }
}

/// Config against a live (mock) processor with the admin API enabled.
pub fn live_config(processor_base: &str) -> GateConfig {
    let mut config = GateConfig::default();
    config.payments.base_url = processor_base.to_string();
    config.payments.token = Some("test-token".to_string());
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.sweeper.enabled = false;
    config.restore.base_delay_ms = 1;
    config.restore.max_delay_ms = 2;
    config
}

/// Config in offline payment mode with no processor credentials.
pub fn offline_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.payments.offline = true;
    config.payments.token = None;
    config.payments.app_base_url = Some("http://gate.local".to_string());
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.sweeper.enabled = false;
    config
}

pub struct TestApp {
    pub app: App,
    pub store: SubscriptionStore,
    pub clock: Arc<ManualClock>,
    pub access: Arc<RecordingAccess>,
}

/// Build the whole gate on an in-memory store with a manual clock at `t0()`.
pub async fn build_app(config: GateConfig) -> TestApp {
    let store = SubscriptionStore::in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let access = Arc::new(RecordingAccess::default());

    let app = App::build_with(
        config,
        Collaborators {
            clock: Some(clock.clone()),
            revoker: Some(access.clone()),
            restorer: Some(access.clone()),
            store: Some(store.clone()),
        },
    )
    .await
    .unwrap();

    TestApp {
        app,
        store,
        clock,
        access,
    }
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
