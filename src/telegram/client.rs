//! Telegram Bot API client.
//!
//! # Responsibilities
//! - Send and edit bot messages
//! - Restrict and unrestrict channel members, issue single-use invites
//! - Pull updates for polling mode
//!
//! # Design Decisions
//! - Rate limits (429) and 5xx count as unavailable so callers may retry;
//!   every other `ok: false` is a rejection
//! - Notifying the user about a revocation is best effort and never turns a
//!   successful ban into a failure

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::TelegramConfig;
use crate::store::UserId;
use crate::subscriptions::{AccessError, AccessRestorer, AccessRevoker};
use crate::telegram::types::{ApiResponse, ChatInviteLink, InlineKeyboardMarkup, TelegramError, Update};

pub struct TelegramClient {
    client: reqwest::Client,
    base: String,
    channel_id: i64,
    invite_ttl: chrono::Duration,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn from_config(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TelegramError::Unavailable(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", config.api_base_url.trim_end_matches('/'), config.token),
            channel_id: config.channel_id,
            invite_ttl: chrono::Duration::seconds(config.invite_ttl_secs as i64),
            request_timeout,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let mut request = self.client.post(format!("{}/{method}", self.base)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TelegramError::Unavailable(format!("{method}: {}", e.without_url())))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::Unavailable(format!("{method}: invalid response ({status}): {e}")))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(TelegramError::from_response(error_code.or(Some(status.as_u16())), description)),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = markup {
            body["reply_markup"] = json!(markup);
        }
        self.call::<serde_json::Value>("sendMessage", body, None).await?;
        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(markup) = markup {
            body["reply_markup"] = json!(markup);
        }
        self.call::<serde_json::Value>("editMessageText", body, None).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        self.call::<bool>("answerCallbackQuery", json!({ "callback_query_id": callback_query_id }), None)
            .await?;
        Ok(())
    }

    pub async fn ban_chat_member(&self, user_id: UserId) -> Result<(), TelegramError> {
        self.call::<bool>(
            "banChatMember",
            json!({ "chat_id": self.channel_id, "user_id": user_id }),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn unban_chat_member(&self, user_id: UserId) -> Result<(), TelegramError> {
        self.call::<bool>(
            "unbanChatMember",
            json!({ "chat_id": self.channel_id, "user_id": user_id, "only_if_banned": true }),
            None,
        )
        .await?;
        Ok(())
    }

    /// A one-member invite link that expires at `expire_at`.
    pub async fn create_invite_link(&self, expire_at: DateTime<Utc>) -> Result<String, TelegramError> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": self.channel_id,
                    "member_limit": 1,
                    "expire_date": expire_at.timestamp(),
                }),
                None,
            )
            .await?;
        Ok(link.invite_link)
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, poll_timeout: Duration) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": poll_timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }),
            Some(poll_timeout + self.request_timeout),
        )
        .await
    }

    /// Remove any webhook so `getUpdates` is allowed.
    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        self.call::<bool>("deleteWebhook", json!({ "drop_pending_updates": true }), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AccessRevoker for TelegramClient {
    async fn revoke(&self, user_id: UserId, plan: &str) -> Result<(), AccessError> {
        self.ban_chat_member(user_id).await?;

        let text = format!("Your {plan} subscription has expired and channel access was removed. Send /start to renew.");
        if let Err(e) = self.send_message(user_id, &text, None).await {
            tracing::debug!(user_id, error = %e, "Could not notify user about expiry");
        }
        Ok(())
    }
}

#[async_trait]
impl AccessRestorer for TelegramClient {
    async fn restore(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<(), AccessError> {
        self.unban_chat_member(user_id).await?;

        let invite_expiry = (Utc::now() + self.invite_ttl).min(expires_at);
        let invite = self.create_invite_link(invite_expiry).await?;

        let text = format!(
            "Payment received. Your {plan} subscription is active until {} UTC.\nJoin the channel: {invite}",
            expires_at.format("%d.%m.%Y %H:%M")
        );
        self.send_message(user_id, &text, None).await?;
        Ok(())
    }
}
