//! Bot API wire types. Only the fields the bot reads or writes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::subscriptions::AccessError;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// One button per row.
    pub fn column(buttons: Vec<InlineKeyboardButton>) -> Self {
        Self {
            inline_keyboard: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatInviteLink {
    pub invite_link: String,
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<u16>,
}

/// Errors from the Bot API client.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Network failure, timeout, rate limit or server error.
    #[error("telegram unavailable: {0}")]
    Unavailable(String),

    /// The API answered `ok: false` with a client error.
    #[error("telegram api error {code}: {description}")]
    Api { code: u16, description: String },
}

impl TelegramError {
    pub(crate) fn from_response(code: Option<u16>, description: Option<String>) -> Self {
        let description = description.unwrap_or_else(|| "no description".to_string());
        match code {
            Some(code) if code == 429 || code >= 500 => Self::Unavailable(format!("{code}: {description}")),
            Some(code) => Self::Api { code, description },
            None => Self::Unavailable(description),
        }
    }
}

impl From<TelegramError> for AccessError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::Unavailable(msg) => AccessError::Unavailable(msg),
            TelegramError::Api { code, description } => AccessError::Rejected(format!("{code}: {description}")),
        }
    }
}
