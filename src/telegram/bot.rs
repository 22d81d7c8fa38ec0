//! Bot menu dispatcher.
//!
//! Handles `/start` and the inline-keyboard callbacks: `buy`, `my_subs`,
//! `help`, `back` and `plan:<id>`. Everything else is ignored. Handler
//! failures are logged and never propagate to the update source.

use std::sync::Arc;

use crate::payments::{GatewayError, LinkRequest, OrderRef, PaymentGateway};
use crate::store::{Subscription, SubscriptionStore};
use crate::subscriptions::{Clock, PlanTable};
use crate::telegram::client::TelegramClient;
use crate::telegram::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, TelegramError, Update};

const PLAN_PREFIX: &str = "plan:";

/// A user action decoded from a command or callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Buy,
    MySubscriptions,
    Help,
    Back,
    Plan(String),
}

impl Action {
    pub fn from_command(text: &str) -> Option<Self> {
        let command = text.split_whitespace().next()?;
        // Group chats may address the bot as /start@name.
        match command.split('@').next()? {
            "/start" => Some(Self::Start),
            _ => None,
        }
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "buy" => Some(Self::Buy),
            "my_subs" => Some(Self::MySubscriptions),
            "help" => Some(Self::Help),
            "back" => Some(Self::Back),
            _ => data
                .strip_prefix(PLAN_PREFIX)
                .filter(|id| !id.is_empty())
                .map(|id| Self::Plan(id.to_string())),
        }
    }
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::column(vec![
        InlineKeyboardButton::callback("💳 Buy", "buy"),
        InlineKeyboardButton::callback("📋 My subscriptions", "my_subs"),
        InlineKeyboardButton::callback("❓ Help", "help"),
    ])
}

pub fn plans_menu(plans: &PlanTable) -> InlineKeyboardMarkup {
    let mut buttons: Vec<_> = plans
        .iter()
        .map(|plan| {
            InlineKeyboardButton::callback(
                format!("{} - {:.2}", plan.name, plan.price),
                format!("{PLAN_PREFIX}{}", plan.id),
            )
        })
        .collect();
    buttons.push(InlineKeyboardButton::callback("⬅️ Back", "back"));
    InlineKeyboardMarkup::column(buttons)
}

/// Render a user's rows as of `now`.
pub fn subscriptions_text(rows: &[Subscription], now: chrono::DateTime<chrono::Utc>) -> String {
    if rows.is_empty() {
        return "You have no subscriptions.".to_string();
    }

    let lines: Vec<String> = rows
        .iter()
        .map(|sub| {
            let status = if sub.is_active_at(now) { "✅ Active" } else { "⏰ Expired" };
            format!("• {} until {} UTC ({status})", sub.plan, sub.expires_at.format("%d.%m.%Y %H:%M"))
        })
        .collect();
    format!("Your subscriptions:\n\n{}", lines.join("\n"))
}

pub struct BotDispatcher {
    client: Arc<TelegramClient>,
    gateway: Arc<PaymentGateway>,
    store: SubscriptionStore,
    plans: Arc<PlanTable>,
    clock: Arc<dyn Clock>,
    admin_contact: String,
}

impl BotDispatcher {
    pub fn new(
        client: Arc<TelegramClient>,
        gateway: Arc<PaymentGateway>,
        store: SubscriptionStore,
        plans: Arc<PlanTable>,
        clock: Arc<dyn Clock>,
        admin_contact: String,
    ) -> Self {
        Self {
            client,
            gateway,
            store,
            plans,
            clock,
            admin_contact,
        }
    }

    /// Handle one update.
    pub async fn dispatch(&self, update: Update) {
        let result = if let Some(callback) = update.callback_query {
            self.on_callback(callback).await
        } else if let Some(message) = update.message {
            self.on_message(message).await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            tracing::warn!(update_id = update.update_id, error = %e, "Failed to handle update");
        }
    }

    async fn on_message(&self, message: Message) -> Result<(), TelegramError> {
        let Some(Action::Start) = message.text.as_deref().and_then(Action::from_command) else {
            return Ok(());
        };
        tracing::info!(chat_id = message.chat.id, "Start command");
        self.client
            .send_message(message.chat.id, "Welcome! Choose an action:", Some(&main_menu()))
            .await
    }

    async fn on_callback(&self, callback: CallbackQuery) -> Result<(), TelegramError> {
        let user_id = callback.from.id;
        let Some(action) = callback.data.as_deref().and_then(Action::from_callback) else {
            tracing::debug!(user_id, data = ?callback.data, "Unhandled callback");
            return self.client.answer_callback_query(&callback.id).await;
        };
        tracing::info!(user_id, action = ?action, "Callback");

        let chat_id = callback.message.as_ref().map_or(user_id, |m| m.chat.id);
        let message_id = callback.message.as_ref().map(|m| m.message_id);

        let result = match action {
            Action::Start | Action::Back => {
                self.show(chat_id, message_id, "Back to the main menu:", &main_menu()).await
            }
            Action::Buy => {
                self.show(chat_id, message_id, "Choose a plan:", &plans_menu(&self.plans)).await
            }
            Action::MySubscriptions => {
                let text = match self.store.list_by_user(user_id).await {
                    Ok(rows) => subscriptions_text(&rows, self.clock.now()),
                    Err(e) => {
                        tracing::error!(user_id, error = %e, "Failed to load subscriptions");
                        "Could not load your subscriptions. Please try again later.".to_string()
                    }
                };
                self.show(chat_id, message_id, &text, &main_menu()).await
            }
            Action::Help => {
                let text = format!(
                    "If you have questions about your subscription, contact the channel administrator:\n{}",
                    self.admin_contact
                );
                self.show(chat_id, message_id, &text, &main_menu()).await
            }
            Action::Plan(plan_id) => self.on_plan(chat_id, user_id, &plan_id).await,
        };

        self.client.answer_callback_query(&callback.id).await?;
        result
    }

    async fn on_plan(&self, chat_id: i64, user_id: i64, plan_id: &str) -> Result<(), TelegramError> {
        let Some(plan) = self.plans.by_id(plan_id) else {
            tracing::warn!(user_id, plan_id, "Unknown plan selected");
            return self.client.send_message(chat_id, "This plan is no longer available.", None).await;
        };

        let request = LinkRequest {
            user_id,
            amount: plan.price,
            plan: plan.name.clone(),
            order_ref: OrderRef::generate(user_id),
            success_url: None,
            fail_url: None,
        };

        let text = match self.gateway.create_payment_link(&request).await {
            Ok(link) => format!("Invoice for {:.2}:\n{}", plan.price, link.url),
            Err(GatewayError::Unavailable(_)) => "❗️ Payments are temporarily unavailable. Please try again later.".to_string(),
            Err(_) => "❗️ Could not create an invoice.".to_string(),
        };
        self.client.send_message(chat_id, &text, None).await
    }

    /// Edit the menu message in place, or send a new one if there is none.
    async fn show(
        &self,
        chat_id: i64,
        message_id: Option<i64>,
        text: &str,
        markup: &InlineKeyboardMarkup,
    ) -> Result<(), TelegramError> {
        match message_id {
            Some(message_id) => self.client.edit_message_text(chat_id, message_id, text, Some(markup)).await,
            None => self.client.send_message(chat_id, text, Some(markup)).await,
        }
    }
}
