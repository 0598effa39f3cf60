use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::{SendMessageSetters, SetWebhookSetters};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ParseMode, ReplyParameters, UpdateKind};
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::platform::{InboundUpdate, OutboundReply, ReplySender};

/// Create the Bot API client, honouring an API server override.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    let bot = Bot::new(&config.bot_token);
    Ok(match config.api_url()? {
        Some(url) => bot.set_api_url(url),
        None => bot,
    })
}

/// Log the bot identity and point Telegram at our webhook.
pub async fn register_webhook(bot: &Bot, config: &TelegramConfig) -> Result<()> {
    let me = bot
        .get_me()
        .await
        .context("Failed to initialize Telegram bot")?;
    info!(
        "Bot started as @{}",
        me.user.username.as_deref().unwrap_or("unknown")
    );

    let url = config.webhook_endpoint()?;
    let mut request = bot.set_webhook(url.clone());
    if let Some(secret) = &config.secret_token {
        request = request.secret_token(secret.clone());
    }
    request.await.context("Failed to set webhook")?;

    info!("Webhook registered at {}", url);
    Ok(())
}

/// Narrow a Telegram update to a text message. Anything else is dropped.
pub fn inbound_from_update(update: &Update) -> Option<InboundUpdate> {
    let UpdateKind::Message(msg) = &update.kind else {
        debug!("Ignoring non-message update {:?}", update.id);
        return None;
    };
    let text = msg.text()?;

    Some(InboundUpdate {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: text.to_string(),
    })
}

pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySender for TelegramSender {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<()> {
        // The tutor persona answers in legacy Markdown (*bold*, _italic_).
        #[allow(deprecated)]
        let parse_mode = ParseMode::Markdown;

        self.bot
            .send_message(ChatId(reply.chat_id), reply.text.clone())
            .parse_mode(parse_mode)
            .reply_parameters(ReplyParameters::new(MessageId(reply.reply_to)))
            .await
            .context("Failed to send reply")?;
        Ok(())
    }

    async fn notify_typing(&self, chat_id: i64) {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .ok();
    }
}
