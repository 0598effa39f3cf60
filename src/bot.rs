use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::llm::{Completer, LlmClient};
use crate::platform::telegram::{self, TelegramSender};
use crate::platform::{InboundUpdate, OutboundReply, ReplySender};
use crate::webhook;

/// Sent instead of the completion whenever the provider call fails.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process that. Try again?";

const UPDATE_QUEUE_CAPACITY: usize = 100;

/// Start the bot: bind the webhook listener, register it with Telegram and
/// dispatch updates until the listener dies.
///
/// Validates `config` itself, so a hand-built `Config` that skipped
/// `Config::load` still fails before any network call or bind.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let bot = telegram::build_bot(&config.telegram)?;
    let llm = LlmClient::new(config.llm.clone())?;

    let listener = webhook::bind(config.telegram.listen_addr).await?;
    telegram::register_webhook(&bot, &config.telegram).await?;

    let (tx, rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
    let app = webhook::router(tx, config.telegram.secret_token.clone());
    let server = tokio::spawn(webhook::serve(listener, app));

    let sender = TelegramSender::new(bot);

    tokio::select! {
        result = server => match result {
            Ok(Ok(())) => bail!("Webhook server stopped unexpectedly"),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e).context("Webhook server task failed"),
        },
        _ = dispatch(rx, &llm, &sender) => bail!("Update stream closed"),
    }
}

/// Handle updates strictly one at a time, in arrival order. Returns once the
/// stream is closed.
pub async fn dispatch(
    mut updates: mpsc::Receiver<InboundUpdate>,
    completer: &dyn Completer,
    sender: &dyn ReplySender,
) {
    while let Some(update) = updates.recv().await {
        handle_update(&update, completer, sender).await;
    }
    warn!("Update stream closed, dispatcher stopping");
}

pub async fn handle_update(
    update: &InboundUpdate,
    completer: &dyn Completer,
    sender: &dyn ReplySender,
) {
    if update.is_blank() {
        return;
    }

    info!("Message from chat {}: {}", update.chat_id, update.text);

    sender.notify_typing(update.chat_id).await;

    let text = match completer.generate_reply(&update.text).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Completion failed for chat {}: {}", update.chat_id, e);
            FALLBACK_REPLY.to_string()
        }
    };

    let reply = OutboundReply::to(update, text);
    if let Err(e) = sender.send_reply(&reply).await {
        error!("Failed to deliver reply to chat {}: {:#}", reply.chat_id, e);
    }
}
