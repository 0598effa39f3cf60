pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// A text message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub chat_id: i64,
    /// Used to thread the reply
    pub message_id: i32,
    pub text: String,
}

impl InboundUpdate {
    /// Empty and whitespace-only messages never get a reply.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub chat_id: i64,
    pub reply_to: i32,
    pub text: String,
}

impl OutboundReply {
    pub fn to(update: &InboundUpdate, text: impl Into<String>) -> Self {
        Self {
            chat_id: update.chat_id,
            reply_to: update.message_id,
            text: text.into(),
        }
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<()>;

    /// Best-effort "typing..." indicator.
    async fn notify_typing(&self, _chat_id: i64) {}
}
