pub mod discord;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::bot::BotError;

/// A message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Platform-specific author ID as string
    pub author_id: String,
    /// Platform-specific channel ID as string
    pub channel_id: String,
    /// The message text
    pub content: String,
}

#[derive(Debug, Error)]
#[error("Failed to send message to channel {channel_id}: {reason}")]
pub struct SendError {
    pub channel_id: String,
    pub reason: String,
}

/// Outbound side of an open session, handed to the message handler.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// The bot's own user ID on the platform
    fn bot_user_id(&self) -> &str;

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), SendError>;
}

/// Callback invoked once per inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, sender: &dyn ChatSender, message: &IncomingMessage);
}

/// An open connection to the chat platform.
#[async_trait]
pub trait Session: Send {
    /// Resolves if the connection ends without `close` being called.
    async fn wait_ended(&mut self);

    async fn close(&mut self);
}

/// A chat platform the bot can connect to.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Open a session with `token`, delivering every inbound message to `handler`.
    async fn open(
        &self,
        token: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn Session>, BotError>;
}
