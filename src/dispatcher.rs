use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::card::CardLookup;
use crate::platform::{ChatSender, IncomingMessage, MessageHandler};

const PING_COMMAND: &str = "!ping";
const CARD_COMMAND: &str = "!card";
const PONG_REPLY: &str = "Pong! 🏓";

/// A recognized command in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Ping,
    /// Card lookup with the identifier that followed the command, if any
    Card(Option<&'a str>),
}

impl<'a> Command<'a> {
    /// Classify message text; the first matching command wins.
    pub fn parse(text: &'a str) -> Option<Self> {
        if text.contains(PING_COMMAND) {
            return Some(Command::Ping);
        }

        if text.contains(CARD_COMMAND) {
            let card_id = text
                .split_whitespace()
                .skip_while(|token| !token.contains(CARD_COMMAND))
                .nth(1);
            return Some(Command::Card(card_id));
        }

        None
    }
}

/// Maps inbound messages to replies.
pub struct Dispatcher {
    cards: Arc<dyn CardLookup>,
}

impl Dispatcher {
    pub fn new(cards: Arc<dyn CardLookup>) -> Self {
        Self { cards }
    }

    async fn reply(&self, sender: &dyn ChatSender, channel_id: &str, text: &str) {
        if let Err(e) = sender.send_message(channel_id, text).await {
            error!("Error sending message: {}", e);
        }
    }

    async fn card_reply(&self, card_id: &str) -> String {
        match self.cards.lookup(card_id).await {
            Ok(card) => card.url,
            Err(e) => {
                error!("Card lookup for {} failed: {}", card_id, e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle_message(&self, sender: &dyn ChatSender, message: &IncomingMessage) {
        info!("Message received: {}", message.content);

        if message.author_id == sender.bot_user_id() {
            return;
        }

        match Command::parse(&message.content) {
            Some(Command::Ping) => {
                self.reply(sender, &message.channel_id, PONG_REPLY).await;
            }
            Some(Command::Card(Some(card_id))) => {
                let url = self.card_reply(card_id).await;
                self.reply(sender, &message.channel_id, &url).await;
            }
            Some(Command::Card(None)) => {
                warn!(
                    "Ignoring {} without a card ID from {}",
                    CARD_COMMAND, message.author_id
                );
            }
            None => {}
        }
    }
}
