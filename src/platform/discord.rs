use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serenity::all::{ChannelId, Context, EventHandler, GatewayIntents, Message, Ready};
use serenity::gateway::ShardManager;
use serenity::http::Http;
use serenity::Client;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::bot::BotError;
use crate::platform::{
    ChatPlatform, ChatSender, IncomingMessage, MessageHandler, SendError, Session,
};

/// Guild and DM messages, including their text
fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Parse a channel ID string into a Discord snowflake
fn parse_channel_id(channel_id: &str) -> Option<ChannelId> {
    channel_id
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(ChannelId::new)
}

/// Discord via the serenity gateway client
pub struct DiscordPlatform {
    intents: GatewayIntents,
}

impl DiscordPlatform {
    pub fn new() -> Self {
        Self {
            intents: gateway_intents(),
        }
    }
}

impl Default for DiscordPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn open(
        &self,
        token: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn Session>, BotError> {
        // Check the token over REST first so a bad token fails here instead of
        // inside the gateway task.
        let http = Http::new(token);
        let current_user = http
            .get_current_user()
            .await
            .map_err(|e| BotError::Connection(format!("Failed to authenticate: {}", e)))?;

        info!(
            "Authenticated as {} ({})",
            current_user.name, current_user.id
        );

        let (ready_tx, ready_rx) = oneshot::channel();
        let event_handler = Handler {
            bot_user_id: current_user.id.to_string(),
            inner: handler,
            ready: Mutex::new(Some(ready_tx)),
        };

        let mut client = Client::builder(token, self.intents)
            .event_handler(event_handler)
            .await
            .map_err(|e| BotError::Connection(format!("Failed to create client: {}", e)))?;

        let shard_manager = client.shard_manager.clone();

        let mut runner: Runner =
            tokio::spawn(async move { client.start().await.map_err(|e| e.to_string()) });

        if let Err(e) = wait_until_ready(ready_rx, &mut runner).await {
            shard_manager.shutdown_all().await;
            runner.abort();
            return Err(e);
        }

        Ok(Box::new(DiscordSession {
            shard_manager,
            runner: Some(runner),
        }))
    }
}

/// The gateway client task; yields the reason it stopped, if it failed.
type Runner = JoinHandle<Result<(), String>>;

fn runner_exit_reason(result: Result<Result<(), String>, JoinError>) -> String {
    match result {
        Ok(Ok(())) => "gateway client stopped".to_string(),
        Ok(Err(e)) => e,
        Err(e) => format!("gateway client task failed: {}", e),
    }
}

/// Wait for the first READY from the gateway, failing if the client task
/// exits before it arrives.
async fn wait_until_ready(
    ready: oneshot::Receiver<()>,
    runner: &mut Runner,
) -> Result<(), BotError> {
    tokio::select! {
        biased;
        result = runner => Err(BotError::Connection(format!(
            "Gateway connection failed: {}",
            runner_exit_reason(result)
        ))),
        signal = ready => signal.map_err(|_| {
            BotError::Connection("Gateway closed before READY".to_string())
        }),
    }
}

struct DiscordSession {
    shard_manager: Arc<ShardManager>,
    runner: Option<Runner>,
}

#[async_trait]
impl Session for DiscordSession {
    async fn wait_ended(&mut self) {
        let Some(runner) = self.runner.as_mut() else {
            return std::future::pending().await;
        };
        let result = runner.await;
        self.runner = None;
        error!("Discord client stopped: {}", runner_exit_reason(result));
    }

    async fn close(&mut self) {
        info!("Closing Discord session...");
        self.shard_manager.shutdown_all().await;

        if let Some(runner) = self.runner.take() {
            match runner.await {
                Ok(Err(e)) => warn!("Discord client stopped with error: {}", e),
                Err(e) => warn!("Discord client task did not finish cleanly: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }
}

struct Handler {
    bot_user_id: String,
    inner: Arc<dyn MessageHandler>,
    /// Taken on the first READY; later READYs come from reconnects
    ready: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        let incoming = IncomingMessage {
            author_id: msg.author.id.to_string(),
            channel_id: msg.channel_id.to_string(),
            content: msg.content,
        };

        let sender = DiscordSender {
            http: ctx.http.clone(),
            bot_user_id: self.bot_user_id.clone(),
        };

        self.inner.handle_message(&sender, &incoming).await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "Discord gateway ready: {} in {} guild(s)",
            ready.user.name,
            ready.guilds.len()
        );

        let first = self.ready.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(first) = first {
            let _ = first.send(());
        }
    }
}

struct DiscordSender {
    http: Arc<Http>,
    bot_user_id: String,
}

#[async_trait]
impl ChatSender for DiscordSender {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), SendError> {
        let channel = parse_channel_id(channel_id).ok_or_else(|| SendError {
            channel_id: channel_id.to_string(),
            reason: "not a Discord channel ID".to_string(),
        })?;

        channel
            .say(&self.http, text)
            .await
            .map_err(|e| SendError {
                channel_id: channel_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}
