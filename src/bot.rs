use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tracing::{error, info, warn};

use crate::platform::{ChatPlatform, MessageHandler};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Failed to connect to chat platform: {0}")]
    Connection(String),
    #[error("Bot has already been started")]
    AlreadyStarted,
}

/// Lifecycle of the bot: Idle -> Running -> ShuttingDown -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// Resolves once the session has fully closed.
pub type Completion = oneshot::Receiver<()>;

struct Lifecycle {
    state: BotState,
    /// Present while running; a stored permit wakes the shutdown task.
    shutdown: Option<Arc<Notify>>,
}

/// The bot, owning at most one chat session.
pub struct Bot {
    lifecycle: Mutex<Lifecycle>,
}

static INSTANCE: OnceLock<Bot> = OnceLock::new();

/// Resolves when `signal` reports an interrupt; never resolves if the
/// listener could not be installed.
async fn wait_for_interrupt<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for interrupt signal: {}", e);
        std::future::pending::<()>().await;
    }
}

impl Bot {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: BotState::Idle,
                shutdown: None,
            }),
        }
    }

    /// The process-wide bot, created on first access.
    pub fn instance() -> &'static Bot {
        INSTANCE.get_or_init(Bot::new)
    }

    pub fn state(&self) -> BotState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        // State transitions are single assignments, so a poisoned guard is still consistent
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: BotState) {
        self.lock().state = state;
    }

    /// Open a session on `platform` with `token` and register `handler`.
    ///
    /// Returns a completion signal that fires once the session has closed,
    /// after either [`Bot::close`] or an interrupt signal.
    pub async fn run<P>(
        &'static self,
        platform: &P,
        token: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Completion, BotError>
    where
        P: ChatPlatform + ?Sized,
    {
        if token.trim().is_empty() {
            return Err(BotError::Connection("token is empty".to_string()));
        }

        if self.state() != BotState::Idle {
            return Err(BotError::AlreadyStarted);
        }

        let mut session = platform.open(token, handler).await?;

        let shutdown = Arc::new(Notify::new());
        let claimed = {
            let mut lifecycle = self.lock();
            if lifecycle.state == BotState::Idle {
                lifecycle.state = BotState::Running;
                lifecycle.shutdown = Some(shutdown.clone());
                true
            } else {
                false
            }
        };

        if !claimed {
            // Lost a race with a concurrent run(); this session never became active
            session.close().await;
            return Err(BotError::AlreadyStarted);
        }

        info!("Bot running...");

        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("Shutdown requested");
                }
                _ = wait_for_interrupt(tokio::signal::ctrl_c()) => {
                    info!("Received interrupt signal");
                }
                _ = session.wait_ended() => {
                    warn!("Session ended without being closed");
                }
            }

            self.set_state(BotState::ShuttingDown);
            session.close().await;
            {
                let mut lifecycle = self.lock();
                lifecycle.state = BotState::Stopped;
                lifecycle.shutdown = None;
            }

            info!("Session closed");
            if done_tx.send(()).is_err() {
                warn!("Nobody was waiting for the bot to stop");
            }
        });

        Ok(done_rx)
    }

    /// Request shutdown without waiting for it. No-op unless running.
    pub fn close(&self) {
        let mut lifecycle = self.lock();
        if lifecycle.state != BotState::Running {
            return;
        }
        lifecycle.state = BotState::ShuttingDown;
        if let Some(shutdown) = &lifecycle.shutdown {
            shutdown.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::platform::{ChatSender, IncomingMessage, Session};

    struct NoopHandler;

    #[async_trait]
    impl MessageHandler for NoopHandler {
        async fn handle_message(&self, _sender: &dyn ChatSender, _message: &IncomingMessage) {}
    }

    struct FakeSession {
        closes: Arc<AtomicUsize>,
        /// Fires when the connection drops on its own
        ended: Option<oneshot::Receiver<()>>,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn wait_ended(&mut self) {
            match self.ended.as_mut() {
                Some(ended) => {
                    let _ = ended.await;
                }
                None => std::future::pending::<()>().await,
            }
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakePlatform {
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
        ended: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl ChatPlatform for FakePlatform {
        async fn open(
            &self,
            token: &str,
            _handler: Arc<dyn MessageHandler>,
        ) -> Result<Box<dyn Session>, BotError> {
            if token != "valid-token" {
                return Err(BotError::Connection("401 Unauthorized".to_string()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                closes: self.closes.clone(),
                ended: self.ended.lock().unwrap().take(),
            }))
        }
    }

    /// A fresh bot per test; tests must not share the global instance.
    fn leaked_bot() -> &'static Bot {
        Box::leak(Box::new(Bot::new()))
    }

    fn handler() -> Arc<dyn MessageHandler> {
        Arc::new(NoopHandler)
    }

    #[test]
    fn test_instance_is_singleton_across_threads() {
        let callers = 100;
        let barrier = Arc::new(std::sync::Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    Bot::instance() as *const Bot as usize
                })
            })
            .collect();

        let first = Bot::instance() as *const Bot as usize;
        for handle in handles {
            assert_eq!(handle.join().unwrap(), first);
        }
        assert!(std::ptr::eq(Bot::instance(), Bot::instance()));
    }

    #[tokio::test]
    async fn test_run_with_empty_token_fails() {
        let bot = leaked_bot();
        let platform = FakePlatform::default();

        let result = bot.run(&platform, "", handler()).await;
        assert!(matches!(result, Err(BotError::Connection(_))));
        assert_eq!(platform.opens.load(Ordering::SeqCst), 0);
        assert_eq!(bot.state(), BotState::Idle);
    }

    #[tokio::test]
    async fn test_run_with_rejected_token_fails() {
        let bot = leaked_bot();
        let platform = FakePlatform::default();

        let result = bot.run(&platform, "wrong", handler()).await;
        assert!(matches!(result, Err(BotError::Connection(_))));
        assert_eq!(bot.state(), BotState::Idle);
    }

    #[tokio::test]
    async fn test_run_then_close_completes() {
        let bot = leaked_bot();
        let platform = FakePlatform::default();

        let completion = bot.run(&platform, "valid-token", handler()).await.unwrap();
        assert_eq!(bot.state(), BotState::Running);

        bot.close();
        assert_eq!(bot.state(), BotState::ShuttingDown);

        tokio::time::timeout(Duration::from_secs(5), completion)
            .await
            .expect("completion signal within timeout")
            .unwrap();

        assert_eq!(bot.state(), BotState::Stopped);
        assert_eq!(platform.opens.load(Ordering::SeqCst), 1);
        assert_eq!(platform.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_before_run_is_noop() {
        let bot = leaked_bot();
        bot.close();
        bot.close();
        assert_eq!(bot.state(), BotState::Idle);

        let platform = FakePlatform::default();
        let completion = bot.run(&platform, "valid-token", handler()).await.unwrap();
        assert_eq!(bot.state(), BotState::Running);

        bot.close();
        completion.await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_close_closes_once() {
        let bot = leaked_bot();
        let platform = FakePlatform::default();

        let completion = bot.run(&platform, "valid-token", handler()).await.unwrap();
        bot.close();
        bot.close();
        bot.close();

        tokio::time::timeout(Duration::from_secs(5), completion)
            .await
            .unwrap()
            .unwrap();
        bot.close();

        assert_eq!(platform.closes.load(Ordering::SeqCst), 1);
        assert_eq!(bot.state(), BotState::Stopped);
    }

    #[tokio::test]
    async fn test_cannot_run_twice() {
        let bot = leaked_bot();
        let platform = FakePlatform::default();

        let completion = bot.run(&platform, "valid-token", handler()).await.unwrap();
        let second = bot.run(&platform, "valid-token", handler()).await;
        assert!(matches!(second, Err(BotError::AlreadyStarted)));

        bot.close();
        completion.await.unwrap();

        let third = bot.run(&platform, "valid-token", handler()).await;
        assert!(matches!(third, Err(BotError::AlreadyStarted)));
        assert_eq!(platform.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_ending_on_its_own_stops_bot() {
        let bot = leaked_bot();
        let platform = FakePlatform::default();
        let (end_tx, end_rx) = oneshot::channel();
        *platform.ended.lock().unwrap() = Some(end_rx);

        let completion = bot.run(&platform, "valid-token", handler()).await.unwrap();
        assert_eq!(bot.state(), BotState::Running);

        end_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), completion)
            .await
            .expect("completion signal within timeout")
            .unwrap();
        assert_eq!(bot.state(), BotState::Stopped);
        assert_eq!(platform.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupt_listener_failure_keeps_waiting() {
        let failed = wait_for_interrupt(async {
            Err(io::Error::new(io::ErrorKind::Other, "no signal driver"))
        });
        assert!(tokio::time::timeout(Duration::from_millis(50), failed)
            .await
            .is_err());

        let interrupted = wait_for_interrupt(async { Ok(()) });
        tokio::time::timeout(Duration::from_secs(5), interrupted)
            .await
            .unwrap();
    }
}
