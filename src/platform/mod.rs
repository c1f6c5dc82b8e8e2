pub mod mux;
pub mod telegram;

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::message::{InboundMessage, OutboundMessage, Platform};
use crate::router::Router;

pub use mux::{SenderMux, SenderMuxBuilder};

/// Boot failures. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No platform enabled")]
    NoPlatformEnabled,
    #[error("{platform} receiver was started before being bound to a sink")]
    Unbound { platform: Platform },
    #[error("Failed to connect to {platform}")]
    Connect {
        platform: Platform,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl StartupError {
    #[must_use]
    pub fn connect(platform: Platform, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Connect {
            platform,
            source: Box::new(source),
        }
    }
}

/// Receives messages from one platform and pushes them into the sink.
#[async_trait]
pub trait PlatformReceiver: Send + Sync {
    fn platform(&self) -> Platform;

    /// Called once, before `start`.
    fn bind(&mut self, sink: InboundSink);

    /// Connect and begin receiving in the background. Connectivity problems
    /// are reported here, not later.
    async fn start(&mut self) -> Result<(), StartupError>;

    /// Stop receiving and wait for in-flight handlers.
    async fn stop(&mut self);
}

/// Delivers outbound messages to one platform. Never fails: problems are
/// logged by the implementation.
pub trait PlatformSender: Send + Sync {
    fn platform(&self) -> Platform;

    fn send(&self, message: &OutboundMessage);
}

/// Bounded hand-off from platform receivers to the router.
#[derive(Clone)]
pub struct InboundSink {
    tx: mpsc::Sender<InboundMessage>,
}

impl InboundSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Wait for room in the queue. `false` once the pipeline is shutting down.
    pub async fn deliver(&self, message: InboundMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }

    /// Enqueue without waiting; drops the message when the queue is full.
    pub fn try_deliver(&self, message: InboundMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!("Inbound queue full, dropping message from {}", message.addr());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Feed queued inbound messages to the router until `shutdown` fires, then
/// close the queue and hand over whatever is still buffered.
pub async fn pump(
    mut rx: mpsc::Receiver<InboundMessage>,
    router: Arc<Router>,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Inbound pump started");
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => router.receive(message),
                None => break,
            },
            _ = &mut shutdown => {
                rx.close();
                while let Some(message) = rx.recv().await {
                    router.receive(message);
                }
                break;
            }
        }
    }
    info!("Inbound pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BotCommand, CommandDispatcher, CommandNode, RegisterError};
    use crate::lanes::LaneExecutor;
    use crate::message::{Address, InPart};
    use std::sync::Mutex;

    struct Recording {
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
    }

    impl PlatformSender for Recording {
        fn platform(&self) -> Platform {
            Platform::Telegram
        }

        fn send(&self, message: &OutboundMessage) {
            self.sent.lock().unwrap().push(message.clone());
        }
    }

    struct Echo;

    impl BotCommand for Echo {
        fn name(&self) -> &str {
            "say"
        }

        fn description(&self) -> &str {
            "say"
        }

        fn usage(&self) -> &str {
            "say <text>"
        }

        fn register(
            self: Arc<Self>,
            dispatcher: &mut CommandDispatcher,
        ) -> Result<(), RegisterError> {
            dispatcher.register(CommandNode::literal("say").then(
                CommandNode::argument("text", crate::command::ArgumentType::GreedyString).executes(
                    |ctx| {
                        ctx.source().reply_text(ctx.string("text")?);
                        Ok(())
                    },
                ),
            ))
        }
    }

    fn text(addr: Address, body: &str) -> InboundMessage {
        InboundMessage::builder(addr).part(InPart::text(body)).build()
    }

    #[tokio::test]
    async fn test_pump_drains_queue_on_shutdown() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let senders = SenderMuxBuilder::new()
            .register(Arc::new(Recording { sent: Arc::clone(&sent) }))
            .build();
        let commands: Vec<Arc<dyn BotCommand>> = vec![Arc::new(Echo)];
        let router = Arc::new(Router::new(
            "/",
            Arc::new(crate::command::build_dispatcher(&commands)),
            LaneExecutor::new(4).unwrap(),
            Arc::new(senders),
        ));

        let (sink, rx) = InboundSink::channel(16);
        let addr = Address::new(Platform::Telegram, 1, false);
        for i in 0..10 {
            assert!(sink.deliver(text(addr, &format!("/say {}", i))).await);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(()).unwrap();
        pump(rx, Arc::clone(&router), stop_rx).await;
        assert!(!sink.deliver(text(addr, "/say late")).await);

        let router = Arc::clone(&router);
        tokio::task::spawn_blocking(move || router.shutdown()).await.unwrap();

        let sent: Vec<String> = sent.lock().unwrap().iter().map(|m| m.text_content()).collect();
        assert_eq!(sent, (0..10).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_deliver_drops_when_full() {
        let (sink, _rx) = InboundSink::channel(1);
        let addr = Address::new(Platform::Telegram, 1, false);
        assert!(sink.try_deliver(text(addr, "a")));
        assert!(!sink.try_deliver(text(addr, "b")));
    }
}
