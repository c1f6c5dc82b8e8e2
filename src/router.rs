use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::{CommandDispatcher, CommandSource};
use crate::lanes::LaneExecutor;
use crate::message::brief::brief_inbound;
use crate::message::InboundMessage;
use crate::platform::SenderMux;
use crate::service::ServiceManager;

/// Turns inbound messages into service and command runs, one chat at a time.
pub struct Router {
    prefix: String,
    dispatcher: Arc<CommandDispatcher>,
    lanes: LaneExecutor,
    senders: Arc<SenderMux>,
    services: Option<Arc<ServiceManager>>,
}

impl Router {
    pub fn new(
        prefix: impl Into<String>,
        dispatcher: Arc<CommandDispatcher>,
        lanes: LaneExecutor,
        senders: Arc<SenderMux>,
    ) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.trim().is_empty() {
            "/".to_string()
        } else {
            prefix
        };
        Self {
            prefix,
            dispatcher,
            lanes,
            senders,
            services: None,
        }
    }

    /// Run `services` on every message before command handling.
    pub fn with_services(mut self, services: Arc<ServiceManager>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The command line in `message`, prefix stripped and trimmed. `None`
    /// for ordinary chatter.
    pub fn command_line(&self, message: &InboundMessage) -> Option<String> {
        let text = message.primary_text()?;
        let line = text.strip_prefix(self.prefix.as_str())?.trim();
        if line.is_empty() {
            return None;
        }
        Some(line.to_string())
    }

    /// Queue `message` on its chat's lane. Messages from the same chat are
    /// handled, and their replies sent, in arrival order. Enabled services
    /// see every message and reply ahead of the command.
    pub fn receive(&self, message: InboundMessage) {
        let line = self.command_line(&message);
        let services = self
            .services
            .as_ref()
            .filter(|services| !services.is_empty())
            .map(Arc::clone);
        if line.is_none() && services.is_none() {
            return;
        }
        let key = message.addr().chat_key();
        let dispatcher = Arc::clone(&self.dispatcher);
        let senders = Arc::clone(&self.senders);
        let message = Arc::new(message);

        let submitted = self.lanes.submit(&key, move || {
            debug!("{}", brief_inbound(&message));
            let mut replies = match &services {
                Some(services) => services.on_message(&message),
                None => Vec::new(),
            };
            if let Some(line) = line {
                let source = CommandSource::for_inbound(Arc::clone(&message));
                replies.extend(dispatcher.dispatch(&line, source));
            }
            senders.send_batch(&replies);
        });
        if let Err(e) = submitted {
            warn!("Dropping message for {}: {}", key, e);
        }
    }

    /// Finish every queued message. Blocks until the lanes are empty.
    pub fn shutdown(&self) {
        self.lanes.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ArgumentType, CommandNode};
    use crate::message::{Address, InPart, MediaPart, MediaRef, OutboundMessage, Platform};
    use crate::platform::{PlatformSender, SenderMuxBuilder};
    use crate::service::RepeatService;
    use crate::state::MemoryStateStore;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    struct Recording {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl PlatformSender for Recording {
        fn platform(&self) -> Platform {
            Platform::Telegram
        }

        fn send(&self, message: &OutboundMessage) {
            self.sent.lock().unwrap().push(message.clone());
        }
    }

    fn router(lanes: usize) -> (Router, Arc<Recording>) {
        let mut dispatcher = CommandDispatcher::new();
        dispatcher
            .register(CommandNode::literal("say").then(
                CommandNode::argument("text", ArgumentType::GreedyString).executes(|ctx| {
                    let text = ctx.string("text")?;
                    // Slow down early messages so a reordering would show.
                    if text.ends_with(" 0") {
                        thread::sleep(Duration::from_millis(20));
                    }
                    ctx.source().reply_text(text);
                    Ok(())
                }),
            ))
            .unwrap();

        let recording = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
        });
        let senders = SenderMuxBuilder::new().register(recording.clone()).build();
        let router = Router::new(
            "/",
            Arc::new(dispatcher),
            LaneExecutor::new(lanes).unwrap(),
            Arc::new(senders),
        );
        (router, recording)
    }

    fn text(chat_id: i64, body: &str) -> InboundMessage {
        InboundMessage::builder(Address::new(Platform::Telegram, chat_id, false))
            .part(InPart::text(body))
            .build()
    }

    #[test]
    fn test_command_line_extraction() {
        let (router, _) = router(1);
        assert_eq!(router.command_line(&text(1, "  /say  hi  ")).as_deref(), Some("say  hi"));
        assert_eq!(router.command_line(&text(1, "hello")), None);
        assert_eq!(router.command_line(&text(1, "/   ")), None);

        let captioned = InboundMessage::builder(Address::new(Platform::Telegram, 1, false))
            .part(InPart::text("just a photo"))
            .part(InPart::Image(
                MediaPart::new(MediaRef::platform_file("telegram", "f1").unwrap())
                    .with_caption(Some("/say from caption".into())),
            ))
            .build();
        assert_eq!(router.command_line(&captioned).as_deref(), Some("say from caption"));
    }

    #[test]
    fn test_blank_prefix_defaults_to_slash() {
        let recording = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
        });
        let router = Router::new(
            "  ",
            Arc::new(CommandDispatcher::new()),
            LaneExecutor::new(1).unwrap(),
            Arc::new(SenderMuxBuilder::new().register(recording).build()),
        );
        assert_eq!(router.prefix(), "/");
    }

    #[test]
    fn test_per_chat_order_is_kept() {
        let (router, recording) = router(8);
        for round in 0..5 {
            for chat in 0..6 {
                router.receive(text(chat, &format!("/say {} {}", chat, round)));
            }
        }
        router.receive(text(0, "not a command"));
        router.shutdown();

        let sent = recording.sent.lock().unwrap();
        assert_eq!(sent.len(), 30);
        for chat in 0..6 {
            let rounds: Vec<String> = sent
                .iter()
                .filter(|m| m.addr().chat_id == chat)
                .map(|m| m.text_content())
                .collect();
            let expected: Vec<String> = (0..5).map(|r| format!("{} {}", chat, r)).collect();
            assert_eq!(rounds, expected);
        }
    }

    #[test]
    fn test_syntax_error_reply_reaches_sender() {
        let (router, recording) = router(2);
        router.receive(text(1, "/nope"));
        router.shutdown();

        let sent = recording.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text_content().starts_with("Command syntax error:\nnope\n^"));
    }

    #[test]
    fn test_services_see_plain_text_and_reply_first() {
        let (router, recording) = router(2);
        let mut services = ServiceManager::new(Arc::new(MemoryStateStore::new()), Vec::new());
        services.register(Arc::new(RepeatService::new()));
        let addr = Address::new(Platform::Telegram, 4, false);
        services.set_enabled(&addr, "repeat", true).unwrap();
        services.set_config(&addr, "repeat", "threshold", Some("2")).unwrap();
        let router = router.with_services(Arc::new(services));

        router.receive(text(4, "hello"));
        router.receive(text(4, "hello"));
        router.receive(text(4, "/say hi"));
        router.receive(text(4, "/say hi"));
        // not enabled in chat 5
        router.receive(text(5, "hello"));
        router.receive(text(5, "hello"));
        router.shutdown();

        let sent: Vec<(i64, String)> = recording
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| (m.addr().chat_id, m.text_content()))
            .collect();
        let expected: Vec<(i64, String)> = vec![
            (4, "hello".into()),
            (4, "hi".into()),
            (4, "/say hi".into()),
            (4, "hi".into()),
        ];
        assert_eq!(sent, expected);
    }
}
