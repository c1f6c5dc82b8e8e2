use anyhow::Result;
use dashmap::DashMap;

use super::{config_value, BotService, ServiceConfig};
use crate::command::CommandSource;
use crate::message::InboundMessage;

const DEFAULT_THRESHOLD: u32 = 3;

/// Joins in when a chat sends the same text several times in a row.
#[derive(Default)]
pub struct RepeatService {
    /// chat key -> (last text, times seen in a row)
    streaks: DashMap<String, (String, u32)>,
}

impl RepeatService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BotService for RepeatService {
    fn name(&self) -> &str {
        "repeat"
    }

    fn description(&self) -> &str {
        "Repeat a message once the chat has sent it `threshold` times in a row"
    }

    fn default_config(&self) -> ServiceConfig {
        ServiceConfig::from([("threshold".to_string(), DEFAULT_THRESHOLD.to_string())])
    }

    fn on_message(
        &self,
        source: &CommandSource,
        config: &ServiceConfig,
        message: &InboundMessage,
    ) -> Result<()> {
        if message.sender().is_bot() {
            return Ok(());
        }
        let Some(text) = message.primary_text() else {
            return Ok(());
        };
        let threshold = config_value(config, "threshold", DEFAULT_THRESHOLD).max(2);

        let mut streak = self
            .streaks
            .entry(message.addr().chat_key())
            .or_insert_with(|| (String::new(), 0));
        if streak.0 == text {
            streak.1 += 1;
        } else {
            *streak = (text.to_string(), 1);
        }
        // Only once per streak.
        if streak.1 == threshold {
            source.reply_text(text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, InPart, Platform, Sender};
    use std::sync::Arc;

    fn run(service: &RepeatService, config: &ServiceConfig, chat: i64, body: &str) -> Vec<String> {
        let message = Arc::new(
            InboundMessage::builder(Address::new(Platform::OneBot, chat, true))
                .sender(Sender::new(Some(1), None, None, false))
                .part(InPart::text(body))
                .build(),
        );
        let source = CommandSource::for_inbound(Arc::clone(&message));
        service.on_message(&source, config, &message).unwrap();
        source.into_replies().iter().map(|m| m.text_content()).collect()
    }

    #[test]
    fn test_repeats_once_at_threshold() {
        let service = RepeatService::new();
        let config = service.default_config();

        assert!(run(&service, &config, 1, "+1").is_empty());
        assert!(run(&service, &config, 1, "+1").is_empty());
        assert_eq!(run(&service, &config, 1, "+1"), vec!["+1"]);
        assert!(run(&service, &config, 1, "+1").is_empty());
    }

    #[test]
    fn test_streaks_are_per_chat_and_reset() {
        let service = RepeatService::new();
        let config = ServiceConfig::from([("threshold".to_string(), "2".to_string())]);

        assert!(run(&service, &config, 1, "a").is_empty());
        assert!(run(&service, &config, 2, "a").is_empty());
        assert!(run(&service, &config, 1, "b").is_empty());
        assert_eq!(run(&service, &config, 1, "b"), vec!["b"]);
        assert_eq!(run(&service, &config, 2, "a"), vec!["a"]);
    }
}
