pub mod brief;
pub mod inbound;
pub mod media;
pub mod outbound;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use inbound::{Chat, InPart, InboundMessage, MessageMeta, Sender};
pub use media::{MediaError, MediaPart, MediaRef};
pub use outbound::{DeliveryHints, OutPart, OutboundMessage};

/// Chat platforms the bot can be connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Discord,
    OneBot,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
            Platform::OneBot => "onebot",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation target: platform + chat identifier + group flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub platform: Platform,
    pub chat_id: i64,
    pub is_group: bool,
}

impl Address {
    pub fn new(platform: Platform, chat_id: i64, is_group: bool) -> Self {
        Self {
            platform,
            chat_id,
            is_group,
        }
    }

    /// Canonical per-chat key, `platform:(g|p):chatId`.
    /// Used both as the CHAT scope id and as the lane key.
    pub fn chat_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.platform,
            if self.is_group { "g" } else { "p" },
            self.chat_id
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chat_key())
    }
}

/// Normalize an optional text field: blank strings become `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
