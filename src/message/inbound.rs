use std::collections::BTreeMap;

use serde_json::Value;

use super::media::MediaPart;
use super::{non_blank, Address};

/// Who sent an inbound message. Every field is optional because system
/// messages and some platforms do not expose them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    id: Option<i64>,
    username: Option<String>,
    display_name: Option<String>,
    is_bot: bool,
}

impl Sender {
    pub fn new(
        id: Option<i64>,
        username: Option<String>,
        display_name: Option<String>,
        is_bot: bool,
    ) -> Self {
        Self {
            id,
            username: non_blank(username),
            display_name: non_blank(display_name),
            is_bot,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn is_bot(&self) -> bool {
        self.is_bot
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    addr: Address,
    title: Option<String>,
}

impl Chat {
    pub fn new(addr: Address, title: Option<String>) -> Self {
        Self {
            addr,
            title: non_blank(title),
        }
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    message_id: Option<String>,
    timestamp_ms: Option<i64>,
    reply_to_id: Option<String>,
    raw_type: Option<String>,
}

impl MessageMeta {
    pub fn new(
        message_id: Option<String>,
        timestamp_ms: Option<i64>,
        reply_to_id: Option<String>,
        raw_type: Option<String>,
    ) -> Self {
        Self {
            message_id: non_blank(message_id),
            timestamp_ms,
            reply_to_id: non_blank(reply_to_id),
            raw_type: non_blank(raw_type),
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    pub fn reply_to_id(&self) -> Option<&str> {
        self.reply_to_id.as_deref()
    }

    pub fn raw_type(&self) -> Option<&str> {
        self.raw_type.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InPart {
    Text(String),
    Image(MediaPart),
    File(MediaPart),
}

impl InPart {
    pub fn text(text: impl Into<String>) -> Self {
        InPart::Text(text.into())
    }

    pub fn caption(&self) -> Option<&str> {
        match self {
            InPart::Text(_) => None,
            InPart::Image(media) | InPart::File(media) => media.caption(),
        }
    }
}

/// A message received from any platform, normalized at the platform boundary.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    addr: Address,
    sender: Sender,
    chat: Chat,
    meta: MessageMeta,
    parts: Vec<InPart>,
    ext: BTreeMap<String, Value>,
}

impl InboundMessage {
    pub fn builder(addr: Address) -> InboundMessageBuilder {
        InboundMessageBuilder {
            addr,
            sender: Sender::unknown(),
            title: None,
            meta: MessageMeta::default(),
            parts: Vec::new(),
            ext: BTreeMap::new(),
        }
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    pub fn parts(&self) -> &[InPart] {
        &self.parts
    }

    pub fn ext(&self) -> &BTreeMap<String, Value> {
        &self.ext
    }

    /// Text used for command parsing. A media caption wins over text parts;
    /// otherwise the first non-blank text part. Trimmed.
    pub fn primary_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(InPart::caption)
            .map(str::trim)
            .find(|c| !c.is_empty())
            .or_else(|| {
                self.parts.iter().find_map(|p| match p {
                    InPart::Text(text) => Some(text.trim()).filter(|t| !t.is_empty()),
                    _ => None,
                })
            })
    }

    /// Every visible text (texts and captions in part order), one per line.
    pub fn all_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                InPart::Text(text) => Some(text.trim()),
                other => other.caption().map(str::trim),
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct InboundMessageBuilder {
    addr: Address,
    sender: Sender,
    title: Option<String>,
    meta: MessageMeta,
    parts: Vec<InPart>,
    ext: BTreeMap<String, Value>,
}

impl InboundMessageBuilder {
    pub fn sender(mut self, sender: Sender) -> Self {
        self.sender = sender;
        self
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn meta(mut self, meta: MessageMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn part(mut self, part: InPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn ext(mut self, key: impl Into<String>, value: Value) -> Self {
        self.ext.insert(key.into(), value);
        self
    }

    pub fn build(self) -> InboundMessage {
        InboundMessage {
            chat: Chat::new(self.addr, self.title),
            addr: self.addr,
            sender: self.sender,
            meta: self.meta,
            parts: self.parts,
            ext: self.ext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MediaRef, Platform};

    fn addr() -> Address {
        Address::new(Platform::Telegram, 7, false)
    }

    fn image(caption: &str) -> InPart {
        InPart::Image(
            MediaPart::new(MediaRef::platform_file("telegram", "AgAD").unwrap())
                .with_caption(Some(caption.to_string())),
        )
    }

    #[test]
    fn test_caption_wins_over_text() {
        let msg = InboundMessage::builder(addr())
            .part(InPart::text("/echo from text"))
            .part(image("  /echo from caption "))
            .build();
        assert_eq!(msg.primary_text(), Some("/echo from caption"));
    }

    #[test]
    fn test_first_non_blank_text_without_caption() {
        let msg = InboundMessage::builder(addr())
            .part(InPart::text("   "))
            .part(image(" "))
            .part(InPart::text(" hello "))
            .build();
        assert_eq!(msg.primary_text(), Some("hello"));
    }

    #[test]
    fn test_no_text_at_all() {
        let msg = InboundMessage::builder(addr()).part(image("")).build();
        assert_eq!(msg.primary_text(), None);
        assert_eq!(msg.all_text(), "");
    }

    #[test]
    fn test_all_text_joins_in_part_order() {
        let msg = InboundMessage::builder(addr())
            .part(InPart::text("one"))
            .part(image("two"))
            .build();
        assert_eq!(msg.all_text(), "one\ntwo");
    }

    #[test]
    fn test_builder_normalizes_blank_fields() {
        let msg = InboundMessage::builder(addr())
            .sender(Sender::new(Some(1), Some("".into()), Some("  ".into()), false))
            .title(Some(" ".into()))
            .meta(MessageMeta::new(Some(" ".into()), Some(5), None, Some("text".into())))
            .build();

        assert_eq!(msg.sender().username(), None);
        assert_eq!(msg.sender().display_name(), None);
        assert_eq!(msg.chat().title(), None);
        assert_eq!(msg.chat().addr(), msg.addr());
        assert_eq!(msg.meta().message_id(), None);
        assert_eq!(msg.meta().raw_type(), Some("text"));
    }
}
