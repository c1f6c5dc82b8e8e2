use std::sync::{Arc, Mutex, PoisonError};

use crate::message::{
    Address, Chat, InPart, InboundMessage, MediaPart, MessageMeta, OutPart, OutboundMessage,
    Sender,
};

/// Reply capability handed to command actions. Bound to the inbound message
/// being handled, or to a bare address for messages the bot originates.
/// Replies are collected in call order.
pub struct CommandSource {
    addr: Address,
    inbound: Option<Arc<InboundMessage>>,
    replies: Mutex<Vec<OutboundMessage>>,
}

impl CommandSource {
    pub fn for_inbound(inbound: Arc<InboundMessage>) -> Self {
        Self {
            addr: *inbound.addr(),
            inbound: Some(inbound),
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn for_address(addr: Address) -> Self {
        Self {
            addr,
            inbound: None,
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn inbound(&self) -> Option<&InboundMessage> {
        self.inbound.as_deref()
    }

    pub fn chat(&self) -> Option<&Chat> {
        self.inbound().map(InboundMessage::chat)
    }

    pub fn meta(&self) -> Option<&MessageMeta> {
        self.inbound().map(InboundMessage::meta)
    }

    pub fn sender(&self) -> Option<&Sender> {
        self.inbound().map(InboundMessage::sender)
    }

    pub fn parts(&self) -> &[InPart] {
        self.inbound().map(InboundMessage::parts).unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.sender().and_then(Sender::id)
    }

    pub fn chat_id(&self) -> i64 {
        self.addr.chat_id
    }

    pub fn is_group(&self) -> bool {
        self.addr.is_group
    }

    pub fn primary_text(&self) -> Option<&str> {
        self.inbound().and_then(InboundMessage::primary_text)
    }

    pub fn reply_text(&self, text: impl Into<String>) {
        self.push(OutboundMessage::text(self.addr, text));
    }

    pub fn reply(&self, message: OutboundMessage) {
        self.push(message);
    }

    pub fn reply_parts(&self, parts: Vec<OutPart>) {
        self.push(OutboundMessage::new(self.addr, parts));
    }

    pub fn reply_image(&self, image: MediaPart) {
        self.reply_parts(vec![OutPart::Image(image)]);
    }

    pub fn reply_file(&self, file: MediaPart) {
        self.reply_parts(vec![OutPart::File(file)]);
    }

    /// Queue `message` for a different chat than the one being handled.
    pub fn send_to(&self, addr: Address, message: OutboundMessage) {
        self.push(message.retarget(addr));
    }

    pub fn into_replies(self) -> Vec<OutboundMessage> {
        self.replies
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, message: OutboundMessage) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}
