use super::media::MediaPart;
use super::Address;

/// Hints for the platform sender when planning delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryHints {
    pub preserve_order: bool,
    pub prefer_single_message: bool,
    pub prefer_caption: bool,
}

impl Default for DeliveryHints {
    fn default() -> Self {
        Self {
            preserve_order: true,
            prefer_single_message: false,
            prefer_caption: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutPart {
    Text(String),
    Image(MediaPart),
    File(MediaPart),
}

/// A message produced by a command, consumed once by the sender multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    addr: Address,
    parts: Vec<OutPart>,
    hints: DeliveryHints,
}

impl OutboundMessage {
    pub fn new(addr: Address, parts: Vec<OutPart>) -> Self {
        Self {
            addr,
            parts,
            hints: DeliveryHints::default(),
        }
    }

    pub fn text(addr: Address, text: impl Into<String>) -> Self {
        Self::new(addr, vec![OutPart::Text(text.into())])
    }

    pub fn with_hints(mut self, hints: DeliveryHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_part(mut self, part: OutPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Same content, different target.
    pub fn retarget(self, addr: Address) -> Self {
        Self { addr, ..self }
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn parts(&self) -> &[OutPart] {
        &self.parts
    }

    pub fn hints(&self) -> DeliveryHints {
        self.hints
    }

    /// Concatenated text parts, mostly for logs and tests.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                OutPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MediaRef, Platform};

    #[test]
    fn test_default_hints() {
        let out = OutboundMessage::text(Address::new(Platform::Discord, 1, true), "hi");
        assert!(out.hints().preserve_order);
        assert!(!out.hints().prefer_single_message);
        assert!(out.hints().prefer_caption);
    }

    #[test]
    fn test_with_part_and_retarget() {
        let from = Address::new(Platform::Telegram, 1, false);
        let to = Address::new(Platform::Telegram, 2, true);
        let out = OutboundMessage::text(from, "caption")
            .with_part(OutPart::Image(MediaPart::new(
                MediaRef::url("https://example.com/x.png").unwrap(),
            )))
            .retarget(to);

        assert_eq!(out.addr(), &to);
        assert_eq!(out.parts().len(), 2);
        assert_eq!(out.text_content(), "caption");
    }
}
