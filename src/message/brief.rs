//! One-line summaries of message traffic for debug logs.

use super::{InPart, InboundMessage, MediaPart, MediaRef, OutPart, OutboundMessage, Sender};

const CLIP_CHARS: usize = 160;

pub fn brief_inbound(msg: &InboundMessage) -> String {
    let mut out = format!("<- {} {}", msg.addr(), brief_sender(msg.sender()));
    let text = msg.all_text();
    if !text.is_empty() {
        out.push_str(": ");
        out.push_str(&clip(&text));
    }
    let media: Vec<String> = msg
        .parts()
        .iter()
        .filter_map(|p| match p {
            InPart::Text(_) => None,
            InPart::Image(m) => Some(brief_media("image", m)),
            InPart::File(m) => Some(brief_media("file", m)),
        })
        .collect();
    if !media.is_empty() {
        out.push_str(&format!(" [{}]", media.join(", ")));
    }
    out
}

pub fn brief_outbound(msg: &OutboundMessage) -> String {
    let mut out = format!("-> {}", msg.addr());
    let text = msg.text_content();
    if !text.is_empty() {
        out.push_str(": ");
        out.push_str(&clip(&text));
    }
    let media: Vec<String> = msg
        .parts()
        .iter()
        .filter_map(|p| match p {
            OutPart::Text(_) => None,
            OutPart::Image(m) => Some(brief_media("image", m)),
            OutPart::File(m) => Some(brief_media("file", m)),
        })
        .collect();
    if !media.is_empty() {
        out.push_str(&format!(" [{}]", media.join(", ")));
    }
    out
}

fn brief_sender(sender: &Sender) -> String {
    let name = sender
        .display_name()
        .map(str::to_string)
        .or_else(|| sender.username().map(|u| format!("@{u}")))
        .unwrap_or_else(|| "?".to_string());
    let mut out = match sender.id() {
        Some(id) => format!("{name}#{id}"),
        None => name,
    };
    if sender.is_bot() {
        out.push_str(" (bot)");
    }
    out
}

fn brief_media(kind: &str, media: &MediaPart) -> String {
    let source = match media.media() {
        MediaRef::Url(r) => clip(r.url()),
        MediaRef::Bytes(r) => format!("{} bytes", r.bytes().len()),
        MediaRef::PlatformFile(r) => format!("{}:{}", r.platform(), r.file_id()),
    };
    match media.name() {
        Some(name) => format!("{kind} {name} {source}"),
        None => format!("{kind} {source}"),
    }
}

fn clip(text: &str) -> String {
    let escaped = text.replace('\r', "\\r").replace('\n', "\\n");
    if escaped.chars().count() <= CLIP_CHARS {
        return escaped;
    }
    let mut clipped: String = escaped.chars().take(CLIP_CHARS).collect();
    clipped.push('…');
    clipped
}
