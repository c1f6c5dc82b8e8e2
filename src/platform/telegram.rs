use async_trait::async_trait;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, InputFile};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{InboundSink, PlatformReceiver, PlatformSender, StartupError};
use crate::message::{
    Address, InPart, InboundMessage, MediaPart, MediaRef, MessageMeta, OutPart, OutboundMessage,
    Platform, Sender,
};

/// Telegram rejects messages over 4096 chars; keep some headroom.
const MAX_TEXT_LEN: usize = 4000;
const MAX_CAPTION_LEN: usize = 1024;

/// Split long messages for Telegram's length limit, preferring line and word breaks
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let cut = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .filter(|&cut| cut > start)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..cut].to_string());
        start = cut;
    }

    chunks
}

/// One Telegram API call.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Text(String),
    Photo(MediaPart, Option<String>),
    Document(MediaPart, Option<String>),
}

/// Turn outbound parts into API calls. With `prefer_caption`, a text part
/// directly before an uncaptioned image or file becomes its caption when it
/// fits. With `prefer_single_message`, adjacent texts are joined.
fn plan_delivery(message: &OutboundMessage) -> Vec<Step> {
    let hints = message.hints();
    let mut steps: Vec<Step> = Vec::new();
    let mut pending_text: Option<String> = None;

    let flush = |steps: &mut Vec<Step>, pending: &mut Option<String>| {
        if let Some(text) = pending.take() {
            steps.extend(split_message(&text, MAX_TEXT_LEN).into_iter().map(Step::Text));
        }
    };

    for part in message.parts() {
        match part {
            OutPart::Text(text) if text.trim().is_empty() => {}
            OutPart::Text(text) => {
                if hints.prefer_single_message {
                    if let Some(pending) = pending_text.as_mut() {
                        pending.push('\n');
                        pending.push_str(text);
                        continue;
                    }
                }
                flush(&mut steps, &mut pending_text);
                pending_text = Some(text.clone());
            }
            OutPart::Image(media) | OutPart::File(media) => {
                let mut caption = media.caption().map(str::to_string);
                let absorbs = hints.prefer_caption
                    && caption.is_none()
                    && pending_text
                        .as_ref()
                        .is_some_and(|t| t.chars().count() <= MAX_CAPTION_LEN);
                if absorbs {
                    caption = pending_text.take();
                } else {
                    flush(&mut steps, &mut pending_text);
                }
                steps.push(match part {
                    OutPart::Image(_) => Step::Photo(media.clone(), caption),
                    _ => Step::Document(media.clone(), caption),
                });
            }
        }
    }
    flush(&mut steps, &mut pending_text);
    steps
}

fn input_file(media: &MediaPart) -> Option<InputFile> {
    match media.media() {
        MediaRef::Url(r) => match url::Url::parse(r.url()) {
            Ok(url) => Some(InputFile::url(url)),
            Err(e) => {
                warn!("Invalid media url {}: {}", r.url(), e);
                None
            }
        },
        MediaRef::Bytes(r) => {
            let name = r
                .name()
                .or(media.name())
                .unwrap_or("file")
                .to_string();
            Some(InputFile::memory(r.bytes().to_vec()).file_name(name))
        }
        MediaRef::PlatformFile(r) if r.platform() == Platform::Telegram.as_str() => {
            Some(InputFile::file_id(FileId(r.file_id().to_string())))
        }
        MediaRef::PlatformFile(r) => {
            warn!("Cannot send a {} file reference to telegram", r.platform());
            None
        }
    }
}

/// What the bot keeps of a Telegram message's content.
#[derive(Debug, Clone, PartialEq)]
enum Content {
    Text(String),
    Photo {
        file_id: String,
        size: u32,
    },
    Document {
        file_id: String,
        name: Option<String>,
        mime: Option<String>,
        size: u32,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
struct Author {
    id: u64,
    username: Option<String>,
    full_name: String,
    is_bot: bool,
}

/// The parts of a Telegram message that get normalized, as plain values.
#[derive(Debug, Clone, PartialEq)]
struct Fields {
    chat_id: i64,
    is_group: bool,
    title: Option<String>,
    from: Option<Author>,
    message_id: i32,
    timestamp_ms: i64,
    reply_to: Option<i32>,
    caption: Option<String>,
    content: Content,
}

impl Fields {
    fn of(msg: &Message) -> Self {
        let content = if let Some(text) = msg.text() {
            Content::Text(text.to_string())
        } else if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
            Content::Photo {
                file_id: photo.file.id.to_string(),
                size: photo.file.size,
            }
        } else if let Some(doc) = msg.document() {
            Content::Document {
                file_id: doc.file.id.to_string(),
                name: doc.file_name.clone(),
                mime: doc.mime_type.as_ref().map(|m| m.to_string()),
                size: doc.file.size,
            }
        } else {
            Content::Other
        };

        Self {
            chat_id: msg.chat.id.0,
            is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
            title: msg.chat.title().map(str::to_string),
            from: msg.from.as_ref().map(|user| Author {
                id: user.id.0,
                username: user.username.clone(),
                full_name: user.full_name(),
                is_bot: user.is_bot,
            }),
            message_id: msg.id.0,
            timestamp_ms: msg.date.timestamp_millis(),
            reply_to: msg.reply_to_message().map(|m| m.id.0),
            caption: msg.caption().map(str::to_string),
            content,
        }
    }

    /// Normalize. Messages without text or media are skipped.
    fn into_inbound(self) -> Option<InboundMessage> {
        let addr = Address::new(Platform::Telegram, self.chat_id, self.is_group);

        let sender = match self.from {
            Some(user) => Sender::new(
                i64::try_from(user.id).ok(),
                user.username,
                Some(user.full_name),
                user.is_bot,
            ),
            None => Sender::unknown(),
        };

        let platform = Platform::Telegram.as_str();
        let (raw_type, part) = match self.content {
            Content::Text(text) => ("text", InPart::text(text)),
            Content::Photo { file_id, size } => {
                let part = MediaPart::new(MediaRef::platform_file(platform, file_id).ok()?)
                    .with_caption(self.caption)
                    .with_size(Some(u64::from(size)));
                ("photo", InPart::Image(part))
            }
            Content::Document {
                file_id,
                name,
                mime,
                size,
            } => {
                let part = MediaPart::new(MediaRef::platform_file(platform, file_id).ok()?)
                    .with_caption(self.caption)
                    .with_name(name)
                    .with_mime(mime)
                    .with_size(Some(u64::from(size)));
                ("document", InPart::File(part))
            }
            Content::Other => return None,
        };

        let meta = MessageMeta::new(
            Some(self.message_id.to_string()),
            Some(self.timestamp_ms),
            self.reply_to.map(|id| id.to_string()),
            Some(raw_type.to_string()),
        );

        Some(
            InboundMessage::builder(addr)
                .sender(sender)
                .title(self.title)
                .meta(meta)
                .part(part)
                .build(),
        )
    }
}

async fn handle_message(msg: Message, sink: InboundSink) -> ResponseResult<()> {
    match Fields::of(&msg).into_inbound() {
        Some(inbound) => {
            if !sink.deliver(inbound).await {
                debug!("Inbound queue closed, dropping telegram message {}", msg.id.0);
            }
        }
        None => debug!("Ignoring telegram message {} without content", msg.id.0),
    }
    Ok(())
}

/// Long-polls Telegram and feeds every message into the inbound sink.
pub struct TelegramReceiver {
    bot: Bot,
    sink: Option<InboundSink>,
    shutdown: Option<ShutdownToken>,
    task: Option<JoinHandle<()>>,
}

impl TelegramReceiver {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            sink: None,
            shutdown: None,
            task: None,
        }
    }
}

#[async_trait]
impl PlatformReceiver for TelegramReceiver {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn bind(&mut self, sink: InboundSink) {
        self.sink = Some(sink);
    }

    async fn start(&mut self) -> Result<(), StartupError> {
        let sink = self.sink.clone().ok_or(StartupError::Unbound {
            platform: Platform::Telegram,
        })?;

        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| StartupError::connect(Platform::Telegram, e))?;
        info!("Connected to Telegram as @{}", me.username());

        let handler = Update::filter_message().endpoint(handle_message);
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![sink])
            .default_handler(|upd| async move {
                debug!("Unhandled update: {:?}", upd.id);
            })
            .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
            .build();

        self.shutdown = Some(dispatcher.shutdown_token());
        self.task = Some(tokio::spawn(async move {
            dispatcher.dispatch().await;
        }));
        info!("Telegram receiver started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(token) = self.shutdown.take() {
            match token.shutdown() {
                Ok(done) => done.await,
                Err(e) => debug!("Telegram dispatcher not running: {}", e),
            }
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Telegram dispatcher task failed: {}", e);
            }
        }
        info!("Telegram receiver stopped");
    }
}

/// Sends outbound messages through the Bot API. Called from lane threads,
/// so each delivery blocks on the runtime handle.
pub struct TelegramSender {
    bot: Bot,
    runtime: Handle,
}

impl TelegramSender {
    pub fn new(bot: Bot, runtime: Handle) -> Self {
        Self { bot, runtime }
    }

    async fn deliver(&self, message: &OutboundMessage) {
        let chat = ChatId(message.addr().chat_id);
        for step in plan_delivery(message) {
            let result = match step {
                Step::Text(text) => self.bot.send_message(chat, text).await.map(|_| ()),
                Step::Photo(media, caption) => {
                    let Some(file) = input_file(&media) else {
                        continue;
                    };
                    let mut request = self.bot.send_photo(chat, file);
                    if let Some(caption) = caption {
                        request = request.caption(caption);
                    }
                    request.await.map(|_| ())
                }
                Step::Document(media, caption) => {
                    let Some(file) = input_file(&media) else {
                        continue;
                    };
                    let mut request = self.bot.send_document(chat, file);
                    if let Some(caption) = caption {
                        request = request.caption(caption);
                    }
                    request.await.map(|_| ())
                }
            };
            if let Err(e) = result {
                error!("Failed to send to {}: {}", message.addr(), e);
            }
        }
    }
}

impl PlatformSender for TelegramSender {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn send(&self, message: &OutboundMessage) {
        self.runtime.block_on(self.deliver(message));
    }
}
