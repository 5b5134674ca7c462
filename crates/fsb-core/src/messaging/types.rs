use crate::domain::{Chat, MessageRef, UserId};

/// Incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter; handlers in the core only
/// see the parts the access checks and extractors read.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Message(InboundMessage),
    Callback(CallbackQuery),
}

impl IncomingUpdate {
    /// Chat the update was issued from.
    pub fn chat(&self) -> &Chat {
        match self {
            IncomingUpdate::Message(m) => &m.chat,
            IncomingUpdate::Callback(q) => &q.chat,
        }
    }

    /// Acting user, if the platform told us who it was (channel posts don't).
    pub fn actor(&self) -> Option<UserId> {
        match self {
            IncomingUpdate::Message(m) => m.sender,
            IncomingUpdate::Callback(q) => Some(q.sender),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Mention,
    Url,
    Other,
}

/// Annotated span of a message text. Offsets are in UTF-16 code units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl MessageEntity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat: Chat,
    pub sender: Option<UserId>,
    pub text: String,
    pub entities: Vec<MessageEntity>,
    pub caption: String,
    pub caption_entities: Vec<MessageEntity>,
}

impl InboundMessage {
    /// Everything after the leading `/command[@bot]` token, trimmed.
    ///
    /// Empty when the message is not a command.
    pub fn payload(&self) -> &str {
        let text = self.text.trim_start();
        if !text.starts_with('/') {
            return "";
        }
        match text.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }

    /// Lowercased command name without the leading `/` and `@botname` suffix.
    pub fn command(&self) -> Option<String> {
        let first = self.text.trim_start().split_whitespace().next()?;
        let name = first.strip_prefix('/')?.split('@').next().unwrap_or("");
        if name.is_empty() {
            return None;
        }
        Some(name.to_lowercase())
    }
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat: Chat,
    pub sender: UserId,
    pub callback_id: String,
    pub data: String,
    pub message: Option<MessageRef>,
}

/// Inline keyboard (buttons) attached to a message.
#[derive(Clone, Debug, Default)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}

/// How the platform should interpret a message body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    Plain,
    Markdown,
    #[default]
    Html,
}

impl RenderMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "plain" | "text" | "" => Some(RenderMode::Plain),
            "markdown" | "md" => Some(RenderMode::Markdown),
            "html" => Some(RenderMode::Html),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub disable_web_page_preview: bool,
    pub render_mode: RenderMode,
    pub silent: bool,
}

impl SendOptions {
    pub fn html() -> Self {
        Self {
            render_mode: RenderMode::Html,
            ..Default::default()
        }
    }

    pub fn plain() -> Self {
        Self {
            render_mode: RenderMode::Plain,
            ..Default::default()
        }
    }
}

/// What a failed send means for the recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendErrorKind {
    /// The bot can no longer reach this recipient (blocked, kicked, deactivated).
    PermissionRevoked,
    /// The platform refused the body's markup.
    FormatRejected,
    Other,
}

impl SendErrorKind {
    /// Text-matching fallback for transports that only hand back an error string.
    pub fn classify(message: &str) -> Self {
        if message.contains("Forbidden") {
            return SendErrorKind::PermissionRevoked;
        }
        if message.contains("parse entities") {
            return SendErrorKind::FormatRejected;
        }
        SendErrorKind::Other
    }
}
