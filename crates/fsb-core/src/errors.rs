use crate::messaging::types::SendErrorKind;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the core can tell
/// permanent delivery failures apart from formatting problems and transient noise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("send failed ({kind:?}): {message}")]
    Send { kind: SendErrorKind, message: String },

    #[error("render error: {0}")]
    Render(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Build a transport error, classifying it from its text.
    pub fn send(message: impl Into<String>) -> Self {
        let message = message.into();
        Error::Send {
            kind: SendErrorKind::classify(&message),
            message,
        }
    }

    /// Classification of a transport failure; non-transport errors are `Other`.
    pub fn send_kind(&self) -> SendErrorKind {
        match self {
            Error::Send { kind, .. } => *kind,
            _ => SendErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
