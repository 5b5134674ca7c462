use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    ChannelPrivate,
}

impl ChatKind {
    /// Chats where platform admin status decides who may act.
    ///
    /// Private chats have no admins: whoever is talking is the owner.
    pub fn is_admin_context(self) -> bool {
        matches!(
            self,
            ChatKind::Group | ChatKind::Supergroup | ChatKind::Channel | ChatKind::ChannelPrivate
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl Chat {
    pub fn private(id: i64) -> Self {
        Self {
            id: ChatId(id),
            kind: ChatKind::Private,
            title: None,
            username: None,
        }
    }

    /// Best human-readable name: title, then `@username`, then the numeric id.
    pub fn display_name(&self) -> String {
        if let Some(t) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return t.to_string();
        }
        if let Some(u) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return format!("@{u}");
        }
        self.id.0.to_string()
    }
}

/// A followed feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub error_count: u32,
}

/// Link between a chat and a [`Source`], carrying per-chat delivery preferences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub chat_id: ChatId,
    pub source_id: SourceId,
    #[serde(default)]
    pub tag: String,
    pub enable_notification: bool,
    pub enable_telegraph: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, chat_id: ChatId, source_id: SourceId) -> Self {
        Self {
            id,
            chat_id,
            source_id,
            tag: String::new(),
            enable_notification: true,
            enable_telegraph: true,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// One new item of a source, as produced by the poller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    pub source_id: SourceId,
    pub title: String,
    pub raw_link: String,
    pub description: String,
    pub telegraph_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_private_chats_skip_admin_gating() {
        assert!(!ChatKind::Private.is_admin_context());
        for kind in [
            ChatKind::Group,
            ChatKind::Supergroup,
            ChatKind::Channel,
            ChatKind::ChannelPrivate,
        ] {
            assert!(kind.is_admin_context(), "{kind:?}");
        }
    }

    #[test]
    fn display_name_falls_back_to_username_then_id() {
        let mut chat = Chat::private(42);
        assert_eq!(chat.display_name(), "42");
        chat.username = Some("news".to_string());
        assert_eq!(chat.display_name(), "@news");
        chat.title = Some("News".to_string());
        assert_eq!(chat.display_name(), "News");
    }
}
