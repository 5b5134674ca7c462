use async_trait::async_trait;

use crate::{
    domain::{Chat, ChatId, MessageRef, UserId},
    messaging::types::{InlineKeyboard, MessagingCapabilities, SendOptions},
    Result,
};

/// Outbound transport port.
///
/// Send failures come back as [`crate::Error::Send`] with a classified
/// [`crate::messaging::types::SendErrorKind`]; adapters should classify from
/// structured API errors and only fall back to text matching.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// The bot's own user id (used for the bot-capability check on channels).
    fn bot_user_id(&self) -> UserId;

    async fn send_message(
        &self,
        chat_id: ChatId,
        body: &str,
        opts: SendOptions,
    ) -> Result<MessageRef>;

    async fn edit_message(&self, msg: MessageRef, body: &str, opts: SendOptions)
        -> Result<MessageRef>;

    /// Resolve a chat by `@username` or numeric id string.
    async fn resolve_chat(&self, identifier: &str) -> Result<Chat>;

    /// Current administrators of `chat`. Always fetched live.
    async fn list_admins(&self, chat: &Chat) -> Result<Vec<UserId>>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
