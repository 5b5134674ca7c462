//! Telegram adapter (teloxide).
//!
//! This crate implements the `fsb-core` MessagingPort over Telegram Bot API and
//! routes inbound updates to the core workflows.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, Recipient},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod convert;
pub mod handlers;
pub mod router;

use fsb_core::{
    domain::{Chat, ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{
            InlineKeyboard, MessagingCapabilities, RenderMode, SendErrorKind, SendOptions,
        },
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    me: UserId,
}

impl TelegramMessenger {
    /// `me` is the bot's own user id, as reported by `getMe`.
    pub fn new(bot: Bot, me: UserId) -> Self {
        Self { bot, me }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn parse_mode(mode: RenderMode) -> Option<ParseMode> {
        match mode {
            RenderMode::Html => Some(ParseMode::Html),
            #[allow(deprecated)]
            RenderMode::Markdown => Some(ParseMode::Markdown),
            RenderMode::Plain => None,
        }
    }

    fn map_err(e: RequestError) -> Error {
        let message = format!("telegram error: {e}");
        Error::Send {
            kind: classify_request_error(&e, &message),
            message,
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// Structured classification first; error text only for what the API enum lumps
/// into `Unknown`.
pub fn classify_request_error(e: &RequestError, message: &str) -> SendErrorKind {
    match e {
        RequestError::Api(
            ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation,
        ) => SendErrorKind::PermissionRevoked,
        RequestError::Api(ApiError::CantParseEntities) => SendErrorKind::FormatRejected,
        _ => SendErrorKind::classify(message),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    fn bot_user_id(&self) -> UserId {
        self.me
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        body: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), body.to_string())
                    .disable_web_page_preview(opts.disable_web_page_preview)
                    .disable_notification(opts.silent);
                if let Some(mode) = Self::parse_mode(opts.render_mode) {
                    req = req.parse_mode(mode);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        body: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let edited = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        body.to_string(),
                    )
                    .disable_web_page_preview(opts.disable_web_page_preview);
                if let Some(mode) = Self::parse_mode(opts.render_mode) {
                    req = req.parse_mode(mode);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id: msg.chat_id,
            message_id: MessageId(edited.id.0),
        })
    }

    async fn resolve_chat(&self, identifier: &str) -> Result<Chat> {
        let recipient = match identifier.trim().parse::<i64>() {
            Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
            Err(_) => {
                let name = identifier.trim().trim_start_matches('@');
                Recipient::ChannelUsername(format!("@{name}"))
            }
        };
        let chat = self
            .with_retry(|| self.bot.get_chat(recipient.clone()))
            .await?;
        Ok(convert::chat_from_tg(&chat))
    }

    async fn list_admins(&self, chat: &Chat) -> Result<Vec<UserId>> {
        let members = self
            .with_retry(|| self.bot.get_chat_administrators(Self::tg_chat(chat.id)))
            .await?;
        Ok(members
            .into_iter()
            .map(|m| UserId(m.user.id.0 as i64))
            .collect())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();
        let markup = InlineKeyboardMarkup::new(rows);

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(e: RequestError) -> SendErrorKind {
        let message = format!("telegram error: {e}");
        classify_request_error(&e, &message)
    }

    #[test]
    fn blocked_and_kicked_revoke_permission() {
        assert_eq!(
            kind_of(RequestError::Api(ApiError::BotBlocked)),
            SendErrorKind::PermissionRevoked
        );
        assert_eq!(
            kind_of(RequestError::Api(ApiError::BotKicked)),
            SendErrorKind::PermissionRevoked
        );
        assert_eq!(
            kind_of(RequestError::Api(ApiError::UserDeactivated)),
            SendErrorKind::PermissionRevoked
        );
    }

    #[test]
    fn entity_errors_are_format_rejections() {
        assert_eq!(
            kind_of(RequestError::Api(ApiError::CantParseEntities)),
            SendErrorKind::FormatRejected
        );
    }

    #[test]
    fn unknown_errors_fall_back_to_text() {
        assert_eq!(
            kind_of(RequestError::Api(ApiError::Unknown(
                "Forbidden: bot was kicked from the channel chat".to_string()
            ))),
            SendErrorKind::PermissionRevoked
        );
        assert_eq!(
            kind_of(RequestError::Api(ApiError::Unknown(
                "Bad Request: message is too long".to_string()
            ))),
            SendErrorKind::Other
        );
    }
}
