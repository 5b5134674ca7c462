//! teloxide types -> core update model.

use teloxide::types::{
    CallbackQuery as TgCallbackQuery, Chat as TgChat, Message, MessageEntity as TgEntity,
    MessageEntityKind,
};

use fsb_core::{
    domain::{Chat, ChatId, ChatKind, MessageId, MessageRef, UserId},
    messaging::types::{CallbackQuery, EntityKind, InboundMessage, MessageEntity},
};

pub fn chat_from_tg(chat: &TgChat) -> Chat {
    let username = chat.username().map(str::to_string);
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_group() {
        ChatKind::Group
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if username.is_some() {
        ChatKind::Channel
    } else {
        ChatKind::ChannelPrivate
    };

    Chat {
        id: ChatId(chat.id.0),
        kind,
        title: chat.title().map(str::to_string),
        username,
    }
}

fn entity_kind(kind: &MessageEntityKind) -> EntityKind {
    match kind {
        MessageEntityKind::Mention => EntityKind::Mention,
        MessageEntityKind::Url => EntityKind::Url,
        _ => EntityKind::Other,
    }
}

pub fn entities_from_tg(entities: Option<&[TgEntity]>) -> Vec<MessageEntity> {
    entities
        .unwrap_or_default()
        .iter()
        .map(|e| MessageEntity::new(entity_kind(&e.kind), e.offset, e.length))
        .collect()
}

pub fn inbound_from_tg(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat: chat_from_tg(&msg.chat),
        sender: msg.from().map(|u| UserId(u.id.0 as i64)),
        text: msg.text().unwrap_or_default().to_string(),
        entities: entities_from_tg(msg.entities()),
        caption: msg.caption().unwrap_or_default().to_string(),
        caption_entities: entities_from_tg(msg.caption_entities()),
    }
}

/// `None` for callbacks whose message is gone (inline mode, very old messages).
pub fn callback_from_tg(q: &TgCallbackQuery) -> Option<CallbackQuery> {
    let msg = q.message.as_ref()?;
    Some(CallbackQuery {
        chat: chat_from_tg(&msg.chat),
        sender: UserId(q.from.id.0 as i64),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message: Some(MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        }),
    })
}
