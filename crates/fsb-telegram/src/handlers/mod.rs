//! Telegram update handlers.
//!
//! Each teloxide endpoint converts the update into the core model and hands it to
//! a handler that only talks to `AppState`, so the logic runs against fakes in tests.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{debug, warn};

use fsb_core::messaging::types::{InboundMessage, IncomingUpdate, SendOptions};

use crate::convert;
use crate::router::AppState;

mod callback;
mod commands;

pub use callback::parse_unsub_data;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    match convert::callback_from_tg(&q) {
        Some(cb) => callback::process_callback(&state, cb).await,
        None => {
            let _ = state.messenger.answer_callback_query(&q.id, None).await;
        }
    }
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let inbound = convert::inbound_from_tg(&msg);
    process_message(&state, inbound).await;
    Ok(())
}

pub(crate) async fn process_message(state: &AppState, msg: InboundMessage) {
    // Plain chatter in groups is none of our business.
    let Some(cmd) = msg.command() else {
        return;
    };

    let update = IncomingUpdate::Message(msg.clone());
    if !state.access.is_actor_allowed(&update) {
        if !msg.chat.kind.is_admin_context() {
            let _ = state
                .messenger
                .send_message(
                    msg.chat.id,
                    "Unauthorized. Contact the bot owner for access.",
                    SendOptions::plain(),
                )
                .await;
        }
        return;
    }

    debug!(chat_id = msg.chat.id.0, command = %cmd, "command received");

    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;
    if let Err(e) = commands::handle_command(state, &update, &msg, &cmd).await {
        warn!(chat_id = msg.chat.id.0, command = %cmd, error = %e, "command failed");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use fsb_core::{
        config::Config,
        domain::{Chat, UserId},
        messaging::types::{EntityKind, InboundMessage, MessageEntity},
        testing::{FakeMessenger, FakeStore},
    };

    use crate::router::AppState;

    pub fn state_with(
        cfg: Config,
    ) -> (Arc<FakeMessenger>, Arc<FakeStore>, AppState) {
        let api = Arc::new(FakeMessenger::new());
        let store = Arc::new(FakeStore::new());
        let state = AppState::new(Arc::new(cfg), api.clone(), store.clone())
            .expect("default templates parse");
        (api, store, state)
    }

    /// Command message with Mention/Url entities computed from the text.
    pub fn command(chat: Chat, sender: i64, text: &str) -> InboundMessage {
        let mut entities = Vec::new();
        let mut offset = 0usize;
        for word in text.split(' ') {
            let len = word.encode_utf16().count();
            if word.starts_with('@') {
                entities.push(MessageEntity::new(EntityKind::Mention, offset, len));
            } else if word.starts_with("http://") || word.starts_with("https://") {
                entities.push(MessageEntity::new(EntityKind::Url, offset, len));
            }
            offset += len + 1;
        }
        InboundMessage {
            chat,
            sender: Some(UserId(sender)),
            text: text.to_string(),
            entities,
            caption: String::new(),
            caption_entities: vec![],
        }
    }
}
