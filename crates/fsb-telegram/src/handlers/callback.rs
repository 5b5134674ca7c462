use tracing::{info, warn};

use fsb_core::{
    domain::{ChatId, SubscriptionId},
    formatting::escape_html,
    messaging::types::{CallbackQuery, IncomingUpdate, SendOptions},
    registrar::SENDER_NOT_ADMIN,
    Result,
};

use crate::router::AppState;

const UNSUB_PREFIX: &str = "unsub:";

/// Callback data of an unsubscribe button: `unsub:{chat_id}:{subscription_id}`.
pub(crate) fn unsub_data(chat_id: ChatId, id: SubscriptionId) -> String {
    format!("{UNSUB_PREFIX}{}:{}", chat_id.0, id.0)
}

pub fn parse_unsub_data(data: &str) -> Option<(ChatId, SubscriptionId)> {
    let rest = data.strip_prefix(UNSUB_PREFIX)?;
    let (chat, id) = rest.split_once(':')?;
    Some((
        ChatId(chat.parse().ok()?),
        SubscriptionId(id.parse().ok()?),
    ))
}

pub(crate) async fn process_callback(state: &AppState, cb: CallbackQuery) {
    let update = IncomingUpdate::Callback(cb.clone());
    let answer = match unsubscribe(state, &update, &cb).await {
        Ok(text) => text,
        Err(e) => {
            warn!(chat_id = cb.chat.id.0, data = %cb.data, error = %e, "unsubscribe failed");
            "Unsubscribe failed".to_string()
        }
    };
    // Always answer, or the client keeps spinning.
    let _ = state
        .messenger
        .answer_callback_query(&cb.callback_id, Some(&answer))
        .await;
}

async fn unsubscribe(
    state: &AppState,
    update: &IncomingUpdate,
    cb: &CallbackQuery,
) -> Result<String> {
    if !state.access.is_actor_allowed(update) {
        return Ok("Unauthorized".to_string());
    }
    let Some((chat_id, sub_id)) = parse_unsub_data(&cb.data) else {
        return Ok("Invalid callback data".to_string());
    };

    // Buttons for a channel are pressed in the chat that asked for them, so the
    // check runs against the chat that owns the subscription.
    let allowed = if chat_id == cb.chat.id {
        state.access.check_requester_is_admin(update).await
    } else {
        match state.messenger.resolve_chat(&chat_id.0.to_string()).await {
            Ok(target) => state.access.is_user_admin_of_chat(cb.sender, &target).await,
            Err(_) => false,
        }
    };
    if !allowed {
        return Ok(SENDER_NOT_ADMIN.to_string());
    }

    let subs = state.store.subscriptions_of_chat(chat_id).await?;
    let Some(sub) = subs.into_iter().find(|s| s.id == sub_id) else {
        return Ok("Already unsubscribed".to_string());
    };
    let source = state.store.source(sub.source_id).await?;
    state.store.disable_subscription(sub.id).await?;
    info!(
        chat_id = chat_id.0,
        subscription_id = sub.id.0,
        user_id = cb.sender.0,
        "subscription disabled"
    );

    if let Some(message) = cb.message {
        let text = format!("Unsubscribed <b>{}</b>", escape_html(&source.title));
        let _ = state
            .messenger
            .edit_message(message, &text, SendOptions::html())
            .await;
    }
    Ok("Unsubscribed".to_string())
}
