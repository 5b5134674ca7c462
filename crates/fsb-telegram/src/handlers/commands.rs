use tracing::info;

use fsb_core::{
    domain::Chat,
    entities::{extract_mention, extract_url_and_mention},
    formatting::{escape_html, link},
    messaging::types::{
        InboundMessage, IncomingUpdate, InlineButton, InlineKeyboard, RenderMode, SendOptions,
    },
    registrar::SENDER_NOT_ADMIN,
    Result,
};

use crate::router::AppState;

use super::callback::unsub_data;

const HELP: &str = "<b>Feed subscription bot</b>\n\n\
/sub &lt;url&gt; - subscribe this chat to a feed\n\
/sub &lt;url&gt; @channel - subscribe a channel you manage\n\
/list [@channel] - show subscriptions\n\
/unsub [@channel] - pick a subscription to remove\n\
/help - this message";

const NO_SUBSCRIPTIONS: &str = "No subscriptions yet";

pub(crate) async fn handle_command(
    state: &AppState,
    update: &IncomingUpdate,
    msg: &InboundMessage,
    cmd: &str,
) -> Result<()> {
    match cmd {
        "start" | "help" => {
            state
                .messenger
                .send_message(msg.chat.id, HELP, SendOptions::html())
                .await?;
            Ok(())
        }
        "sub" => handle_sub(state, update, msg).await,
        "list" => handle_list(state, update, msg).await,
        "unsub" => handle_unsub(state, update, msg).await,
        _ => Ok(()),
    }
}

async fn handle_sub(state: &AppState, update: &IncomingUpdate, msg: &InboundMessage) -> Result<()> {
    let (url, mention) = extract_url_and_mention(msg);
    if url.is_empty() {
        return state.registrar.send_usage_error(msg.chat.id).await;
    }

    if !mention.is_empty() {
        let Some(actor) = msg.sender else {
            deny(state, msg).await?;
            return Ok(());
        };
        let outcome = state
            .registrar
            .register_for_channel(msg.chat.id, actor, &url, &mention)
            .await?;
        info!(chat_id = msg.chat.id.0, channel = %mention, ?outcome, "channel registration");
        return Ok(());
    }

    if !state.access.check_requester_is_admin(update).await {
        deny(state, msg).await?;
        return Ok(());
    }
    let outcome = state.registrar.register_for_chat(&msg.chat, &url).await?;
    info!(chat_id = msg.chat.id.0, ?outcome, "chat registration");
    Ok(())
}

async fn handle_list(state: &AppState, update: &IncomingUpdate, msg: &InboundMessage) -> Result<()> {
    let Some(target) = target_chat(state, update, msg).await? else {
        return Ok(());
    };

    let subs = state.store.subscriptions_of_chat(target.id).await?;
    if subs.is_empty() {
        state
            .messenger
            .send_message(msg.chat.id, NO_SUBSCRIPTIONS, SendOptions::plain())
            .await?;
        return Ok(());
    }

    let mut lines = vec![format!(
        "<b>Subscriptions of {}</b>",
        escape_html(&target.display_name())
    )];
    for sub in &subs {
        let source = state.store.source(sub.source_id).await?;
        lines.push(format!(
            "[{}] {}",
            sub.id.0,
            link(RenderMode::Html, &source.title, &source.link)
        ));
    }

    let opts = SendOptions {
        disable_web_page_preview: true,
        ..SendOptions::html()
    };
    let limit = state.messenger.capabilities().max_message_len;
    for chunk in chunk_lines(&lines, limit) {
        state
            .messenger
            .send_message(msg.chat.id, &chunk, opts)
            .await?;
    }
    Ok(())
}

async fn handle_unsub(
    state: &AppState,
    update: &IncomingUpdate,
    msg: &InboundMessage,
) -> Result<()> {
    let Some(target) = target_chat(state, update, msg).await? else {
        return Ok(());
    };

    let subs = state.store.subscriptions_of_chat(target.id).await?;
    let mut buttons = Vec::with_capacity(subs.len());
    for sub in &subs {
        let source = state.store.source(sub.source_id).await?;
        buttons.push(InlineButton {
            label: format!("[{}] {}", sub.id.0, source.title),
            callback_data: unsub_data(target.id, sub.id),
        });
    }

    let keyboard = InlineKeyboard::new(buttons);
    if keyboard.is_empty() {
        state
            .messenger
            .send_message(msg.chat.id, NO_SUBSCRIPTIONS, SendOptions::plain())
            .await?;
        return Ok(());
    }

    let text = format!(
        "Select a subscription of <b>{}</b> to remove",
        escape_html(&target.display_name())
    );
    state
        .messenger
        .send_inline_keyboard(msg.chat.id, &text, keyboard)
        .await?;
    Ok(())
}

/// Chat a list/unsub command operates on: the mentioned channel, or the invoking chat.
///
/// Returns `None` after telling the user why when the requester may not manage it.
async fn target_chat(
    state: &AppState,
    update: &IncomingUpdate,
    msg: &InboundMessage,
) -> Result<Option<Chat>> {
    let mention = extract_mention(msg);
    if mention.is_empty() {
        if !state.access.check_requester_is_admin(update).await {
            deny(state, msg).await?;
            return Ok(None);
        }
        return Ok(Some(msg.chat.clone()));
    }

    let channel = match state.messenger.resolve_chat(&mention).await {
        Ok(c) => c,
        Err(_) => {
            state
                .messenger
                .send_message(
                    msg.chat.id,
                    &format!("Channel {mention} not found"),
                    SendOptions::plain(),
                )
                .await?;
            return Ok(None);
        }
    };

    let allowed = match msg.sender {
        Some(actor) => state.access.is_user_admin_of_chat(actor, &channel).await,
        None => false,
    };
    if !allowed {
        deny(state, msg).await?;
        return Ok(None);
    }
    Ok(Some(channel))
}

async fn deny(state: &AppState, msg: &InboundMessage) -> Result<()> {
    state
        .messenger
        .send_message(msg.chat.id, SENDER_NOT_ADMIN, SendOptions::plain())
        .await?;
    Ok(())
}

/// Join lines into messages of at most `limit` chars, never splitting a line
/// unless it alone exceeds the limit.
fn chunk_lines(lines: &[String], limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut out = Vec::new();
    let mut chunk = String::new();

    for line in lines {
        let needed = if chunk.is_empty() {
            line.chars().count()
        } else {
            chunk.chars().count() + 1 + line.chars().count()
        };
        if needed > limit && !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }
        if line.chars().count() > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                out.push(piece.iter().collect());
            }
            continue;
        }
        if !chunk.is_empty() {
            chunk.push('\n');
        }
        chunk.push_str(line);
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::{process_message, test_support::*};
    use super::*;
    use fsb_core::{
        domain::{ChatId, ChatKind},
        ports::SubscriptionStore,
        registrar::USAGE_ERROR,
        testing::{channel, test_config, BOT_ID},
    };

    fn group(id: i64) -> Chat {
        Chat {
            id: ChatId(id),
            kind: ChatKind::Supergroup,
            title: Some("devs".to_string()),
            username: None,
        }
    }

    #[test]
    fn chunks_respect_limit() {
        let lines = vec!["aaaa".to_string(), "bbbb".to_string(), "cc".to_string()];
        assert_eq!(chunk_lines(&lines, 9), vec!["aaaa\nbbbb", "cc"]);
        assert_eq!(chunk_lines(&lines, 100), vec!["aaaa\nbbbb\ncc"]);
        assert_eq!(
            chunk_lines(&["abcdef".to_string()], 4),
            vec!["abcd".to_string(), "ef".to_string()]
        );
    }

    #[tokio::test]
    async fn sub_without_url_sends_usage_error() {
        let (api, _store, state) = state_with(test_config());
        process_message(&state, command(Chat::private(5), 5, "/sub")).await;
        assert_eq!(api.sent_bodies(), vec![USAGE_ERROR.to_string()]);
    }

    #[tokio::test]
    async fn sub_in_private_chat_subscribes_it() {
        let (api, store, state) = state_with(test_config());
        process_message(
            &state,
            command(Chat::private(5), 5, "/sub https://example.com/feed.xml"),
        )
        .await;

        let subs = store.subscriptions_of_chat(ChatId(5)).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(api.admin_lookups(), 0);
    }

    #[tokio::test]
    async fn group_sub_needs_admin() {
        let (api, store, state) = state_with(test_config());
        api.set_admins(-300, &[7]);

        process_message(
            &state,
            command(group(-300), 8, "/sub https://example.com/feed.xml"),
        )
        .await;
        assert_eq!(api.sent_bodies(), vec![SENDER_NOT_ADMIN.to_string()]);
        assert!(store
            .subscriptions_of_chat(ChatId(-300))
            .await
            .unwrap()
            .is_empty());

        process_message(
            &state,
            command(group(-300), 7, "/sub https://example.com/feed.xml"),
        )
        .await;
        assert_eq!(
            store.subscriptions_of_chat(ChatId(-300)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn sub_with_mention_registers_channel() {
        let (api, store, state) = state_with(test_config());
        api.add_chat(channel(-100, "news"));
        api.set_admins(-100, &[BOT_ID.0, 5]);

        process_message(
            &state,
            command(Chat::private(5), 5, "/sub https://example.com/feed.xml @news"),
        )
        .await;

        assert_eq!(
            store.subscriptions_of_chat(ChatId(-100)).await.unwrap().len(),
            1
        );
        assert!(store
            .subscriptions_of_chat(ChatId(5))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_shows_titles_and_links() {
        let (api, store, state) = state_with(test_config());
        let source = store
            .find_or_create_source("https://example.com/feed.xml")
            .await
            .unwrap();
        store
            .create_subscription(ChatId(5), source.id)
            .await
            .unwrap();

        process_message(&state, command(Chat::private(5), 5, "/list")).await;

        let sent = api.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("href=\"https://example.com/feed.xml\""));
        assert!(sent[0].opts.disable_web_page_preview);
    }

    #[tokio::test]
    async fn list_of_empty_chat() {
        let (api, _store, state) = state_with(test_config());
        process_message(&state, command(Chat::private(5), 5, "/list")).await;
        assert_eq!(api.sent_bodies(), vec![NO_SUBSCRIPTIONS.to_string()]);
    }

    #[tokio::test]
    async fn list_of_channel_requires_channel_admin() {
        let (api, store, state) = state_with(test_config());
        api.add_chat(channel(-100, "news"));
        api.set_admins(-100, &[BOT_ID.0, 5]);
        let source = store
            .find_or_create_source("https://example.com/feed.xml")
            .await
            .unwrap();
        store
            .create_subscription(ChatId(-100), source.id)
            .await
            .unwrap();

        process_message(&state, command(Chat::private(6), 6, "/list @news")).await;
        assert_eq!(api.sent_bodies(), vec![SENDER_NOT_ADMIN.to_string()]);

        process_message(&state, command(Chat::private(5), 5, "/list @news")).await;
        let last = api.sent_bodies().pop().unwrap();
        assert!(last.contains("news channel"));
    }

    #[tokio::test]
    async fn unknown_channel_mention_is_reported() {
        let (api, _store, state) = state_with(test_config());
        process_message(&state, command(Chat::private(5), 5, "/unsub @ghost")).await;
        assert_eq!(
            api.sent_bodies(),
            vec!["Channel @ghost not found".to_string()]
        );
    }

    #[tokio::test]
    async fn unsub_offers_one_button_per_subscription() {
        let (api, store, state) = state_with(test_config());
        let a = store
            .find_or_create_source("https://a.example/feed")
            .await
            .unwrap();
        let b = store
            .find_or_create_source("https://b.example/feed")
            .await
            .unwrap();
        let sa = store.create_subscription(ChatId(5), a.id).await.unwrap();
        let sb = store.create_subscription(ChatId(5), b.id).await.unwrap();

        process_message(&state, command(Chat::private(5), 5, "/unsub")).await;

        let keyboards = api.keyboards();
        assert_eq!(keyboards.len(), 1);
        let data: Vec<String> = keyboards[0]
            .2
            .buttons
            .iter()
            .map(|b| b.callback_data.clone())
            .collect();
        assert_eq!(
            data,
            vec![unsub_data(ChatId(5), sa.id), unsub_data(ChatId(5), sb.id)]
        );
    }
}
