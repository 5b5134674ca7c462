use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use fsb_core::messaging::throttled::ThrottledMessenger;
use fsb_core::{
    broadcast::BroadcastDispatcher, config::Config, domain::UserId,
    messaging::port::MessagingPort, ports::SubscriptionStore, registrar::SubscriptionRegistrar,
    render::TemplateRenderer, security::AccessControl,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub store: Arc<dyn SubscriptionStore>,
    pub access: Arc<AccessControl>,
    pub registrar: Arc<SubscriptionRegistrar>,
    /// Handed to the feed poller, which owns delivery timing.
    pub broadcaster: Arc<BroadcastDispatcher>,
    pub chat_locks: Arc<ChatLocks>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn SubscriptionStore>,
    ) -> fsb_core::Result<Self> {
        let renderer = Arc::new(TemplateRenderer::new(cfg.message_template.as_deref())?);
        Ok(Self {
            access: Arc::new(AccessControl::new(messenger.clone(), &cfg)),
            registrar: Arc::new(SubscriptionRegistrar::new(
                messenger.clone(),
                store.clone(),
            )),
            broadcaster: Arc::new(BroadcastDispatcher::new(
                messenger.clone(),
                store.clone(),
                renderer,
                cfg.clone(),
            )),
            chat_locks: Arc::new(ChatLocks::default()),
            cfg,
            messenger,
            store,
        })
    }
}

/// Locks are pruned once the map grows past this many chats.
const CHAT_LOCKS_PRUNE_AT: usize = 256;

/// Serializes command handling per chat so progress edits of one registration
/// don't interleave with another.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() >= CHAT_LOCKS_PRUNE_AT {
                prune_unused(&mut map);
            }
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Drop locks that no guard or waiter references.
fn prune_unused(map: &mut HashMap<i64, Arc<Mutex<()>>>) {
    map.retain(|_, lock| Arc::strong_count(lock) > 1);
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn SubscriptionStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    info!(
        username = %me.username(),
        allowed_users = cfg.allowed_users.len(),
        mode = ?cfg.message_mode,
        "bot started"
    );
    if cfg.allowed_users.is_empty() {
        warn!("ALLOWED_USERS is empty, every user may issue commands");
    }

    // Keep the 429 RetryAfter retry at the adapter layer; the decorator only spaces calls.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        UserId(me.id.0 as i64),
    ));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        cfg.throttle,
    ));

    let state = Arc::new(AppState::new(cfg, messenger, store)?);

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
