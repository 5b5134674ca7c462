use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{Chat, ChatId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, SendOptions},
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

/// Per-chat limiters are pruned once the map grows past this many chats.
const PER_CHAT_PRUNE_AT: usize = 1024;

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve_at(&mut self, now: Instant) -> Duration {
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that rate-limits outbound calls.
///
/// Broadcasts touch many chats back to back, so the global limiter is what usually
/// bites; the per-chat one matters for the progressive edits of registration replies.
/// Admin lookups and chat resolution are read calls and only pay the global interval.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        if map.len() >= PER_CHAT_PRUNE_AT {
            prune_idle(&mut map, Instant::now());
        }
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let now = Instant::now();
        let global_wait = { self.global.lock().await.reserve_at(now) };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve_at(now)
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve_at(Instant::now()) };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

/// Drop limiters nobody holds whose reserved slot already passed; a fresh one
/// would hand out the same (zero) wait.
fn prune_idle(map: &mut HashMap<i64, Arc<Mutex<IntervalLimiter>>>, now: Instant) {
    map.retain(|_, lim| {
        if Arc::strong_count(lim) > 1 {
            return true;
        }
        match lim.try_lock() {
            Ok(guard) => guard.next > now,
            Err(_) => true,
        }
    });
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    fn bot_user_id(&self) -> UserId {
        self.inner.bot_user_id()
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        body: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_message(chat_id, body, opts).await
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        body: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.edit_message(msg, body, opts).await
    }

    async fn resolve_chat(&self, identifier: &str) -> Result<Chat> {
        self.throttle_global().await;
        self.inner.resolve_chat(identifier).await
    }

    async fn list_admins(&self, chat: &Chat) -> Result<Vec<UserId>> {
        self.throttle_global().await;
        self.inner.list_admins(chat).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id.0).await;
        self.inner
            .send_inline_keyboard(chat_id, text, keyboard)
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // No chat_id available here; apply global throttling only.
        self.throttle_global().await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMessenger;

    #[test]
    fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(100));
        let now = Instant::now();
        assert_eq!(lim.reserve_at(now), Duration::ZERO);
        assert_eq!(lim.reserve_at(now), Duration::from_millis(100));
        assert_eq!(lim.reserve_at(now), Duration::from_millis(200));
        // A late caller starts from its own clock.
        assert_eq!(
            lim.reserve_at(now + Duration::from_secs(1)),
            Duration::ZERO
        );
    }

    #[test]
    fn idle_chat_limiters_are_pruned() {
        let now = Instant::now();
        let mut map = HashMap::new();
        for (chat, interval) in [(1, Duration::ZERO), (2, Duration::from_secs(60))] {
            let mut lim = IntervalLimiter::new(interval);
            lim.reserve_at(now);
            map.insert(chat, Arc::new(Mutex::new(lim)));
        }

        prune_idle(&mut map, now + Duration::from_millis(1));

        // Chat 2 still has a reserved slot ahead and must keep its spacing.
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn forwards_calls_to_inner() {
        let inner = Arc::new(FakeMessenger::new());
        let throttled = ThrottledMessenger::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::ZERO,
                per_chat_min_interval: Duration::ZERO,
            },
        );

        let msg = throttled
            .send_message(ChatId(7), "hi", SendOptions::plain())
            .await
            .unwrap();
        throttled
            .edit_message(msg, "bye", SendOptions::plain())
            .await
            .unwrap();

        assert_eq!(throttled.bot_user_id(), inner.bot_user_id());
        assert_eq!(inner.sent_bodies(), vec!["hi".to_string()]);
        assert_eq!(inner.edited_bodies(), vec!["bye".to_string()]);
    }
}
