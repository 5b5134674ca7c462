//! Recording fakes for the messaging and store ports.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{Chat, ChatId, ChatKind, MessageId, MessageRef, Source, SourceId, Subscription,
        SubscriptionId, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities, SendOptions},
    },
    ports::SubscriptionStore,
    store::MemoryStore,
    Result,
};

pub const BOT_ID: UserId = UserId(1000);

pub fn test_config() -> Config {
    Config {
        telegram_bot_token: "x".to_string(),
        ..Default::default()
    }
}

pub fn channel(id: i64, username: &str) -> Chat {
    Chat {
        id: ChatId(id),
        kind: ChatKind::Channel,
        title: Some(format!("{username} channel")),
        username: Some(username.to_string()),
    }
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub chat_id: ChatId,
    pub body: String,
    pub opts: SendOptions,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    chats: Mutex<HashMap<String, Chat>>,
    admins: Mutex<HashMap<i64, Vec<UserId>>>,
    admin_lookups: Mutex<usize>,
    send_failures: Mutex<HashMap<i64, String>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }

    /// Make `chat` resolvable by `@username` and by its numeric id.
    pub fn add_chat(&self, chat: Chat) {
        let key = format!("@{}", chat.username.clone().unwrap_or_default());
        self.chats.lock().unwrap().insert(key, chat);
    }

    /// Chats without an admin entry fail the lookup.
    pub fn set_admins(&self, chat_id: i64, admins: &[i64]) {
        self.admins
            .lock()
            .unwrap()
            .insert(chat_id, admins.iter().map(|id| UserId(*id)).collect());
    }

    pub fn fail_sends_to(&self, chat_id: i64, error: &str) {
        self.send_failures
            .lock()
            .unwrap()
            .insert(chat_id, error.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.body).collect()
    }

    pub fn edited_bodies(&self) -> Vec<String> {
        self.edits
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn last_edit(&self) -> Option<String> {
        self.edited_bodies().pop()
    }

    pub fn keyboards(&self) -> Vec<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }

    pub fn admin_lookups(&self) -> usize {
        *self.admin_lookups.lock().unwrap()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    fn bot_user_id(&self) -> UserId {
        BOT_ID
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        body: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.sends.lock().unwrap().push(Sent {
            chat_id,
            body: body.to_string(),
            opts,
        });
        if let Some(err) = self.send_failures.lock().unwrap().get(&chat_id.0) {
            return Err(Error::send(err.clone()));
        }
        Ok(self.alloc(chat_id))
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        body: &str,
        _opts: SendOptions,
    ) -> Result<MessageRef> {
        self.edits.lock().unwrap().push((msg, body.to_string()));
        Ok(msg)
    }

    async fn resolve_chat(&self, identifier: &str) -> Result<Chat> {
        let chats = self.chats.lock().unwrap();
        chats
            .get(identifier)
            .or_else(|| chats.values().find(|c| c.id.0.to_string() == identifier))
            .cloned()
            .ok_or_else(|| Error::send("Bad Request: chat not found"))
    }

    async fn list_admins(&self, chat: &Chat) -> Result<Vec<UserId>> {
        *self.admin_lookups.lock().unwrap() += 1;
        self.admins
            .lock()
            .unwrap()
            .get(&chat.id.0)
            .cloned()
            .ok_or_else(|| Error::External("admin lookup failed".to_string()))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

/// [`MemoryStore`] with switchable failures and a log of disable calls.
#[derive(Default)]
pub struct FakeStore {
    pub inner: MemoryStore,
    fail_source: Mutex<Option<String>>,
    fail_subscription: AtomicBool,
    disables: Mutex<Vec<SubscriptionId>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_source_lookup(&self, error: &str) {
        *self.fail_source.lock().unwrap() = Some(error.to_string());
    }

    pub fn fail_subscription_writes(&self) {
        self.fail_subscription.store(true, Ordering::SeqCst);
    }

    pub fn disables(&self) -> Vec<SubscriptionId> {
        self.disables.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionStore for FakeStore {
    async fn find_or_create_source(&self, url: &str) -> Result<Source> {
        if let Some(err) = self.fail_source.lock().unwrap().clone() {
            return Err(Error::Store(err));
        }
        self.inner.find_or_create_source(url).await
    }

    async fn source(&self, id: SourceId) -> Result<Source> {
        self.inner.source(id).await
    }

    async fn create_subscription(
        &self,
        chat_id: ChatId,
        source_id: SourceId,
    ) -> Result<Subscription> {
        if self.fail_subscription.load(Ordering::SeqCst) {
            return Err(Error::Store("database is locked".to_string()));
        }
        self.inner.create_subscription(chat_id, source_id).await
    }

    async fn subscribers_of(&self, source_id: SourceId) -> Result<Vec<Subscription>> {
        self.inner.subscribers_of(source_id).await
    }

    async fn subscriptions_of_chat(&self, chat_id: ChatId) -> Result<Vec<Subscription>> {
        self.inner.subscriptions_of_chat(chat_id).await
    }

    async fn disable_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.disables.lock().unwrap().push(id);
        self.inner.disable_subscription(id).await
    }
}
