//! Subscription registration workflows.
//!
//! Both workflows announce themselves with a placeholder message and report every
//! outcome by editing it; nothing about an in-flight registration is stored.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    domain::{Chat, ChatId, MessageRef, Source, Subscription, UserId},
    formatting::{escape_html, link},
    messaging::{
        port::MessagingPort,
        types::{RenderMode, SendOptions},
    },
    ports::SubscriptionStore,
    Result,
};

pub const PROCESSING: &str = "Processing...";
pub const BOT_NOT_ADMIN: &str = "Please add the bot as a channel manager first";
pub const SENDER_NOT_ADMIN: &str = "Non-channel managers cannot perform this operation";
pub const SUBSCRIPTION_FAILED: &str = "Subscription failed";
pub const USAGE_ERROR: &str = "Please enter the correct instruction!";

/// Which branch a registration ended in. The user has already been told.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Subscribed {
        source: Source,
        subscription: Subscription,
    },
    ChannelNotFound,
    BotNotAdmin,
    SenderNotAdmin,
    /// Source lookup/creation failed; the error text was shown to the user.
    SourceFailed(String),
    /// Subscription write failed; the user only saw a generic notice.
    SubscriptionFailed,
}

pub struct SubscriptionRegistrar {
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionRegistrar {
    pub fn new(messenger: Arc<dyn MessagingPort>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self { messenger, store }
    }

    /// Subscribe a channel on behalf of `actor`, who must administer it alongside the bot.
    pub async fn register_for_channel(
        &self,
        invoking_chat: ChatId,
        actor: UserId,
        url: &str,
        channel_mention: &str,
    ) -> Result<RegistrationOutcome> {
        let placeholder = self
            .messenger
            .send_message(invoking_chat, PROCESSING, SendOptions::plain())
            .await?;

        let channel = match self.messenger.resolve_chat(channel_mention).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!(mention = channel_mention, error = %e, "channel lookup failed");
                let text = format!("Channel {channel_mention} not found");
                self.report(placeholder, &text, SendOptions::plain()).await;
                return Ok(RegistrationOutcome::ChannelNotFound);
            }
        };

        let admins = match self.messenger.list_admins(&channel).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!(channel_id = channel.id.0, error = %e, "admin list lookup failed, denying");
                Vec::new()
            }
        };

        // The bot check comes first: without it nothing else matters.
        if !admins.contains(&self.messenger.bot_user_id()) {
            self.report(placeholder, BOT_NOT_ADMIN, SendOptions::plain())
                .await;
            return Ok(RegistrationOutcome::BotNotAdmin);
        }
        if !admins.contains(&actor) {
            self.report(placeholder, SENDER_NOT_ADMIN, SendOptions::plain())
                .await;
            return Ok(RegistrationOutcome::SenderNotAdmin);
        }

        let source = match self.store.find_or_create_source(url).await {
            Ok(source) => source,
            Err(e) => return Ok(self.source_failed(placeholder, e).await),
        };

        let subscription = match self.store.create_subscription(channel.id, source.id).await {
            Ok(sub) => sub,
            Err(e) => {
                // Only the generic notice reaches the user on this path.
                warn!(channel_id = channel.id.0, source_id = source.id.0, error = %e, "subscription write failed");
                self.report(placeholder, SUBSCRIPTION_FAILED, SendOptions::plain())
                    .await;
                return Ok(RegistrationOutcome::SubscriptionFailed);
            }
        };

        info!(
            chat_id = invoking_chat.0,
            channel_id = channel.id.0,
            source_id = source.id.0,
            title = %source.title,
            link = %source.link,
            "channel subscribed"
        );

        let text = format!(
            "Channel {} subscription {} success",
            channel_link(&channel),
            link(RenderMode::Html, &source.title, &source.link)
        );
        self.report(placeholder, &text, confirmation_opts()).await;

        Ok(RegistrationOutcome::Subscribed {
            source,
            subscription,
        })
    }

    /// Subscribe `chat` itself. Callers gate group chats on admin status beforehand.
    pub async fn register_for_chat(&self, chat: &Chat, url: &str) -> Result<RegistrationOutcome> {
        let placeholder = self
            .messenger
            .send_message(chat.id, PROCESSING, SendOptions::plain())
            .await?;

        let url = self.store.canonicalize_url(url);
        let source = match self.store.find_or_create_source(&url).await {
            Ok(source) => source,
            Err(e) => return Ok(self.source_failed(placeholder, e).await),
        };

        let subscription = match self.store.create_subscription(chat.id, source.id).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(chat_id = chat.id.0, source_id = source.id.0, error = %e, "subscription write failed");
                self.report(placeholder, SUBSCRIPTION_FAILED, SendOptions::plain())
                    .await;
                return Ok(RegistrationOutcome::SubscriptionFailed);
            }
        };

        info!(
            chat_id = chat.id.0,
            source_id = source.id.0,
            title = %source.title,
            link = %source.link,
            "chat subscribed"
        );

        let text = format!(
            "{} Successfully subscribed",
            link(RenderMode::Html, &source.title, &source.link)
        );
        self.report(placeholder, &text, confirmation_opts()).await;

        Ok(RegistrationOutcome::Subscribed {
            source,
            subscription,
        })
    }

    pub async fn send_usage_error(&self, chat_id: ChatId) -> Result<()> {
        self.messenger
            .send_message(chat_id, USAGE_ERROR, SendOptions::plain())
            .await?;
        Ok(())
    }

    async fn source_failed(&self, placeholder: MessageRef, e: crate::Error) -> RegistrationOutcome {
        let detail = e.to_string();
        warn!(error = %detail, "source lookup failed");
        let text = format!("{detail}, subscription failed");
        self.report(placeholder, &text, SendOptions::plain()).await;
        RegistrationOutcome::SourceFailed(detail)
    }

    /// Progress edits are best effort; a lost edit must not undo a finished write.
    async fn report(&self, placeholder: MessageRef, text: &str, opts: SendOptions) {
        if let Err(e) = self.messenger.edit_message(placeholder, text, opts).await {
            warn!(chat_id = placeholder.chat_id.0, error = %e, "failed to update progress message");
        }
    }
}

fn confirmation_opts() -> SendOptions {
    SendOptions {
        disable_web_page_preview: true,
        ..SendOptions::html()
    }
}

fn channel_link(channel: &Chat) -> String {
    match channel.username.as_deref().filter(|u| !u.is_empty()) {
        Some(username) => link(
            RenderMode::Html,
            &channel.display_name(),
            &format!("https://t.me/{username}"),
        ),
        None => escape_html(&channel.display_name()),
    }
}
