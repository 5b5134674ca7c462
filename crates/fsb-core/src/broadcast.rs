//! Fan-out of new feed content to subscribers.
//!
//! Sends run one at a time in (content, subscriber) order. A failed send only
//! affects its own pair, except that a subscription disabled for a revoked
//! permission is skipped for the rest of the call. A render failure stops the
//! whole call.

use std::{collections::HashSet, sync::Arc};

use tracing::{error, info, warn};

use crate::{
    config::Config,
    domain::{Content, Source, Subscription, SubscriptionId},
    formatting::{link, trim_description},
    messaging::{
        port::MessagingPort,
        types::{RenderMode, SendErrorKind, SendOptions},
    },
    ports::SubscriptionStore,
    render::{Renderer, TemplateData},
    Error, Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
    pub unsubscribed: usize,
}

pub struct BroadcastDispatcher {
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn SubscriptionStore>,
    renderer: Arc<dyn Renderer>,
    cfg: Arc<Config>,
}

impl BroadcastDispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn SubscriptionStore>,
        renderer: Arc<dyn Renderer>,
        cfg: Arc<Config>,
    ) -> Self {
        Self {
            messenger,
            store,
            renderer,
            cfg,
        }
    }

    /// Deliver `contents` (in the given order) to every subscriber of `source`.
    ///
    /// Returns the render error if rendering fails; pairs already sent stay sent.
    pub async fn notify(
        &self,
        source: &Source,
        subscribers: &[Subscription],
        contents: &[Content],
    ) -> Result<BroadcastReport> {
        info!(
            source_id = source.id.0,
            source_title = %source.title,
            subscriber_count = subscribers.len(),
            new_contents = contents.len(),
            "broadcast news"
        );

        let mode = self.cfg.message_mode;
        let mut report = BroadcastReport::default();
        let mut disabled: HashSet<SubscriptionId> = HashSet::new();

        for content in contents {
            let preview_text = trim_description(&content.description, self.cfg.preview_text_len);
            let telegraph_url = content.telegraph_url.clone().unwrap_or_default();

            for sub in subscribers {
                if disabled.contains(&sub.id) {
                    continue;
                }
                let data = TemplateData {
                    source_title: source.title.clone(),
                    content_title: content.title.clone(),
                    raw_link: content.raw_link.clone(),
                    preview_text: preview_text.clone(),
                    telegraph_url: telegraph_url.clone(),
                    tags: sub.tag.clone(),
                    enable_telegraph: sub.enable_telegraph && !telegraph_url.is_empty(),
                };

                let body = match self.renderer.render(&data, mode) {
                    Ok(body) => body,
                    Err(e) => {
                        error!(
                            source_id = source.id.0,
                            title = %content.title,
                            error = %e,
                            "broadcast aborted, render failed"
                        );
                        return Err(e);
                    }
                };

                let opts = SendOptions {
                    disable_web_page_preview: self.cfg.disable_web_page_preview,
                    render_mode: mode,
                    silent: !sub.enable_notification,
                };

                match self.messenger.send_message(sub.chat_id, &body, opts).await {
                    Ok(_) => report.sent += 1,
                    Err(e) => {
                        report.failed += 1;
                        if self.handle_send_failure(source, sub, content, &body, &e).await {
                            disabled.insert(sub.id);
                            report.unsubscribed += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Returns true when the subscription was disabled.
    async fn handle_send_failure(
        &self,
        source: &Source,
        sub: &Subscription,
        content: &Content,
        body: &str,
        err: &Error,
    ) -> bool {
        match err.send_kind() {
            SendErrorKind::PermissionRevoked => {
                error!(
                    error = %err,
                    user_id = sub.chat_id.0,
                    source_id = sub.source_id.0,
                    title = %source.title,
                    link = %source.link,
                    "broadcast news error, bot stopped by user"
                );
                match self.store.disable_subscription(sub.id).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(subscription_id = sub.id.0, error = %e, "failed to unsubscribe");
                        false
                    }
                }
            }
            SendErrorKind::FormatRejected => {
                error!(
                    error = %err,
                    markdown_msg = %body,
                    "broadcast news error, message markup rejected"
                );
                false
            }
            SendErrorKind::Other => {
                warn!(
                    error = %err,
                    user_id = sub.chat_id.0,
                    source_id = sub.source_id.0,
                    content = %content.raw_link,
                    "broadcast news error"
                );
                false
            }
        }
    }

    /// Warn every subscriber that `source` keeps failing to update.
    ///
    /// Best effort: individual send errors are logged and skipped. Returns the
    /// number of warnings delivered.
    pub async fn notify_source_failure(&self, source: &Source) -> Result<usize> {
        let subscribers = self.store.subscribers_of(source.id).await?;
        let text = format!(
            "{} has failed {} consecutive updates, updates are temporarily paused",
            link(RenderMode::Html, &source.title, &source.link),
            self.cfg.error_threshold
        );
        let opts = SendOptions {
            disable_web_page_preview: true,
            ..SendOptions::html()
        };

        let mut delivered = 0;
        for sub in &subscribers {
            match self.messenger.send_message(sub.chat_id, &text, opts).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(
                    chat_id = sub.chat_id.0,
                    source_id = source.id.0,
                    error = %e,
                    "source error notice not delivered"
                ),
            }
        }

        info!(
            source_id = source.id.0,
            subscribers = subscribers.len(),
            delivered,
            "source error notice sent"
        );
        Ok(delivered)
    }
}
