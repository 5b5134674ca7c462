use async_trait::async_trait;

use crate::{
    domain::{ChatId, Source, SourceId, Subscription, SubscriptionId},
    Result,
};

/// Hexagonal port for the persistence layer.
///
/// The core only issues point reads and writes through this trait and never keeps
/// records across calls.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Return the source for `url`, creating it on first use. Idempotent.
    async fn find_or_create_source(&self, url: &str) -> Result<Source>;

    async fn source(&self, id: SourceId) -> Result<Source>;

    /// Link a chat to a source. Duplicate links are not rejected.
    async fn create_subscription(
        &self,
        chat_id: ChatId,
        source_id: SourceId,
    ) -> Result<Subscription>;

    /// Active subscriptions of a source.
    async fn subscribers_of(&self, source_id: SourceId) -> Result<Vec<Subscription>>;

    /// Active subscriptions of a chat.
    async fn subscriptions_of_chat(&self, chat_id: ChatId) -> Result<Vec<Subscription>>;

    /// Unsubscribe. Disabling an already disabled subscription is not an error.
    async fn disable_subscription(&self, id: SubscriptionId) -> Result<()>;

    /// Normalize a user-supplied feed URL before lookup.
    fn canonicalize_url(&self, url: &str) -> String {
        canonicalize_url(url)
    }
}

/// Default URL normalization: lowercase scheme/host, drop fragments and
/// surrounding whitespace. Unparseable input is returned trimmed.
pub fn canonicalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match reqwest::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_drops_fragment_and_case() {
        assert_eq!(
            canonicalize_url("  HTTPS://Example.COM/Feed.xml#top "),
            "https://example.com/Feed.xml"
        );
    }

    #[test]
    fn unparseable_input_is_only_trimmed() {
        assert_eq!(canonicalize_url(" not a url "), "not a url");
    }
}
