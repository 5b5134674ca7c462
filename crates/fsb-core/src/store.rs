//! In-process [`SubscriptionStore`] with optional JSON snapshot persistence.

use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, Source, SourceId, Subscription, SubscriptionId},
    errors::Error,
    ports::{canonicalize_url, SubscriptionStore},
    Result,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreData {
    next_source_id: i64,
    next_subscription_id: i64,
    sources: Vec<Source>,
    subscriptions: Vec<Subscription>,
}

pub struct MemoryStore {
    data: Mutex<StoreData>,
    path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(StoreData::default()),
            path: None,
        }
    }

    /// Open a store snapshotted to `path`, loading the existing snapshot if any.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let txt = fs::read_to_string(&path)?;
            serde_json::from_str(&txt)?
        } else {
            StoreData::default()
        };
        Ok(Self {
            data: Mutex::new(data),
            path: Some(path),
        })
    }

    /// Persist `next` and only then make it the live state.
    ///
    /// A failed snapshot write leaves `data` untouched, so an `Err` from a
    /// mutating call never has a visible effect.
    async fn commit(&self, data: &mut StoreData, next: StoreData) -> Result<()> {
        if let Some(path) = &self.path {
            write_snapshot(path, &next).await?;
        }
        *data = next;
        Ok(())
    }
}

async fn write_snapshot(path: &Path, data: &StoreData) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serde_json::to_string_pretty(data)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Placeholder title until the poller fetches the real one: host plus path.
fn provisional_title(url: &reqwest::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    format!("{host}{path}")
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_or_create_source(&self, url: &str) -> Result<Source> {
        let link = canonicalize_url(url);
        let parsed = reqwest::Url::parse(&link)
            .map_err(|e| Error::Store(format!("invalid feed url {link:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Store(format!("unsupported url scheme: {}", parsed.scheme())));
        }

        let mut data = self.data.lock().await;
        if let Some(existing) = data.sources.iter().find(|s| s.link == link) {
            return Ok(existing.clone());
        }

        let mut next = data.clone();
        next.next_source_id += 1;
        let source = Source {
            id: SourceId(next.next_source_id),
            title: provisional_title(&parsed),
            link,
            error_count: 0,
        };
        next.sources.push(source.clone());
        self.commit(&mut data, next).await?;
        Ok(source)
    }

    async fn source(&self, id: SourceId) -> Result<Source> {
        let data = self.data.lock().await;
        data.sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("source {}", id.0)))
    }

    async fn create_subscription(
        &self,
        chat_id: ChatId,
        source_id: SourceId,
    ) -> Result<Subscription> {
        let mut data = self.data.lock().await;
        if !data.sources.iter().any(|s| s.id == source_id) {
            return Err(Error::NotFound(format!("source {}", source_id.0)));
        }

        let mut next = data.clone();
        next.next_subscription_id += 1;
        let sub = Subscription::new(
            SubscriptionId(next.next_subscription_id),
            chat_id,
            source_id,
        );
        next.subscriptions.push(sub.clone());
        self.commit(&mut data, next).await?;
        Ok(sub)
    }

    async fn subscribers_of(&self, source_id: SourceId) -> Result<Vec<Subscription>> {
        let data = self.data.lock().await;
        Ok(data
            .subscriptions
            .iter()
            .filter(|s| s.active && s.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn subscriptions_of_chat(&self, chat_id: ChatId) -> Result<Vec<Subscription>> {
        let data = self.data.lock().await;
        Ok(data
            .subscriptions
            .iter()
            .filter(|s| s.active && s.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn disable_subscription(&self, id: SubscriptionId) -> Result<()> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let sub = next
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id.0)))?;
        if !sub.active {
            return Ok(());
        }
        sub.active = false;
        self.commit(&mut data, next).await
    }
}
