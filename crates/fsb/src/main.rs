use std::sync::Arc;

use tracing::info;

use fsb_core::{config::Config, ports::SubscriptionStore, store::MemoryStore};

#[tokio::main]
async fn main() -> Result<(), fsb_core::Error> {
    fsb_core::logging::init("fsb")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn SubscriptionStore> = match &cfg.store_file {
        Some(path) => {
            info!(path = %path.display(), "using snapshot store");
            Arc::new(MemoryStore::open(path)?)
        }
        None => {
            info!("STORE_FILE not set, subscriptions live in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    fsb_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| fsb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
