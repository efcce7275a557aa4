//! Cache Probe - smoke test for a configured cache backend
//!
//! Builds the backend named by `CACHE_BACKEND` (`memory`, `redis` or `sql`)
//! from environment configuration and runs a set/get/ttl/del round against it.

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polycache::{
    Cache, CacheKey, MemoryCache, MemoryConfig, RemoteCache, RemoteConfig, SqlCache, SqlConfig,
};

/// Main entry point for the cache probe.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Build the selected backend from environment variables
/// 3. Log every notification the backend emits
/// 4. Store, read, inspect and delete a probe entry
/// 5. Disconnect
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polycache=info,cache_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend = env::var("CACHE_BACKEND").unwrap_or_else(|_| "memory".to_string());
    let cache = build_backend(&backend)?;
    info!("Probing {:?}", cache);

    let mut events = cache.subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("event: {}", event);
        }
    });

    let result = probe(cache.as_ref()).await;

    cache.disconnect().await.context("disconnect failed")?;
    listener.abort();

    result?;
    info!("Probe of {} backend succeeded", backend);
    Ok(())
}

fn build_backend(name: &str) -> anyhow::Result<Arc<dyn Cache>> {
    let cache: Arc<dyn Cache> = match name {
        "memory" => Arc::new(MemoryCache::new(MemoryConfig::from_env())?),
        "redis" => Arc::new(RemoteCache::new(RemoteConfig::from_env())?),
        "sql" => Arc::new(SqlCache::new(SqlConfig::from_env())?),
        other => bail!("unknown CACHE_BACKEND '{}', expected memory, redis or sql", other),
    };
    Ok(cache)
}

async fn probe(cache: &dyn Cache) -> anyhow::Result<()> {
    cache.connect().await.context("connect failed")?;

    let key = CacheKey::from(json!({"probe": "cache-probe", "pid": std::process::id()}));
    let value = json!({"written_at": Utc::now().to_rfc3339(), "ok": true});

    if !cache.set(&key, &value, Some(30)).await? {
        bail!("set returned false");
    }

    let read = cache.get(&key).await?;
    if read.as_ref() != Some(&value) {
        bail!("read back {:?}, expected {:?}", read, value);
    }

    match cache.get_ttl(&key).await? {
        Some(ttl) => info!("probe entry expires in {}s", ttl),
        None => warn!("probe entry has no remaining ttl"),
    }

    let removed = cache.del(&key).await?;
    if removed != 1 {
        bail!("del removed {} entries, expected 1", removed);
    }
    Ok(())
}
