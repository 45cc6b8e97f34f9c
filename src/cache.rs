use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an entry may go unused before it is evicted
    pub time_to_idle_seconds: u64,
    /// Maximum number of compiled artifacts kept per operation
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            time_to_idle_seconds: 20 * 60,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn time_to_idle(&self) -> Duration {
        Duration::from_secs(self.time_to_idle_seconds)
    }
}

/// Digest of a program's exact text, used as the cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn digest(program: &[u8]) -> Self {
        Self(Sha256::digest(program).into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes are plenty to tell entries apart in logs.
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self)
    }
}

/// In-memory cache of compiled artifacts (stylesheets, queries, path expressions).
///
/// Uses `moka` for concurrent access and "thundering herd" protection: an
/// artifact is compiled only once even if many requests ask for it at the same
/// time. Entries expire after going unused for the configured idle window.
pub struct ArtifactCache<A> {
    name: &'static str,
    cache: Cache<CacheKey, Arc<A>>,
    hits: AtomicU64,
    builds: AtomicU64,
}

impl<A> ArtifactCache<A>
where
    A: Send + Sync + 'static,
{
    pub fn new(name: &'static str, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .name(name)
            .max_capacity(config.max_entries)
            .time_to_idle(config.time_to_idle())
            .build();

        Self {
            name,
            cache,
            hits: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    /// Get a compiled artifact from the cache, or compile it if missing.
    ///
    /// `build` runs on the blocking pool and only when the key is missing.
    /// Concurrent callers with the same key wait for the single leader. A
    /// failed build is handed to every waiter and is not cached.
    pub async fn get_or_build<F>(&self, key: CacheKey, build: F) -> EngineResult<Arc<A>>
    where
        F: FnOnce() -> EngineResult<A> + Send + 'static,
    {
        let built = AtomicBool::new(false);
        let result = self
            .cache
            .try_get_with(key, async {
                built.store(true, Ordering::Relaxed);
                debug!(cache = self.name, %key, "compiling artifact");
                let artifact = tokio::task::spawn_blocking(build).await.map_err(|e| {
                    EngineError::Compile(format!("Compilation task failed: {}", e))
                })??;
                Ok(Arc::new(artifact))
            })
            .await
            .map_err(|e: Arc<EngineError>| (*e).clone());

        if built.load(Ordering::Relaxed) {
            self.builds.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(cache = self.name, %key, "artifact cache hit");
        }

        result
    }

    /// Drop every entry; the next lookup of any key rebuilds.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        // Run pending maintenance so the entry count reflects evictions
        self.cache.run_pending_tasks().await;

        CacheStats {
            entry_count: self.cache.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for one artifact cache
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub hits: u64,
    /// Builds started by this cache, successful or not
    pub builds: u64,
}
