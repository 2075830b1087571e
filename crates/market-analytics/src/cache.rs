//! Cache gateway and the stores behind it.
//!
//! The gateway owns key composition, serialization, per-operation timeouts and
//! the cache-aside strategy. Analytics only ever call [`CacheGateway::get_or_compute`].

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use market_core::{CacheStore, FilterSpec, MarketError, MarketResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::bounded;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1800);
const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_PURGE_EVERY: usize = 256;

/// Composes `metric:exchanges:industries[:extra...]` keys.
#[derive(Debug, Clone)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(namespace: &str) -> Self {
        Self(namespace.to_string())
    }

    pub fn for_filter(namespace: &str, filter: &FilterSpec) -> Self {
        Self::new(namespace)
            .part(&filter.exchange_fragment())
            .part(&filter.industry_fragment())
    }

    pub fn part(mut self, part: &str) -> Self {
        self.0.push(':');
        self.0.push_str(part);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happens when several requests miss the same key at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Every miss recomputes and overwrites; last write wins.
    #[default]
    CacheAside,
    /// Misses on one key are serialized; followers read the leader's result.
    SingleFlight,
}

pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    default_ttl: Option<Duration>,
    op_timeout: Duration,
    strategy: CacheStrategy,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            default_ttl: Some(DEFAULT_CACHE_TTL),
            op_timeout: DEFAULT_CACHE_TIMEOUT,
            strategy: CacheStrategy::default(),
            in_flight: DashMap::new(),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Cached value for `key`. Payloads that no longer decode count as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> MarketResult<Option<T>> {
        let raw = bounded("cache get", self.op_timeout, self.store.get(key.as_str())).await?;
        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> MarketResult<()> {
        let raw = serde_json::to_string(value)?;
        bounded("cache set", self.op_timeout, self.store.set(key.as_str(), raw, ttl)).await
    }

    pub async fn get_or_compute<T, F, Fut>(&self, key: &CacheKey, compute: F) -> MarketResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = MarketResult<T>>,
    {
        self.get_or_compute_with_ttl(key, self.default_ttl, compute).await
    }

    pub async fn get_or_compute_with_ttl<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> MarketResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = MarketResult<T>>,
    {
        if let Some(hit) = self.get(key).await? {
            tracing::debug!("Cache hit: {}", key);
            return Ok(hit);
        }

        match self.strategy {
            CacheStrategy::CacheAside => self.compute_and_store(key, ttl, compute).await,
            CacheStrategy::SingleFlight => {
                let lock = self
                    .in_flight
                    .entry(key.as_str().to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();

                let result = {
                    let _guard = lock.lock().await;
                    match self.get(key).await {
                        Ok(Some(hit)) => {
                            tracing::debug!("Cache filled while waiting: {}", key);
                            Ok(hit)
                        }
                        Ok(None) => self.compute_and_store(key, ttl, compute).await,
                        Err(e) => Err(e),
                    }
                };

                // map + this handle; anything more means someone is still waiting
                self.in_flight.remove_if(key.as_str(), |_, l| {
                    Arc::ptr_eq(l, &lock) && Arc::strong_count(l) <= 2
                });
                result
            }
        }
    }

    async fn compute_and_store<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> MarketResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = MarketResult<T>>,
    {
        tracing::debug!("Cache miss: {}", key);
        let value = compute().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }
}

/// Internal cache entry with timestamp
struct CacheEntry {
    value: String,
    cached_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.cached_at.elapsed() >= ttl)
    }
}

/// In-process store used when no Redis URL is configured.
///
/// Expired entries are dropped when read, and the whole map is swept every
/// `purge_every` writes.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    purge_every: usize,
    writes: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            purge_every: DEFAULT_PURGE_EVERY,
            writes: AtomicUsize::new(0),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purge_every(mut self, writes: usize) -> Self {
        self.purge_every = writes.max(1);
        self
    }

    /// Remove every expired entry; returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), MarketError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                cached_at: Instant::now(),
                ttl,
            },
        );

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.purge_every == 0 {
            let dropped = self.cleanup();
            if dropped > 0 {
                tracing::debug!("Purged {} expired cache entries", dropped);
            }
        }
        Ok(())
    }
}

/// Redis-backed store sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> MarketResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| MarketError::Cache(format!("invalid Redis URL: {}", e)))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| MarketError::Cache(format!("Redis connection failed: {}", e)))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| MarketError::Cache(e.to_string()))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), MarketError> {
        let mut conn = self.conn.clone();
        let result = match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await,
            None => conn.set::<_, _, ()>(key, value).await,
        };
        result.map_err(|e| MarketError::Cache(e.to_string()))
    }
}
