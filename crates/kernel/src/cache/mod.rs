//! Two-tier cache with Moka (L1) and optional Redis (L2).
//!
//! Supports tag-based invalidation. Cache failures are logged and treated as
//! misses; callers must stay correct with the cache absent.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use moka::notification::RemovalCause;
use redis::AsyncCommands;
use redis::Client as RedisClient;
use tracing::{debug, warn};

/// Default TTL for both tiers, in seconds.
const DEFAULT_TTL_SECS: u64 = 30;

/// Maximum L1 cache capacity.
const L1_MAX_CAPACITY: u64 = 10_000;

/// Tag name to the L1 keys registered under it.
type TagIndex = DashMap<String, HashSet<String>>;

/// Two-tier cache layer.
///
/// L1 (Moka): In-process, short TTL, per-instance
/// L2 (Redis): Shared across instances, same TTL, only when configured
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<CacheLayerInner>,
}

struct CacheLayerInner {
    /// L1 in-process cache.
    local: Cache<String, String>,

    /// Keys registered per tag in this process. Keys leave when L1 drops
    /// the entry.
    local_tags: Arc<TagIndex>,

    /// L2 Redis client.
    redis: Option<RedisClient>,

    /// TTL applied to L2 entries when the caller passes zero.
    default_ttl_secs: u64,
}

impl CacheLayer {
    /// Create an in-process cache whose entries expire after `ttl_secs`.
    pub fn new(ttl_secs: u64) -> Self {
        Self::build(ttl_secs, None)
    }

    /// Create a cache backed by Redis as the shared L2 tier.
    pub fn with_redis(ttl_secs: u64, redis: RedisClient) -> Self {
        Self::build(ttl_secs, Some(redis))
    }

    fn build(ttl_secs: u64, redis: Option<RedisClient>) -> Self {
        let ttl = if ttl_secs > 0 { ttl_secs } else { DEFAULT_TTL_SECS };
        let local_tags: Arc<TagIndex> = Arc::new(DashMap::new());
        let tags = local_tags.clone();
        let local = Cache::builder()
            .max_capacity(L1_MAX_CAPACITY)
            .time_to_live(Duration::from_secs(ttl))
            .eviction_listener(move |key: Arc<String>, _value: String, cause| {
                if cause != RemovalCause::Replaced {
                    forget_key(&tags, &key);
                }
            })
            .build();

        Self {
            inner: Arc::new(CacheLayerInner {
                local,
                local_tags,
                redis,
                default_ttl_secs: ttl,
            }),
        }
    }

    /// Whether a Redis tier is configured.
    pub fn has_redis(&self) -> bool {
        self.inner.redis.is_some()
    }

    async fn redis_conn(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.inner.redis.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(error = %e, "failed to get Redis connection for cache");
                None
            }
        }
    }

    /// Get a value from cache.
    ///
    /// Checks L1 first, then L2. On L2 hit, populates L1.
    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(val) = self.inner.local.get(key).await {
            debug!(key = %key, "cache L1 hit");
            return Some(val);
        }

        let mut conn = self.redis_conn().await?;
        let val: Option<String> = match conn.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, key = %key, "failed to read cache value from Redis");
                return None;
            }
        };

        if let Some(ref v) = val {
            debug!(key = %key, "cache L2 hit, populating L1");
            self.inner.local.insert(key.to_string(), v.clone()).await;
        }

        val
    }

    /// Set a value in cache with TTL and tags.
    ///
    /// Writes to L1 and, when configured, L2.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64, tags: &[&str]) {
        self.inner
            .local
            .insert(key.to_string(), value.to_string())
            .await;
        for tag in tags {
            self.inner
                .local_tags
                .entry((*tag).to_string())
                .or_default()
                .insert(key.to_string());
        }

        let Some(mut conn) = self.redis_conn().await else {
            debug!(key = %key, tags = ?tags, "cache set (L1 only)");
            return;
        };

        let ttl = if ttl_secs > 0 {
            ttl_secs
        } else {
            self.inner.default_ttl_secs
        };

        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl).await {
            warn!(error = %e, key = %key, "failed to set cache value in Redis");
            return;
        }

        for tag in tags {
            let tag_key = format!("tag:{tag}");
            if let Err(e) = conn.sadd::<_, _, ()>(&tag_key, key).await {
                warn!(error = %e, tag = %tag, "failed to register cache key with tag");
            }
        }

        debug!(key = %key, tags = ?tags, ttl = %ttl, "cache set");
    }

    /// Invalidate a single cache key.
    pub async fn invalidate(&self, key: &str) {
        self.inner.local.invalidate(key).await;

        let Some(mut conn) = self.redis_conn().await else {
            return;
        };

        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!(error = %e, key = %key, "failed to delete cache key from Redis");
        }

        debug!(key = %key, "cache invalidated");
    }

    /// Invalidate all cache keys associated with a tag.
    ///
    /// Redis-side invalidation runs as a Lua script so it is atomic.
    pub async fn invalidate_tag(&self, tag: &str) {
        let mut keys: HashSet<String> = self
            .inner
            .local_tags
            .remove(tag)
            .map(|(_, keys)| keys)
            .unwrap_or_default();

        let tag_key = format!("tag:{tag}");
        let mut conn = self.redis_conn().await;
        if let Some(conn) = conn.as_mut() {
            match conn.smembers::<_, Vec<String>>(&tag_key).await {
                Ok(remote) => keys.extend(remote),
                Err(e) => warn!(error = %e, tag = %tag, "failed to get tag members"),
            }
        }

        for key in &keys {
            self.inner.local.invalidate(key).await;
        }

        if let Some(conn) = conn.as_mut() {
            let script = redis::Script::new(INVALIDATE_TAG_SCRIPT);
            if let Err(e) = script.key(&tag_key).invoke_async::<()>(conn).await {
                warn!(error = %e, tag = %tag, "failed to invalidate tag in Redis");
                return;
            }
        }

        debug!(tag = %tag, keys_invalidated = %keys.len(), "tag invalidated");
    }

    /// Get cache statistics (for monitoring).
    pub async fn stats(&self) -> CacheStats {
        self.inner.local.run_pending_tasks().await;
        CacheStats {
            l1_entry_count: self.inner.local.entry_count(),
            l1_weighted_size: self.inner.local.weighted_size(),
            tag_count: self.inner.local_tags.len(),
        }
    }
}

/// Drop `key` from every tag, and tags left without keys.
fn forget_key(tags: &TagIndex, key: &str) {
    tags.retain(|_, keys| {
        keys.remove(key);
        !keys.is_empty()
    });
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of entries in L1 cache.
    pub l1_entry_count: u64,

    /// Weighted size of L1 cache.
    pub l1_weighted_size: u64,

    /// Number of tags with registered L1 keys.
    pub tag_count: usize,
}

/// Lua script for atomic tag invalidation.
///
/// Gets all keys in the tag set, deletes them, then deletes the tag set.
const INVALIDATE_TAG_SCRIPT: &str = r#"
local keys = redis.call("SMEMBERS", KEYS[1])
if #keys > 0 then
    redis.call("DEL", unpack(keys))
end
redis.call("DEL", KEYS[1])
return #keys
"#;

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("redis", &self.has_redis())
            .finish()
    }
}
