//! Engine wiring shared by every caller.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::block::{BlockSpecRegistry, PlacementValidator};
use crate::cache::CacheLayer;
use crate::component::ComponentService;
use crate::config::Config;
use crate::error::EngineResult;
use crate::page_lock::PageLocks;
use crate::revision::RevisionService;
use crate::store::{LayoutStore, PgLayoutStore};
use crate::tree::TreeStore;

/// Tunables that are not part of the store or registry.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// TTL of the cached default definition listing.
    pub list_cache_ttl_secs: u64,

    /// Revisions kept per page by [`LayoutEngine::prune_revisions`].
    pub revision_retention: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            list_cache_ttl_secs: 30,
            revision_retention: 50,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            list_cache_ttl_secs: config.component_list_cache_ttl_secs,
            revision_retention: config.revision_retention,
        }
    }
}

/// The layout engine: registry, validator, and the three services built
/// over one store.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct LayoutEngine {
    inner: Arc<LayoutEngineInner>,
}

struct LayoutEngineInner {
    /// Persistence for every layout entity.
    store: Arc<dyn LayoutStore>,

    /// Block placement rules, frozen at construction.
    registry: Arc<BlockSpecRegistry>,

    validator: PlacementValidator,

    tree: TreeStore,

    components: ComponentService,

    revisions: RevisionService,

    /// Two-tier cache layer (Moka L1 + optional Redis L2).
    cache: CacheLayer,

    /// Per-page locks shared by every structural mutation.
    locks: PageLocks,

    settings: EngineSettings,
}

impl LayoutEngine {
    /// Build an engine with default settings.
    pub fn new(
        store: Arc<dyn LayoutStore>,
        registry: BlockSpecRegistry,
        cache: CacheLayer,
    ) -> Self {
        Self::with_settings(store, registry, cache, EngineSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn LayoutStore>,
        registry: BlockSpecRegistry,
        cache: CacheLayer,
        settings: EngineSettings,
    ) -> Self {
        let registry = Arc::new(registry);
        let locks = PageLocks::new();
        let validator = PlacementValidator::new(registry.clone(), store.clone());
        let tree = TreeStore::new(store.clone(), validator.clone(), locks.clone());
        let components = ComponentService::new(
            store.clone(),
            tree.clone(),
            cache.clone(),
            locks.clone(),
            settings.list_cache_ttl_secs,
        );
        let revisions = RevisionService::new(store.clone(), locks.clone());

        Self {
            inner: Arc::new(LayoutEngineInner {
                store,
                registry,
                validator,
                tree,
                components,
                revisions,
                cache,
                locks,
                settings,
            }),
        }
    }

    /// Build a PostgreSQL-backed engine with the standard block catalogue.
    pub fn from_pool(pool: PgPool, config: &Config) -> Result<Self> {
        let settings = EngineSettings::from(config);
        let cache = match &config.redis_url {
            Some(url) => {
                let client = RedisClient::open(url.as_str()).context("failed to create Redis client")?;
                CacheLayer::with_redis(settings.list_cache_ttl_secs, client)
            }
            None => CacheLayer::new(settings.list_cache_ttl_secs),
        };
        let registry = BlockSpecRegistry::with_standard_types();
        info!(
            block_types = registry.len(),
            redis = cache.has_redis(),
            "layout engine initialized"
        );

        Ok(Self::with_settings(
            Arc::new(PgLayoutStore::new(pool)),
            registry,
            cache,
            settings,
        ))
    }

    pub fn store(&self) -> &Arc<dyn LayoutStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<BlockSpecRegistry> {
        &self.inner.registry
    }

    pub fn validator(&self) -> &PlacementValidator {
        &self.inner.validator
    }

    pub fn tree(&self) -> &TreeStore {
        &self.inner.tree
    }

    pub fn components(&self) -> &ComponentService {
        &self.inner.components
    }

    pub fn revisions(&self) -> &RevisionService {
        &self.inner.revisions
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.inner.cache
    }

    pub fn locks(&self) -> &PageLocks {
        &self.inner.locks
    }

    pub fn settings(&self) -> EngineSettings {
        self.inner.settings
    }

    /// Prune a page's revisions down to the configured retention.
    pub async fn prune_revisions(&self, page_id: Uuid) -> EngineResult<u64> {
        self.inner
            .revisions
            .prune_revisions(page_id, self.inner.settings.revision_retention)
            .await
    }
}
