//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL. When None, the cache runs in-process only.
    pub redis_url: Option<String>,

    /// TTL of the cached default definition listing (default: 30).
    pub component_list_cache_ttl_secs: u64,

    /// Revisions kept per page when pruning (default: 50).
    pub revision_retention: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());

        let component_list_cache_ttl_secs = env::var("COMPONENT_LIST_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("COMPONENT_LIST_CACHE_TTL_SECS must be a valid u64")?;

        let revision_retention = env::var("REVISION_RETENTION")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .context("REVISION_RETENTION must be a valid usize")?;

        Ok(Self {
            database_url,
            database_max_connections,
            redis_url,
            component_list_cache_ttl_secs,
            revision_retention,
        })
    }
}
