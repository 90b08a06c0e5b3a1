use confique::Config;
use serde::Deserialize;

/// Specifies which cache store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStore {
    #[default]
    InMemory,
    Redis,
    #[serde(other)]
    None,
}

/// Configuration for the cache-aside layer in front of client and user lookups
#[derive(Debug, Config, Clone)]
pub struct CacheConfig {
    /// Cache store type: "in-memory", "redis" or "none" (default: in-memory)
    #[config(env = "OAUTH_CACHE_STORE", default = "in-memory")]
    pub store: CacheStore,

    /// Cache TTL in seconds (default: 10 minutes)
    #[config(env = "OAUTH_CACHE_TTL", default = 600)]
    pub ttl: u64,

    #[config(nested)]
    pub memory: InMemoryConfig,

    #[config(nested)]
    pub redis: RedisConfig,
}

/// In-memory cache configuration options
#[derive(Debug, Config, Clone)]
pub struct InMemoryConfig {
    /// Maximum capacity in MiB (default: 128 MiB)
    #[config(env = "OAUTH_CACHE_MEMORY_CAPACITY", default = 128)]
    pub capacity: usize,
}

/// Redis cache configuration options
#[derive(Debug, Config, Clone)]
pub struct RedisConfig {
    /// Redis connection string
    #[config(env = "OAUTH_CACHE_REDIS_URL", default = "")]
    pub url: String,
}
