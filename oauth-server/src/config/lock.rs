use confique::Config;
use serde::Deserialize;

/// Backend for the mutation locks taken around user creation and deletion
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LockStore {
    /// Process-local locks, only correct for a single instance
    #[default]
    InMemory,
    Redis,
}

#[derive(Debug, Config, Clone)]
pub struct LockConfig {
    /// Lock store type: "in-memory" or "redis" (default: in-memory)
    #[config(env = "OAUTH_LOCK_STORE", default = "in-memory")]
    pub store: LockStore,

    /// Redis connection string, required when the store is "redis"
    #[config(env = "OAUTH_LOCK_REDIS_URL", default = "")]
    pub redis_url: String,

    /// Lock TTL in seconds (default: 10)
    #[config(env = "OAUTH_LOCK_TTL", default = 10)]
    pub ttl: u64,
}
