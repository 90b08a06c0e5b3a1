pub(crate) use crate::config::cache::{CacheConfig, CacheStore};
pub(crate) use crate::config::database::DatabaseConfig;
pub(crate) use crate::config::lock::{LockConfig, LockStore};
pub(crate) use crate::config::oauth::{OAuthConfig, PasswordConfig, SessionConfig, SubjectConfig};
#[cfg(test)]
use crate::config::cache::{InMemoryConfig, RedisConfig};
use confique::Config;
use thiserror::Error;

pub mod cache;
pub mod database;
pub mod lock;
pub mod oauth;

/// Environment variable naming an optional TOML file layered under the environment
pub const CONFIG_FILE_ENV: &str = "OAUTH_CONFIG_FILE";

#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(#[from] confique::Error);

/// Main configuration structure for the OAuth server
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the server will listen to (default: 8080)
    #[config(env = "OAUTH_PORT", default = 8080)]
    pub port: u16,

    /// Per-request deadline in seconds (default: 30)
    #[config(env = "OAUTH_REQUEST_TIMEOUT", default = 30)]
    pub request_timeout: u64,

    /// Timeout in seconds for each readiness check (default: 3)
    #[config(env = "OAUTH_HEALTH_TIMEOUT", default = 3.0)]
    pub health_timeout: f64,

    #[config(nested)]
    pub database: DatabaseConfig,

    #[config(nested)]
    pub cache: CacheConfig,

    #[config(nested)]
    pub lock: LockConfig,

    #[config(nested)]
    pub oauth: OAuthConfig,

    #[config(nested)]
    pub session: SessionConfig,

    #[config(nested)]
    pub password: PasswordConfig,

    #[config(nested)]
    pub subject: SubjectConfig,
}

impl Settings {
    /// Loads settings from the environment, layered over the optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::builder().env();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0,
            request_timeout: 5,
            health_timeout: 1.0,
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                busy_timeout: 5,
            },
            cache: CacheConfig {
                store: CacheStore::InMemory,
                ttl: 600,
                memory: InMemoryConfig { capacity: 16 },
                redis: RedisConfig { url: String::new() },
            },
            lock: LockConfig {
                store: LockStore::InMemory,
                redis_url: String::new(),
                ttl: 10,
            },
            oauth: OAuthConfig {
                issuer: "oauth-server-test".to_string(),
                frontend_url: "https://frontend.test".to_string(),
                signing_cache_capacity: 64,
            },
            session: SessionConfig {
                cookie_name: "access_token".to_string(),
                secret: "test-session-secret".to_string(),
                ttl: 3600,
            },
            // the smallest cost argon2 accepts, to keep tests fast
            password: PasswordConfig {
                memory_cost: 8,
                time_cost: 1,
                parallelism: 1,
            },
            subject: SubjectConfig {
                secret: "test-subject-secret".to_string(),
                prefix: "u_".to_string(),
                length: 24,
            },
        }
    }
}
