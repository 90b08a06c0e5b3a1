use confique::Config;

/// Relational store settings
#[derive(Debug, Config, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection string (default: sqlite://oauth.db?mode=rwc)
    #[config(env = "OAUTH_DATABASE_URL", default = "sqlite://oauth.db?mode=rwc")]
    pub url: String,

    /// Maximum pooled connections (default: 10)
    #[config(env = "OAUTH_DATABASE_MAX_CONNECTIONS", default = 10)]
    pub max_connections: u32,

    /// How long a writer waits on a locked database, in seconds (default: 5)
    #[config(env = "OAUTH_DATABASE_BUSY_TIMEOUT", default = 5)]
    pub busy_timeout: u64,
}
