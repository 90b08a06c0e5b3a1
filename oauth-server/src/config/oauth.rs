//! OAuth 2.0, session, password and subject configuration

use confique::Config;

/// OAuth 2.0 configuration
#[derive(Debug, Config, Clone)]
pub struct OAuthConfig {
    /// Issuer written into every minted token (default: "oauth-server")
    #[config(env = "OAUTH_ISSUER", default = "oauth-server")]
    pub issuer: String,

    /// Frontend base URL; authorization errors that cannot be sent back to the
    /// client are redirected to `<frontend_url>/error`
    #[config(env = "OAUTH_FRONTEND_URL", default = "http://localhost:3000")]
    pub frontend_url: String,

    /// Maximum number of memoized per-client signing contexts (default: 1024)
    #[config(env = "OAUTH_SIGNING_CACHE_CAPACITY", default = 1024)]
    pub signing_cache_capacity: u64,
}

impl OAuthConfig {
    /// Returns the frontend error page URL
    pub fn error_page_url(&self) -> String {
        format!("{}/error", self.frontend_url.trim_end_matches('/'))
    }
}

/// Cookie session configuration
#[derive(Debug, Config, Clone)]
pub struct SessionConfig {
    /// Name of the session cookie (default: "access_token")
    #[config(env = "OAUTH_SESSION_COOKIE_NAME", default = "access_token")]
    pub cookie_name: String,

    /// HMAC secret used to sign session cookies
    #[config(env = "OAUTH_SESSION_SECRET", default = "change-me-session-secret")]
    pub secret: String,

    /// Session lifetime in seconds (default: 1 day)
    #[config(env = "OAUTH_SESSION_TTL", default = 86400)]
    pub ttl: u64,
}

/// Argon2id cost parameters for stored password hashes
#[derive(Debug, Config, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456)
    #[config(env = "OAUTH_PASSWORD_MEMORY_COST", default = 19456)]
    pub memory_cost: u32,

    /// Number of passes (default: 2)
    #[config(env = "OAUTH_PASSWORD_TIME_COST", default = 2)]
    pub time_cost: u32,

    #[config(env = "OAUTH_PASSWORD_PARALLELISM", default = 1)]
    pub parallelism: u32,
}

/// Public subject identifier derivation
#[derive(Debug, Config, Clone)]
pub struct SubjectConfig {
    #[config(env = "OAUTH_SUBJECT_SECRET", default = "change-me-subject-secret")]
    pub secret: String,

    #[config(env = "OAUTH_SUBJECT_PREFIX", default = "u_")]
    pub prefix: String,

    /// Total subject length including the prefix (default: 24)
    #[config(env = "OAUTH_SUBJECT_LENGTH", default = 24)]
    pub length: usize,
}
