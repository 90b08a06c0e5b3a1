//! Relational persistence for clients, users, codes and tokens.
//!
//! Lookups take typed criteria structs. Every field that is set becomes an
//! `AND`-joined equality predicate; criteria with nothing set are rejected.

use crate::cache::{Cache, CacheBackend, CacheError};
use crate::config::DatabaseConfig;
use crate::lock::LockError;
use crate::models::{OAuthClient, User};
use log::{info, warn};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Encode, QueryBuilder, Sqlite, Type};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod access_tokens;
pub mod clients;
pub mod codes;
pub mod refresh_tokens;
pub mod users;

pub use access_tokens::{AccessTokenQuery, AccessTokenRepository, NewAccessToken};
pub use clients::{ClientQuery, ClientRepository};
pub use codes::{AuthorizationCodeRepository, CodeQuery, NewAuthorizationCode};
pub use refresh_tokens::{NewRefreshToken, RefreshTokenQuery, RefreshTokenRepository};
pub use users::{NewUser, UserQuery, UserRepository};

const SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
    #[error("Lookup without criteria on {0}")]
    EmptyQuery(&'static str),
    #[error("Malformed row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
}

/// Read access to registered clients
#[async_trait::async_trait]
pub trait ClientLookup: Send + Sync {
    async fn find_client(&self, query: &ClientQuery) -> Result<Option<OAuthClient>, StoreError>;
}

/// Read access to user accounts
#[async_trait::async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_user(&self, query: &UserQuery) -> Result<Option<User>, StoreError>;
}

/// Opens the pool. In-memory databases live and die with their connection, so
/// they are pinned to a single connection that is never recycled.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout))
        .foreign_keys(true);

    let pool = if config.url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool.connect_with(options).await?;
    info!("Connected to database {}", config.url);
    Ok(pool)
}

/// Applies the embedded schema. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| format!("Database health check failed: {e}"))
}

/// Appends `AND <column> = ?` when `value` is set
pub(crate) fn push_eq<'a, T>(qb: &mut QueryBuilder<'a, Sqlite>, column: &str, value: Option<T>)
where
    T: 'a + Encode<'a, Sqlite> + Type<Sqlite> + Send,
{
    if let Some(value) = value {
        qb.push(" AND ").push(column).push(" = ").push_bind(value);
    }
}

/// Cache-aside read. Cache failures are logged and fall through to `load`;
/// misses are not cached.
pub(crate) async fn cached<T, F, Fut>(
    cache: &Cache,
    key: &str,
    load: F,
) -> Result<Option<T>, StoreError>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, StoreError>>,
{
    match cache.get::<T>(key).await {
        Ok(Some(value)) => return Ok(Some(value)),
        Ok(None) => {}
        Err(e) => warn!("Cache read failed for {}: {}", key, e),
    }

    let loaded = load().await?;
    if let Some(value) = &loaded {
        if let Err(e) = cache.set(key, value).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
    Ok(loaded)
}

/// Deletes entity keys and every list entry under `list_prefix`
pub(crate) async fn invalidate(
    cache: &Cache,
    keys: &[String],
    list_prefix: &str,
) -> Result<(), StoreError> {
    for key in keys {
        cache.delete(key).await?;
    }
    cache.delete_by_prefix(list_prefix).await?;
    Ok(())
}
