use super::{cached, invalidate, push_eq, StoreError, UserLookup};
use crate::cache::Cache;
use crate::config::SubjectConfig;
use crate::lock::{user_create_key, user_delete_key, LockManager};
use crate::models::{now_ts, User};
use log::info;
use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;
use std::time::Duration;

const COLUMNS: &str =
    "id, username, nickname, avatar, role, status, subject, created_at, updated_at";

/// Prefix of list-level cache entries for users
pub const LIST_CACHE_PREFIX: &str = "list_users:";

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub id: Option<i64>,
    pub username: Option<String>,
}

impl UserQuery {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }

    fn cache_key(&self) -> Option<String> {
        match (self.id, &self.username) {
            (Some(id), None) => Some(id_cache_key(id)),
            (None, Some(username)) => Some(username_cache_key(username)),
            _ => None,
        }
    }
}

fn id_cache_key(id: i64) -> String {
    format!("user:id={id}")
}

fn username_cache_key(username: &str) -> String {
    format!("user:username={username}")
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    /// Already hashed, see [`crate::auth::Passwords`]
    pub password_hash: String,
    pub nickname: String,
    pub avatar: String,
    pub role: String,
}

/// Stable public identifier for `user_id`: keyed SHA-256, hex encoded and
/// truncated so the whole value including the prefix is `length` characters.
pub fn derive_subject(config: &SubjectConfig, user_id: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config.secret.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());

    let hash_len = config
        .length
        .saturating_sub(config.prefix.len())
        .min(digest.len());
    format!("{}{}", config.prefix, &digest[..hash_len])
}

#[derive(sqlx::FromRow)]
struct Credentials {
    #[sqlx(flatten)]
    user: User,
    password: String,
}

/// User directory backed by `users`, with cache-aside reads and lock-guarded writes
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
    cache: Arc<Cache>,
    locks: Arc<LockManager>,
    subject: SubjectConfig,
    lock_ttl: Duration,
}

impl UserRepository {
    pub fn new(
        pool: SqlitePool,
        cache: Arc<Cache>,
        locks: Arc<LockManager>,
        subject: SubjectConfig,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            locks,
            subject,
            lock_ttl,
        }
    }

    async fn load(&self, query: &UserQuery) -> Result<Option<User>, StoreError> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM users WHERE 1 = 1"));
        push_eq(&mut qb, "id", query.id);
        push_eq(&mut qb, "username", query.username.clone());
        qb.push(" LIMIT 1");

        Ok(qb
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get(&self, query: &UserQuery) -> Result<Option<User>, StoreError> {
        if query.id.is_none() && query.username.is_none() {
            return Err(StoreError::EmptyQuery("users"));
        }
        match query.cache_key() {
            Some(key) => cached(&self.cache, &key, || self.load(query)).await,
            None => self.load(query).await,
        }
    }

    /// Creates a user while holding `user:create:<username>`. The subject is
    /// derived from the new row id in the same transaction.
    pub async fn create(&self, new: &NewUser) -> Result<User, StoreError> {
        self.locks
            .with_lock(&user_create_key(&new.username), self.lock_ttl, async {
                if self
                    .load(&UserQuery::by_username(&new.username))
                    .await?
                    .is_some()
                {
                    return Err(StoreError::Conflict(format!(
                        "username {} is already taken",
                        new.username
                    )));
                }

                let now = now_ts();
                let mut tx = self.pool.begin().await?;
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO users (username, password, nickname, avatar, role, status, \
                     subject, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, 1, '', ?, ?) RETURNING id",
                )
                .bind(&new.username)
                .bind(&new.password_hash)
                .bind(&new.nickname)
                .bind(&new.avatar)
                .bind(&new.role)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

                let subject = derive_subject(&self.subject, id);
                let user = sqlx::query_as::<_, User>(&format!(
                    "UPDATE users SET subject = ? WHERE id = ? RETURNING {COLUMNS}"
                ))
                .bind(&subject)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;

                invalidate(
                    &self.cache,
                    &[id_cache_key(id), username_cache_key(&user.username)],
                    LIST_CACHE_PREFIX,
                )
                .await?;
                info!("Created user {} ({})", user.id, user.username);
                Ok(user)
            })
            .await
    }

    /// The user named `username` with their stored password hash. Never cached.
    pub async fn credentials(&self, username: &str) -> Result<Option<(User, String)>, StoreError> {
        let row = sqlx::query_as::<_, Credentials>(&format!(
            "SELECT {COLUMNS}, password FROM users WHERE username = ? LIMIT 1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| (row.user, row.password)))
    }

    /// Deletes a user while holding `user:delete:<id>`
    pub async fn delete(&self, id: i64) -> Result<User, StoreError> {
        self.locks
            .with_lock(&user_delete_key(id), self.lock_ttl, async {
                let user = self
                    .load(&UserQuery::by_id(id))
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("user {id} not found")))?;

                sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;

                invalidate(
                    &self.cache,
                    &[id_cache_key(id), username_cache_key(&user.username)],
                    LIST_CACHE_PREFIX,
                )
                .await?;
                info!("Deleted user {} ({})", user.id, user.username);
                Ok(user)
            })
            .await
    }
}

#[async_trait::async_trait]
impl UserLookup for UserRepository {
    async fn find_user(&self, query: &UserQuery) -> Result<Option<User>, StoreError> {
        self.get(query).await
    }
}
