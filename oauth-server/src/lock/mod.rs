//! Short-lived mutation locks.
//!
//! Keys follow `user:create:<username>` and `user:delete:<id>`. A lock is
//! taken with a single attempt; callers see [`LockError::Busy`] when another
//! request holds it. The TTL bounds how long a crashed holder can block others.

use crate::config::{LockConfig, LockStore};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use log::{debug, warn};
use rand::RngCore;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock {0} is held by another request")]
    Busy(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Lock backend selected from configuration
#[derive(Clone)]
pub enum LockManager {
    InMemory(memory::InMemoryLocks),
    Redis(redis::RedisLocks),
}

/// Proof of holding a lock. The lock is released by [`LockGuard::release`] or,
/// failing that, when the guard is dropped.
#[must_use = "dropping a lock guard releases the lock"]
pub struct LockGuard {
    key: String,
    token: String,
    manager: LockManager,
    released: bool,
}

impl LockManager {
    /// Tries once to take `key` for `ttl`.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockGuard, LockError> {
        let token = new_lock_token();
        let acquired = match self {
            Self::InMemory(locks) => locks.try_acquire(key, &token, ttl),
            Self::Redis(locks) => locks.try_acquire(key, &token, ttl).await?,
        };

        if !acquired {
            debug!("Lock {} is busy", key);
            return Err(LockError::Busy(key.to_string()));
        }

        Ok(LockGuard {
            key: key.to_string(),
            token,
            manager: self.clone(),
            released: false,
        })
    }

    /// Runs `operation` while holding `key`. The lock is released whether the
    /// operation succeeds, fails or is dropped before completion.
    pub async fn with_lock<T, E, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        operation: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.acquire(key, ttl).await?;
        let result = operation.await;
        guard.release().await;
        result
    }

    pub async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(_) => Ok(()),
            Self::Redis(locks) => locks.health_check().await,
        }
    }
}

impl LockGuard {
    /// Releases the lock if this guard still owns it. Failures are logged;
    /// the TTL reclaims the key in that case.
    pub async fn release(mut self) {
        self.released = true;
        let result = match &self.manager {
            LockManager::InMemory(locks) => {
                locks.release(&self.key, &self.token);
                Ok(())
            }
            LockManager::Redis(locks) => locks.release(&self.key, &self.token).await,
        };
        if let Err(e) = result {
            warn!("Failed to release lock {}: {}", self.key, e);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!("Releasing lock {} from a dropped guard", self.key);

        match &self.manager {
            LockManager::InMemory(locks) => locks.release(&self.key, &self.token),
            LockManager::Redis(locks) => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    warn!("No runtime to release lock {}, leaving it to expire", self.key);
                    return;
                };
                let locks = locks.clone();
                let key = std::mem::take(&mut self.key);
                let token = std::mem::take(&mut self.token);
                handle.spawn(async move {
                    if let Err(e) = locks.release(&key, &token).await {
                        warn!("Failed to release lock {}: {}", key, e);
                    }
                });
            }
        }
    }
}

fn new_lock_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Creates the lock backend selected by `config.store`.
pub async fn create_lock_manager(config: &LockConfig) -> Result<LockManager, LockError> {
    match config.store {
        LockStore::InMemory => Ok(LockManager::InMemory(memory::InMemoryLocks::new())),
        LockStore::Redis => {
            if config.redis_url.is_empty() {
                return Err(LockError::Config(
                    "Redis URL is required for Redis locks".to_string(),
                ));
            }
            let locks = redis::RedisLocks::new(&config.redis_url)
                .await
                .map_err(LockError::Config)?;
            Ok(LockManager::Redis(locks))
        }
    }
}

/// Lock key guarding creation of `username`
pub fn user_create_key(username: &str) -> String {
    format!("user:create:{username}")
}

/// Lock key guarding deletion of user `id`
pub fn user_delete_key(id: i64) -> String {
    format!("user:delete:{id}")
}
