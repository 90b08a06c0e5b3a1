use super::LockError;
use redis::{aio::ConnectionManager, Client, Script};
use std::time::Duration;

/// Deletes the key only when it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisLocks {
    conn_manager: ConnectionManager,
}

impl RedisLocks {
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client =
            Client::open(redis_url).map_err(|err| format!("Failed to connect to Redis: {err}"))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|err| format!("Failed to create Redis connection manager: {err}"))?;
        Ok(Self { conn_manager })
    }

    pub(super) async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|err| LockError::Redis(err.to_string()))?;
        Ok(reply.is_some())
    }

    pub(super) async fn release(&self, key: &str, token: &str) -> Result<(), LockError> {
        let mut conn = self.conn_manager.clone();
        Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async::<i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| LockError::Redis(err.to_string()))
    }

    pub(super) async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| format!("Redis lock health check failed: {err}"))
    }
}
