use super::{push_eq, StoreError};
use crate::models::{now_ts, AccessToken, TOKEN_TYPE_BEARER};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

const COLUMNS: &str =
    "id, token, token_type, user_id, client_id, scope, expires_at, revoked, created_at";

#[derive(Debug, Clone, Default)]
pub struct AccessTokenQuery {
    pub id: Option<i64>,
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<i64>,
}

impl AccessTokenQuery {
    pub fn by_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.token.is_none()
            && self.client_id.is_none()
            && self.user_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub token: String,
    pub user_id: Option<i64>,
    pub client_id: String,
    pub scope: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct AccessTokenRepository {
    pool: SqlitePool,
}

impl AccessTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, query: &AccessTokenQuery) -> Result<Option<AccessToken>, StoreError> {
        if query.is_empty() {
            return Err(StoreError::EmptyQuery("access_tokens"));
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM access_tokens WHERE 1 = 1"));
        push_eq(&mut qb, "id", query.id);
        push_eq(&mut qb, "token", query.token.clone());
        push_eq(&mut qb, "client_id", query.client_id.clone());
        push_eq(&mut qb, "user_id", query.user_id);
        qb.push(" LIMIT 1");

        Ok(qb
            .build_query_as::<AccessToken>()
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn create(&self, new: &NewAccessToken) -> Result<AccessToken, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::create_in_tx(&mut conn, new).await
    }

    pub async fn create_in_tx(
        conn: &mut SqliteConnection,
        new: &NewAccessToken,
    ) -> Result<AccessToken, StoreError> {
        let token = sqlx::query_as::<_, AccessToken>(&format!(
            "INSERT INTO access_tokens \
             (token, token_type, user_id, client_id, scope, expires_at, revoked, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?) RETURNING {COLUMNS}"
        ))
        .bind(&new.token)
        .bind(TOKEN_TYPE_BEARER)
        .bind(new.user_id)
        .bind(&new.client_id)
        .bind(&new.scope)
        .bind(new.expires_at)
        .bind(now_ts())
        .fetch_one(conn)
        .await?;
        Ok(token)
    }

    /// Returns `false` when the token was already revoked or does not exist
    pub async fn revoke(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::revoke_in_tx(&mut conn, id).await
    }

    pub async fn revoke_in_tx(conn: &mut SqliteConnection, id: i64) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE id = ? AND revoked = 0")
                .bind(id)
                .execute(conn)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::test_pool;

    fn new_token(token: &str, user_id: Option<i64>) -> NewAccessToken {
        NewAccessToken {
            token: token.to_string(),
            user_id,
            client_id: "c1".to_string(),
            scope: "profile".to_string(),
            expires_at: now_ts() + 3600,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = AccessTokenRepository::new(test_pool().await);
        let created = repo.create(&new_token("A1", Some(42))).await.unwrap();
        assert_eq!(created.token_type, "Bearer");
        assert!(!created.revoked);

        let found = repo
            .find(&AccessTokenQuery::by_token("A1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_client_token_has_no_user() {
        let repo = AccessTokenRepository::new(test_pool().await);
        let created = repo.create(&new_token("A1", None)).await.unwrap();
        assert_eq!(created.user_id, None);
        assert_eq!(created.owner(), None);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let repo = AccessTokenRepository::new(test_pool().await);
        let created = repo.create(&new_token("A1", Some(42))).await.unwrap();

        assert!(repo.revoke(created.id).await.unwrap());
        assert!(!repo.revoke(created.id).await.unwrap());
        let found = repo
            .find(&AccessTokenQuery::by_id(created.id))
            .await
            .unwrap()
            .unwrap();
        assert!(found.revoked);
    }
}
