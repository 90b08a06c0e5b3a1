use super::{push_eq, StoreError};
use crate::models::{now_ts, RefreshToken};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

const COLUMNS: &str =
    "id, token, access_token_id, user_id, client_id, scope, expires_at, revoked, created_at";

#[derive(Debug, Clone, Default)]
pub struct RefreshTokenQuery {
    pub id: Option<i64>,
    pub token: Option<String>,
    pub access_token_id: Option<i64>,
    pub client_id: Option<String>,
    pub user_id: Option<i64>,
}

impl RefreshTokenQuery {
    pub fn by_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn by_access_token(access_token_id: i64) -> Self {
        Self {
            access_token_id: Some(access_token_id),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.token.is_none()
            && self.access_token_id.is_none()
            && self.client_id.is_none()
            && self.user_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token: String,
    pub access_token_id: i64,
    pub user_id: i64,
    pub client_id: String,
    pub scope: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: SqlitePool,
}

impl RefreshTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        query: &RefreshTokenQuery,
    ) -> Result<Option<RefreshToken>, StoreError> {
        if query.is_empty() {
            return Err(StoreError::EmptyQuery("refresh_tokens"));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM refresh_tokens WHERE 1 = 1"
        ));
        push_eq(&mut qb, "id", query.id);
        push_eq(&mut qb, "token", query.token.clone());
        push_eq(&mut qb, "access_token_id", query.access_token_id);
        push_eq(&mut qb, "client_id", query.client_id.clone());
        push_eq(&mut qb, "user_id", query.user_id);
        qb.push(" LIMIT 1");

        Ok(qb
            .build_query_as::<RefreshToken>()
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn create_in_tx(
        conn: &mut SqliteConnection,
        new: &NewRefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "INSERT INTO refresh_tokens \
             (token, access_token_id, user_id, client_id, scope, expires_at, revoked, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?) RETURNING {COLUMNS}"
        ))
        .bind(&new.token)
        .bind(new.access_token_id)
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
    pub async fn revoke_in_tx(conn: &mut SqliteConnection, id: i64) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE id = ? AND revoked = 0")
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

    #[tokio::test]
    async fn test_create_find_and_revoke() {
        let pool = test_pool().await;
        let repo = RefreshTokenRepository::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        let created = RefreshTokenRepository::create_in_tx(
            &mut tx,
            &NewRefreshToken {
                token: "R1".to_string(),
                access_token_id: 7,
                user_id: 42,
                client_id: "c1".to_string(),
                scope: "profile".to_string(),
                expires_at: now_ts() + 86400,
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let by_access = repo
            .find(&RefreshTokenQuery::by_access_token(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_access, created);

        let mut conn = pool.acquire().await.unwrap();
        assert!(RefreshTokenRepository::revoke_in_tx(&mut conn, created.id)
            .await
            .unwrap());
        assert!(!RefreshTokenRepository::revoke_in_tx(&mut conn, created.id)
            .await
            .unwrap());
        drop(conn);

        let found = repo
            .find(&RefreshTokenQuery::by_token("R1"))
            .await
            .unwrap()
            .unwrap();
        assert!(found.revoked);
    }
}
