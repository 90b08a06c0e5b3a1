use super::{push_eq, StoreError};
use crate::models::{now_ts, AuthorizationCode};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

const COLUMNS: &str =
    "id, code, user_id, client_id, redirect_uri, scope, expires_at, used, created_at";

/// Lookup criteria for authorization codes
#[derive(Debug, Clone, Default)]
pub struct CodeQuery {
    pub id: Option<i64>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<i64>,
}

impl CodeQuery {
    pub fn by_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
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
            && self.code.is_none()
            && self.client_id.is_none()
            && self.user_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewAuthorizationCode {
    pub code: String,
    pub user_id: i64,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: SqlitePool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        new: &NewAuthorizationCode,
    ) -> Result<AuthorizationCode, StoreError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(&format!(
            "INSERT INTO authorization_codes \
             (code, user_id, client_id, redirect_uri, scope, expires_at, used, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?) RETURNING {COLUMNS}"
        ))
        .bind(&new.code)
        .bind(new.user_id)
        .bind(&new.client_id)
        .bind(&new.redirect_uri)
        .bind(&new.scope)
        .bind(new.expires_at)
        .bind(now_ts())
        .fetch_one(&self.pool)
        .await?;
        Ok(code)
    }

    pub async fn find(&self, query: &CodeQuery) -> Result<Option<AuthorizationCode>, StoreError> {
        if query.is_empty() {
            return Err(StoreError::EmptyQuery("authorization_codes"));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM authorization_codes WHERE 1 = 1"
        ));
        push_eq(&mut qb, "id", query.id);
        push_eq(&mut qb, "code", query.code.clone());
        push_eq(&mut qb, "client_id", query.client_id.clone());
        push_eq(&mut qb, "user_id", query.user_id);
        qb.push(" LIMIT 1");

        Ok(qb
            .build_query_as::<AuthorizationCode>()
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Marks the code used outside any transaction. Returns `false` when the
    /// code was already used or does not exist.
    pub async fn mark_used(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::mark_used_in_tx(&mut conn, id).await
    }

    /// Marks the code used inside the caller's transaction.
    ///
    /// The update only matches an unused code, so of two concurrent redemptions
    /// exactly one sees `true`.
    pub async fn mark_used_in_tx(conn: &mut SqliteConnection, id: i64) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE authorization_codes SET used = 1 WHERE id = ? AND used = 0")
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

    fn new_code(code: &str) -> NewAuthorizationCode {
        NewAuthorizationCode {
            code: code.to_string(),
            user_id: 42,
            client_id: "c1".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            scope: "profile".to_string(),
            expires_at: now_ts() + 300,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = AuthorizationCodeRepository::new(test_pool().await);
        let created = repo.create(&new_code("K")).await.unwrap();
        assert!(!created.used);

        let found = repo.find(&CodeQuery::by_code("K")).await.unwrap().unwrap();
        assert_eq!(found, created);

        let by_owner = CodeQuery {
            client_id: Some("c1".to_string()),
            user_id: Some(42),
            ..Default::default()
        };
        assert_eq!(repo.find(&by_owner).await.unwrap(), Some(created));
        assert!(repo
            .find(&CodeQuery::by_code("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_rejects_empty_query() {
        let repo = AuthorizationCodeRepository::new(test_pool().await);
        assert!(matches!(
            repo.find(&CodeQuery::default()).await,
            Err(StoreError::EmptyQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_code_is_unique() {
        let repo = AuthorizationCodeRepository::new(test_pool().await);
        repo.create(&new_code("K")).await.unwrap();
        assert!(repo.create(&new_code("K")).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_used_only_once() {
        let repo = AuthorizationCodeRepository::new(test_pool().await);
        let code = repo.create(&new_code("K")).await.unwrap();

        assert!(repo.mark_used(code.id).await.unwrap());
        assert!(!repo.mark_used(code.id).await.unwrap());
        assert!(repo
            .find(&CodeQuery::by_id(code.id))
            .await
            .unwrap()
            .unwrap()
            .used);
    }

    #[tokio::test]
    async fn test_mark_used_rolls_back_with_transaction() {
        let pool = test_pool().await;
        let repo = AuthorizationCodeRepository::new(pool.clone());
        let code = repo.create(&new_code("K")).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert!(AuthorizationCodeRepository::mark_used_in_tx(&mut tx, code.id)
            .await
            .unwrap());
        tx.rollback().await.unwrap();

        assert!(!repo
            .find(&CodeQuery::by_id(code.id))
            .await
            .unwrap()
            .unwrap()
            .used);
    }
}
