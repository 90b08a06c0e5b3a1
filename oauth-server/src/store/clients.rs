use super::{cached, invalidate, push_eq, ClientLookup, StoreError};
use crate::cache::Cache;
use crate::models::{now_ts, ClientStatus, OAuthClient};
use crate::signing::SigningContexts;
use log::info;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

const COLUMNS: &str = "id, secret, access_token_secret, refresh_token_secret, redirect_uris, \
     grant_types, scopes, auth_code_expire, access_token_expire, refresh_token_expire, \
     name, description, logo, status, created_at, updated_at";

/// Prefix of list-level cache entries for clients
pub const LIST_CACHE_PREFIX: &str = "list_oauth_clients:";

#[derive(Debug, Clone, Default)]
pub struct ClientQuery {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl ClientQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }

    /// Only single-field id lookups are cached
    fn cache_key(&self) -> Option<String> {
        match (&self.id, &self.name) {
            (Some(id), None) => Some(client_cache_key(id)),
            _ => None,
        }
    }
}

fn client_cache_key(id: &str) -> String {
    format!("oauth_client:id={id}")
}

/// Row shape; list columns are stored as JSON text
#[derive(sqlx::FromRow)]
struct ClientRow {
    id: String,
    secret: String,
    access_token_secret: String,
    refresh_token_secret: String,
    redirect_uris: String,
    grant_types: String,
    scopes: String,
    auth_code_expire: i64,
    access_token_expire: i64,
    refresh_token_expire: i64,
    name: String,
    description: String,
    logo: String,
    status: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ClientRow> for OAuthClient {
    type Error = StoreError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        let list = |column: &'static str, raw: &str| -> Result<Vec<String>, StoreError> {
            serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
                table: "oauth_clients",
                detail: format!("{column} of client {}: {e}", row.id),
            })
        };

        Ok(OAuthClient {
            redirect_uris: list("redirect_uris", &row.redirect_uris)?,
            grant_types: list("grant_types", &row.grant_types)?,
            scopes: list("scopes", &row.scopes)?,
            id: row.id.clone(),
            secret: row.secret,
            access_token_secret: row.access_token_secret,
            refresh_token_secret: row.refresh_token_secret,
            auth_code_expire: row.auth_code_expire,
            access_token_expire: row.access_token_expire,
            refresh_token_expire: row.refresh_token_expire,
            name: row.name,
            description: row.description,
            logo: row.logo,
            status: ClientStatus::from(row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// New secrets for [`ClientRepository::rotate_secrets`]
#[derive(Debug, Clone)]
pub struct ClientSecrets {
    pub secret: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
}

/// Client registry backed by `oauth_clients`, with cache-aside reads
#[derive(Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
    cache: Arc<Cache>,
    signing: SigningContexts,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool, cache: Arc<Cache>, signing: SigningContexts) -> Self {
        Self {
            pool,
            cache,
            signing,
        }
    }

    async fn load(&self, query: &ClientQuery) -> Result<Option<OAuthClient>, StoreError> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM oauth_clients WHERE 1 = 1"));
        push_eq(&mut qb, "id", query.id.clone());
        push_eq(&mut qb, "name", query.name.clone());
        qb.push(" LIMIT 1");

        qb.build_query_as::<ClientRow>()
            .fetch_optional(&self.pool)
            .await?
            .map(OAuthClient::try_from)
            .transpose()
    }

    pub async fn get(&self, query: &ClientQuery) -> Result<Option<OAuthClient>, StoreError> {
        if query.is_empty() {
            return Err(StoreError::EmptyQuery("oauth_clients"));
        }
        match query.cache_key() {
            Some(key) => cached(&self.cache, &key, || self.load(query)).await,
            None => self.load(query).await,
        }
    }

    /// Registers a client. `created_at`/`updated_at` are stamped here.
    pub async fn create(&self, client: &OAuthClient) -> Result<OAuthClient, StoreError> {
        let now = now_ts();
        sqlx::query(&format!(
            "INSERT INTO oauth_clients ({COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&client.id)
        .bind(&client.secret)
        .bind(&client.access_token_secret)
        .bind(&client.refresh_token_secret)
        .bind(to_json(&client.redirect_uris))
        .bind(to_json(&client.grant_types))
        .bind(to_json(&client.scopes))
        .bind(client.auth_code_expire)
        .bind(client.access_token_expire)
        .bind(client.refresh_token_expire)
        .bind(&client.name)
        .bind(&client.description)
        .bind(&client.logo)
        .bind(i64::from(client.status))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.invalidate(&client.id).await?;
        info!("Registered OAuth client {}", client.id);

        Ok(OAuthClient {
            created_at: now,
            updated_at: now,
            ..client.clone()
        })
    }

    /// Replaces the client's secrets. Tokens signed with the old secrets stop verifying.
    pub async fn rotate_secrets(
        &self,
        id: &str,
        secrets: &ClientSecrets,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE oauth_clients SET secret = ?, access_token_secret = ?, \
             refresh_token_secret = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&secrets.secret)
        .bind(&secrets.access_token_secret)
        .bind(&secrets.refresh_token_secret)
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("client {id} not found")));
        }

        self.invalidate(id).await?;
        info!("Rotated secrets of OAuth client {}", id);
        Ok(())
    }

    pub async fn set_status(&self, id: &str, status: ClientStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE oauth_clients SET status = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(status))
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("client {id} not found")));
        }
        self.invalidate(id).await
    }

    async fn invalidate(&self, id: &str) -> Result<(), StoreError> {
        invalidate(&self.cache, &[client_cache_key(id)], LIST_CACHE_PREFIX).await?;
        self.signing.invalidate(id).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClientLookup for ClientRepository {
    async fn find_client(&self, query: &ClientQuery) -> Result<Option<OAuthClient>, StoreError> {
        self.get(query).await
    }
}

fn to_json(values: &[String]) -> String {
    serde_json::Value::from(values.to_vec()).to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use crate::cache::CacheBackend;
    use crate::store::tests::test_pool;

    pub(crate) fn sample_client(id: &str) -> OAuthClient {
        OAuthClient {
            id: id.to_string(),
            secret: format!("{id}-secret"),
            access_token_secret: format!("{id}-access"),
            refresh_token_secret: format!("{id}-refresh"),
            redirect_uris: vec!["https://app/cb".to_string()],
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "client_credentials".to_string(),
            ],
            scopes: vec!["profile".to_string(), "email".to_string()],
            auth_code_expire: 300,
            access_token_expire: 3600,
            refresh_token_expire: 86400,
            name: format!("{id} app"),
            description: String::new(),
            logo: String::new(),
            status: ClientStatus::Active,
            created_at: 0,
            updated_at: 0,
        }
    }

    async fn repository() -> (ClientRepository, Arc<Cache>) {
        let cache = Arc::new(Cache::InMemory(InMemoryCache::new(600, 1).unwrap()));
        let repo = ClientRepository::new(
            test_pool().await,
            cache.clone(),
            SigningContexts::new("issuer", 16),
        );
        (repo, cache)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, _) = repository().await;
        let created = repo.create(&sample_client("c1")).await.unwrap();

        let found = repo.get(&ClientQuery::by_id("c1")).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.redirect_uris, vec!["https://app/cb"]);

        let by_name = ClientQuery {
            name: Some("c1 app".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.get(&by_name).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_get_populates_cache() {
        let (repo, cache) = repository().await;
        repo.create(&sample_client("c1")).await.unwrap();

        repo.get(&ClientQuery::by_id("c1")).await.unwrap();
        let cached: Option<OAuthClient> = cache.get("oauth_client:id=c1").await.unwrap();
        assert_eq!(cached.map(|c| c.id), Some("c1".to_string()));
    }

    #[tokio::test]
    async fn test_rotation_invalidates_cache() {
        let (repo, cache) = repository().await;
        repo.create(&sample_client("c1")).await.unwrap();
        repo.get(&ClientQuery::by_id("c1")).await.unwrap();
        cache.set("list_oauth_clients:page=1", &1).await.unwrap();

        repo.rotate_secrets(
            "c1",
            &ClientSecrets {
                secret: "new".to_string(),
                access_token_secret: "new-access".to_string(),
                refresh_token_secret: "new-refresh".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(cache
            .get::<OAuthClient>("oauth_client:id=c1")
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get::<i32>("list_oauth_clients:page=1")
            .await
            .unwrap()
            .is_none());
        let found = repo.get(&ClientQuery::by_id("c1")).await.unwrap().unwrap();
        assert_eq!(found.access_token_secret, "new-access");
    }

    #[tokio::test]
    async fn test_rotate_unknown_client() {
        let (repo, _) = repository().await;
        let result = repo
            .rotate_secrets(
                "nope",
                &ClientSecrets {
                    secret: "s".to_string(),
                    access_token_secret: "a".to_string(),
                    refresh_token_secret: "r".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_status_is_visible_immediately() {
        let (repo, _) = repository().await;
        repo.create(&sample_client("c1")).await.unwrap();
        repo.get(&ClientQuery::by_id("c1")).await.unwrap();

        repo.set_status("c1", ClientStatus::Disabled).await.unwrap();
        let found = repo.get(&ClientQuery::by_id("c1")).await.unwrap().unwrap();
        assert!(!found.is_active());
    }
}
