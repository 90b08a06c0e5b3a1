//! RFC 7662 token introspection

use crate::errors::OAuthError;
use crate::models::{now_ts, TOKEN_TYPE_BEARER};
use crate::signing::SigningContexts;
use crate::store::{
    AccessTokenQuery, AccessTokenRepository, ClientLookup, ClientQuery, UserLookup, UserQuery,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Introspection result. Inactive tokens carry no other field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Public subject of the user, or the client id for client tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub struct IntrospectionService {
    access_tokens: AccessTokenRepository,
    clients: Arc<dyn ClientLookup>,
    users: Arc<dyn UserLookup>,
    signing: SigningContexts,
}

impl IntrospectionService {
    pub fn new(
        access_tokens: AccessTokenRepository,
        clients: Arc<dyn ClientLookup>,
        users: Arc<dyn UserLookup>,
        signing: SigningContexts,
    ) -> Self {
        Self {
            access_tokens,
            clients,
            users,
            signing,
        }
    }

    /// Never fails. Missing, revoked, expired, forged and orphaned tokens all
    /// read as `{"active": false}`.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.inspect(token).await {
            Ok(Some(response)) => response,
            Ok(None) => IntrospectionResponse::inactive(),
            Err(e) => {
                warn!("Introspection failed: {}", e);
                IntrospectionResponse::inactive()
            }
        }
    }

    async fn inspect(&self, token: &str) -> Result<Option<IntrospectionResponse>, OAuthError> {
        let Some(stored) = self
            .access_tokens
            .find(&AccessTokenQuery::by_token(token))
            .await?
        else {
            return Ok(None);
        };
        if stored.revoked || stored.is_expired(now_ts()) {
            return Ok(None);
        }

        let Some(client) = self
            .clients
            .find_client(&ClientQuery::by_id(&stored.client_id))
            .await?
        else {
            return Ok(None);
        };
        let context = self.signing.for_client(&client).await;
        if let Err(e) = context.access.verify(token, &client.id) {
            debug!("Access token {} failed verification: {}", stored.id, e);
            return Ok(None);
        }

        let (username, sub) = match stored.owner() {
            Some(user_id) => match self.users.find_user(&UserQuery::by_id(user_id)).await? {
                Some(user) => (Some(user.username), user.subject),
                None => return Ok(None),
            },
            None => (None, stored.client_id.clone()),
        };

        Ok(Some(IntrospectionResponse {
            active: true,
            scope: Some(stored.scope),
            client_id: Some(stored.client_id),
            username,
            token_type: Some(TOKEN_TYPE_BEARER.to_string()),
            exp: Some(stored.expires_at),
            sub: Some(sub),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::token::Grant;
    use crate::oauth::testing::Engines;
    use crate::oauth::revoke::TokenTypeHint;

    #[tokio::test]
    async fn test_active_user_token() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;

        let response = engines.introspection.introspect(&pair.access_token).await;
        assert!(response.active);
        assert_eq!(response.scope.as_deref(), Some("profile"));
        assert_eq!(response.client_id.as_deref(), Some("c1"));
        assert_eq!(response.username.as_deref(), Some("alice"));
        assert_eq!(response.token_type.as_deref(), Some("Bearer"));
        assert_eq!(response.sub, Some(engines.user.subject.clone()));
        assert!(response.exp.unwrap() > now_ts());
    }

    #[tokio::test]
    async fn test_active_client_token() {
        let engines = Engines::new().await;
        let issued = engines
            .tokens
            .exchange("c1", "c1-secret", Grant::ClientCredentials { scope: None })
            .await
            .unwrap();

        let response = engines.introspection.introspect(&issued.access_token).await;
        assert!(response.active);
        assert_eq!(response.username, None);
        assert_eq!(response.sub.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_inactive_tokens_are_indistinguishable() {
        let engines = Engines::new().await;

        let revoked = engines.code_pair("profile").await;
        engines
            .revocation
            .revoke(&revoked.access_token, Some(TokenTypeHint::AccessToken), "c1")
            .await
            .unwrap();

        let expired = engines.code_pair("profile").await;
        sqlx::query("UPDATE access_tokens SET expires_at = ? WHERE token = ?")
            .bind(now_ts() - 1)
            .bind(&expired.access_token)
            .execute(&engines.pool)
            .await
            .unwrap();

        let never_existed = engines.introspection.introspect("never-issued").await;
        let revoked = engines
            .introspection
            .introspect(&revoked.access_token)
            .await;
        let expired = engines
            .introspection
            .introspect(&expired.access_token)
            .await;

        assert_eq!(never_existed, IntrospectionResponse::inactive());
        assert_eq!(revoked, never_existed);
        assert_eq!(expired, never_existed);
        assert_eq!(
            serde_json::to_value(&never_existed).unwrap(),
            serde_json::json!({"active": false})
        );
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_introspectable() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;
        let response = engines
            .introspection
            .introspect(&pair.refresh_token.unwrap())
            .await;
        assert!(!response.active);
    }
}
