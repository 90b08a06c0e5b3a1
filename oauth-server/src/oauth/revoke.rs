//! RFC 7009 token revocation.
//!
//! Callers only learn that the request was accepted. Unknown tokens, tokens
//! owned by another client and already revoked tokens are all silent no-ops.

use crate::errors::OAuthError;
use crate::store::{
    AccessTokenQuery, AccessTokenRepository, RefreshTokenQuery, RefreshTokenRepository, StoreError,
};
use log::{debug, info, warn};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    /// Unrecognised hints are ignored, as RFC 7009 allows
    pub fn parse(hint: Option<&str>) -> Option<Self> {
        match hint? {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    /// Lookup order. Without a hint refresh tokens go first.
    fn lookup_order(hint: Option<Self>) -> [Self; 2] {
        match hint {
            Some(Self::AccessToken) => [Self::AccessToken, Self::RefreshToken],
            Some(Self::RefreshToken) | None => [Self::RefreshToken, Self::AccessToken],
        }
    }
}

enum Outcome {
    NotFound,
    Done,
}

#[derive(Clone)]
pub struct RevocationService {
    pool: SqlitePool,
    access_tokens: AccessTokenRepository,
    refresh_tokens: RefreshTokenRepository,
}

impl RevocationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            access_tokens: AccessTokenRepository::new(pool.clone()),
            refresh_tokens: RefreshTokenRepository::new(pool.clone()),
            pool,
        }
    }

    /// Revokes `token` on behalf of the authenticated `client_id`.
    ///
    /// A failed lookup of one kind does not stop the other. The last failure
    /// is returned when no lookup succeeded; it is for logging only, the
    /// endpoint answers 200 regardless.
    pub async fn revoke(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
        client_id: &str,
    ) -> Result<(), OAuthError> {
        let mut failure = None;
        for kind in TokenTypeHint::lookup_order(hint) {
            let outcome = match kind {
                TokenTypeHint::AccessToken => self.revoke_access(token, client_id).await,
                TokenTypeHint::RefreshToken => self.revoke_refresh(token, client_id).await,
            };
            match outcome {
                Ok(Outcome::Done) => return Ok(()),
                Ok(Outcome::NotFound) => {}
                Err(e) => {
                    warn!("Revocation lookup as {:?} failed: {}", kind, e);
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                debug!("Revocation by client {} matched no token", client_id);
                Ok(())
            }
        }
    }

    /// Revokes the refresh token and, in the same transaction, the access token
    /// minted with it
    async fn revoke_refresh(&self, token: &str, client_id: &str) -> Result<Outcome, OAuthError> {
        let Some(refresh) = self
            .refresh_tokens
            .find(&RefreshTokenQuery::by_token(token))
            .await?
        else {
            return Ok(Outcome::NotFound);
        };
        if refresh.client_id != client_id {
            debug!(
                "Client {} tried to revoke refresh token {} of another client",
                client_id, refresh.id
            );
            return Ok(Outcome::Done);
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        RefreshTokenRepository::revoke_in_tx(&mut tx, refresh.id).await?;
        AccessTokenRepository::revoke_in_tx(&mut tx, refresh.access_token_id).await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(
            "Revoked refresh token {} and access token {} for client {}",
            refresh.id, refresh.access_token_id, client_id
        );
        Ok(Outcome::Done)
    }

    async fn revoke_access(&self, token: &str, client_id: &str) -> Result<Outcome, OAuthError> {
        let Some(access) = self
            .access_tokens
            .find(&AccessTokenQuery::by_token(token))
            .await?
        else {
            return Ok(Outcome::NotFound);
        };
        if access.client_id != client_id {
            debug!(
                "Client {} tried to revoke access token {} of another client",
                client_id, access.id
            );
            return Ok(Outcome::Done);
        }

        self.access_tokens.revoke(access.id).await?;
        info!("Revoked access token {} for client {}", access.id, client_id);
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::testing::Engines;

    #[test]
    fn test_hint_parsing() {
        assert_eq!(
            TokenTypeHint::parse(Some("access_token")),
            Some(TokenTypeHint::AccessToken)
        );
        assert_eq!(
            TokenTypeHint::parse(Some("refresh_token")),
            Some(TokenTypeHint::RefreshToken)
        );
        assert_eq!(TokenTypeHint::parse(Some("id_token")), None);
        assert_eq!(TokenTypeHint::parse(None), None);
    }

    #[test]
    fn test_refresh_first_without_hint() {
        assert_eq!(
            TokenTypeHint::lookup_order(None),
            [TokenTypeHint::RefreshToken, TokenTypeHint::AccessToken]
        );
        assert_eq!(
            TokenTypeHint::lookup_order(Some(TokenTypeHint::AccessToken)),
            [TokenTypeHint::AccessToken, TokenTypeHint::RefreshToken]
        );
    }

    #[tokio::test]
    async fn test_refresh_revocation_cascades() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;
        let refresh_token = pair.refresh_token.unwrap();

        engines
            .revocation
            .revoke(&refresh_token, Some(TokenTypeHint::RefreshToken), "c1")
            .await
            .unwrap();

        let refresh = engines
            .refresh_tokens
            .find(&RefreshTokenQuery::by_token(&refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert!(refresh.revoked);
        let access = engines
            .access_tokens
            .find(&AccessTokenQuery::by_token(&pair.access_token))
            .await
            .unwrap()
            .unwrap();
        assert!(access.revoked);
    }

    #[tokio::test]
    async fn test_access_revocation_does_not_cascade() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;

        engines
            .revocation
            .revoke(&pair.access_token, Some(TokenTypeHint::AccessToken), "c1")
            .await
            .unwrap();

        let access = engines
            .access_tokens
            .find(&AccessTokenQuery::by_token(&pair.access_token))
            .await
            .unwrap()
            .unwrap();
        assert!(access.revoked);
        let refresh = engines
            .refresh_tokens
            .find(&RefreshTokenQuery::by_token(pair.refresh_token.unwrap()))
            .await
            .unwrap()
            .unwrap();
        assert!(!refresh.revoked);
    }

    #[tokio::test]
    async fn test_wrong_hint_still_finds_token() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;

        engines
            .revocation
            .revoke(&pair.access_token, Some(TokenTypeHint::RefreshToken), "c1")
            .await
            .unwrap();
        engines
            .revocation
            .revoke(&pair.access_token, None, "c1")
            .await
            .unwrap();

        let access = engines
            .access_tokens
            .find(&AccessTokenQuery::by_token(&pair.access_token))
            .await
            .unwrap()
            .unwrap();
        assert!(access.revoked);
    }

    #[tokio::test]
    async fn test_other_clients_token_is_untouched() {
        let engines = Engines::new().await;
        engines.add_client("c2").await;
        let pair = engines.code_pair("profile").await;
        let refresh_token = pair.refresh_token.unwrap();

        engines
            .revocation
            .revoke(&refresh_token, None, "c2")
            .await
            .unwrap();

        let refresh = engines
            .refresh_tokens
            .find(&RefreshTokenQuery::by_token(&refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert!(!refresh.revoked);
    }

    #[tokio::test]
    async fn test_unknown_token_is_a_no_op() {
        let engines = Engines::new().await;
        assert!(engines.revocation.revoke("nope", None, "c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_revoking_twice_is_fine() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;
        let refresh_token = pair.refresh_token.unwrap();

        for _ in 0..2 {
            engines
                .revocation
                .revoke(&refresh_token, None, "c1")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_lookup_falls_through_to_access() {
        let engines = Engines::new().await;
        let pair = engines.code_pair("profile").await;
        sqlx::query("DROP TABLE refresh_tokens")
            .execute(&engines.pool)
            .await
            .unwrap();

        engines
            .revocation
            .revoke(&pair.access_token, None, "c1")
            .await
            .unwrap();

        let access = engines
            .access_tokens
            .find(&AccessTokenQuery::by_token(&pair.access_token))
            .await
            .unwrap()
            .unwrap();
        assert!(access.revoked);
    }

    #[tokio::test]
    async fn test_failed_lookups_are_reported() {
        let engines = Engines::new().await;
        sqlx::query("DROP TABLE refresh_tokens")
            .execute(&engines.pool)
            .await
            .unwrap();

        let result = engines.revocation.revoke("nope", None, "c1").await;
        assert!(matches!(result, Err(OAuthError::SystemBusy(_))));
    }
}
