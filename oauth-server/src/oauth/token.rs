//! Token exchange for the authorization_code, refresh_token and
//! client_credentials grants.
//!
//! Code redemption and refresh rotation each run as one transaction: the code
//! is consumed (or the old refresh token revoked) together with inserting the
//! new pair, or nothing happens at all.

use super::authorize::AuthorizationCodeIssuer;
use super::client_auth::authenticate_client;
use super::scope::validate_scope;
use crate::errors::OAuthError;
use crate::models::{now_ts, GrantType, OAuthClient, User, TOKEN_TYPE_BEARER};
use crate::signing::{MintedToken, SigningContexts};
use crate::store::{
    AccessTokenRepository, ClientLookup, CodeQuery, NewAccessToken, NewRefreshToken,
    RefreshTokenQuery, RefreshTokenRepository, StoreError, UserLookup, UserQuery,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use utoipa::ToSchema;

/// A parsed grant, already checked for required parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Grant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
    ClientCredentials { scope: Option<String> },
}

impl Grant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Self::RefreshToken { .. } => GrantType::RefreshToken,
            Self::ClientCredentials { .. } => GrantType::ClientCredentials,
        }
    }
}

/// Successful token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<i64>,
    pub scope: String,
}

impl TokenResponse {
    fn new(access: MintedToken, refresh: Option<MintedToken>, scope: String, now: i64) -> Self {
        Self {
            access_token: access.token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: access.expires_at - now,
            refresh_token_expires_in: refresh.as_ref().map(|r| r.expires_at - now),
            refresh_token: refresh.map(|r| r.token),
            scope,
        }
    }
}

fn invalid_grant(detail: &str) -> OAuthError {
    OAuthError::InvalidGrant(detail.to_string())
}

#[derive(Clone)]
pub struct TokenService {
    pool: SqlitePool,
    issuer: AuthorizationCodeIssuer,
    clients: Arc<dyn ClientLookup>,
    users: Arc<dyn UserLookup>,
    access_tokens: AccessTokenRepository,
    refresh_tokens: RefreshTokenRepository,
    signing: SigningContexts,
}

impl TokenService {
    pub fn new(
        pool: SqlitePool,
        issuer: AuthorizationCodeIssuer,
        clients: Arc<dyn ClientLookup>,
        users: Arc<dyn UserLookup>,
        signing: SigningContexts,
    ) -> Self {
        Self {
            access_tokens: AccessTokenRepository::new(pool.clone()),
            refresh_tokens: RefreshTokenRepository::new(pool.clone()),
            pool,
            issuer,
            clients,
            users,
            signing,
        }
    }

    /// Authenticates the client, checks it may use the grant, then runs it
    pub async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
        grant: Grant,
    ) -> Result<TokenResponse, OAuthError> {
        let client = authenticate_client(self.clients.as_ref(), client_id, client_secret).await?;

        let grant_type = grant.grant_type();
        if !client.supports_grant(grant_type) {
            return Err(OAuthError::UnsupportedGrantType(format!(
                "client is not allowed to use the {grant_type} grant"
            )));
        }

        match grant {
            Grant::AuthorizationCode { code, redirect_uri } => {
                self.redeem_code(&client, &code, &redirect_uri).await
            }
            Grant::RefreshToken { refresh_token } => self.rotate(&client, &refresh_token).await,
            Grant::ClientCredentials { scope } => self.client_credentials(&client, scope).await,
        }
    }

    async fn redeem_code(
        &self,
        client: &OAuthClient,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let now = now_ts();
        let code = self
            .issuer
            .get_code(&CodeQuery::by_code(code))
            .await?
            .ok_or_else(|| invalid_grant("authorization code is invalid"))?;

        if code.client_id != client.id {
            return Err(invalid_grant("authorization code is invalid"));
        }
        if code.redirect_uri != redirect_uri {
            return Err(invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }
        if code.used {
            return Err(invalid_grant("authorization code has already been used"));
        }
        if code.is_expired(now) {
            return Err(invalid_grant("authorization code has expired"));
        }

        let user = self.resolve_user(code.user_id).await?;
        let subject = user.id.to_string();
        let context = self.signing.for_client(client).await;
        let access = context.access.mint(&client.id, &subject, &code.scope, now)?;
        let refresh = context.refresh.mint(&client.id, &subject, &code.scope, now)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if !AuthorizationCodeIssuer::mark_used_in_tx(&mut tx, code.id).await? {
            debug!("Authorization code {} lost a concurrent redemption", code.id);
            return Err(invalid_grant("authorization code has already been used"));
        }
        let access_row = AccessTokenRepository::create_in_tx(
            &mut tx,
            &NewAccessToken {
                token: access.token.clone(),
                user_id: Some(user.id),
                client_id: client.id.clone(),
                scope: code.scope.clone(),
                expires_at: access.expires_at,
            },
        )
        .await?;
        RefreshTokenRepository::create_in_tx(
            &mut tx,
            &NewRefreshToken {
                token: refresh.token.clone(),
                access_token_id: access_row.id,
                user_id: user.id,
                client_id: client.id.clone(),
                scope: code.scope.clone(),
                expires_at: refresh.expires_at,
            },
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(
            "Redeemed authorization code {} for client {}, access token {}",
            code.id, client.id, access_row.id
        );
        Ok(TokenResponse::new(access, Some(refresh), code.scope, now))
    }

    async fn rotate(
        &self,
        client: &OAuthClient,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let now = now_ts();
        let stored = self
            .refresh_tokens
            .find(&RefreshTokenQuery::by_token(refresh_token))
            .await?
            .ok_or_else(|| invalid_grant("refresh token is invalid"))?;

        if stored.client_id != client.id {
            return Err(invalid_grant("refresh token is invalid"));
        }
        if stored.revoked {
            return Err(invalid_grant("refresh token has been revoked"));
        }
        if stored.is_expired(now) {
            return Err(invalid_grant("refresh token has expired"));
        }

        let context = self.signing.for_client(client).await;
        if let Err(e) = context.refresh.verify(refresh_token, &client.id) {
            debug!("Refresh token {} failed verification: {}", stored.id, e);
            return Err(invalid_grant("refresh token is invalid"));
        }

        let user = self.resolve_user(stored.user_id).await?;
        let subject = user.id.to_string();
        let access = context.access.mint(&client.id, &subject, &stored.scope, now)?;
        let refresh = context.refresh.mint(&client.id, &subject, &stored.scope, now)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if !RefreshTokenRepository::revoke_in_tx(&mut tx, stored.id).await? {
            debug!("Refresh token {} lost a concurrent rotation", stored.id);
            return Err(invalid_grant("refresh token has been revoked"));
        }
        let access_row = AccessTokenRepository::create_in_tx(
            &mut tx,
            &NewAccessToken {
                token: access.token.clone(),
                user_id: Some(user.id),
                client_id: client.id.clone(),
                scope: stored.scope.clone(),
                expires_at: access.expires_at,
            },
        )
        .await?;
        let refresh_row = RefreshTokenRepository::create_in_tx(
            &mut tx,
            &NewRefreshToken {
                token: refresh.token.clone(),
                access_token_id: access_row.id,
                user_id: user.id,
                client_id: client.id.clone(),
                scope: stored.scope.clone(),
                expires_at: refresh.expires_at,
            },
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(
            "Rotated refresh token {} to {} for client {}",
            stored.id, refresh_row.id, client.id
        );
        Ok(TokenResponse::new(access, Some(refresh), stored.scope, now))
    }

    /// Access token for the client itself. No user, no refresh token.
    async fn client_credentials(
        &self,
        client: &OAuthClient,
        scope: Option<String>,
    ) -> Result<TokenResponse, OAuthError> {
        let now = now_ts();
        let scope = scope.unwrap_or_else(|| client.scopes.join(" "));
        validate_scope(&scope, &client.scopes)?;

        let context = self.signing.for_client(client).await;
        let access = context.access.mint(&client.id, &client.id, &scope, now)?;
        let row = self
            .access_tokens
            .create(&NewAccessToken {
                token: access.token.clone(),
                user_id: None,
                client_id: client.id.clone(),
                scope: scope.clone(),
                expires_at: access.expires_at,
            })
            .await?;

        info!("Issued client token {} for client {}", row.id, client.id);
        Ok(TokenResponse::new(access, None, scope, now))
    }

    async fn resolve_user(&self, user_id: i64) -> Result<User, OAuthError> {
        self.users
            .find_user(&UserQuery::by_id(user_id))
            .await?
            .ok_or_else(|| invalid_grant("the user for this grant no longer exists"))
    }
}
