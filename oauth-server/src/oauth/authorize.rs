//! Authorization code issuance and single-use redemption.

use super::generate_secure_token;
use super::scope::validate_scope;
use crate::errors::OAuthError;
use crate::models::{now_ts, AuthorizationCode, OAuthClient};
use crate::store::{
    AuthorizationCodeRepository, ClientLookup, ClientQuery, CodeQuery, NewAuthorizationCode,
};
use log::info;
use sqlx::SqliteConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthorizationCodeIssuer {
    codes: AuthorizationCodeRepository,
    clients: Arc<dyn ClientLookup>,
}

impl AuthorizationCodeIssuer {
    pub fn new(codes: AuthorizationCodeRepository, clients: Arc<dyn ClientLookup>) -> Self {
        Self { codes, clients }
    }

    /// Looks up an active client and checks `redirect_uri` against its registered
    /// URIs. Until this succeeds the redirect URI must not be trusted.
    pub async fn resolve_client(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<OAuthClient, OAuthError> {
        let client = self
            .clients
            .find_client(&ClientQuery::by_id(client_id))
            .await?
            .filter(OAuthClient::is_active)
            .ok_or_else(|| OAuthError::NotFound(format!("client '{client_id}' not found")))?;

        if !client.has_redirect_uri(redirect_uri) {
            return Err(OAuthError::InvalidRedirectUri(
                "redirect_uri is not registered for this client".to_string(),
            ));
        }
        Ok(client)
    }

    /// Issues a code for an already resolved client. Scope is checked before
    /// anything is persisted.
    pub async fn issue(
        &self,
        client: &OAuthClient,
        user_id: i64,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<AuthorizationCode, OAuthError> {
        validate_scope(scope, &client.scopes)?;

        let code = self
            .codes
            .create(&NewAuthorizationCode {
                code: generate_secure_token(),
                user_id,
                client_id: client.id.clone(),
                redirect_uri: redirect_uri.to_string(),
                scope: scope.to_string(),
                expires_at: now_ts() + client.auth_code_expire,
            })
            .await?;

        info!(
            "Issued authorization code {} for client {}",
            code.id, client.id
        );
        Ok(code)
    }

    /// Resolves the client and issues a code in one step
    pub async fn generate_code(
        &self,
        user_id: i64,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<AuthorizationCode, OAuthError> {
        let client = self.resolve_client(client_id, redirect_uri).await?;
        self.issue(&client, user_id, redirect_uri, scope).await
    }

    pub async fn get_code(
        &self,
        query: &CodeQuery,
    ) -> Result<Option<AuthorizationCode>, OAuthError> {
        Ok(self.codes.find(query).await?)
    }

    /// Marks a code used on its own. Token issuance must go through
    /// [`AuthorizationCodeIssuer::mark_used_in_tx`] instead.
    pub async fn mark_used(&self, id: i64) -> Result<bool, OAuthError> {
        Ok(self.codes.mark_used(id).await?)
    }

    /// Conditional redemption inside the issuing transaction. `false` means
    /// another request already redeemed the code.
    pub async fn mark_used_in_tx(conn: &mut SqliteConnection, id: i64) -> Result<bool, OAuthError> {
        Ok(AuthorizationCodeRepository::mark_used_in_tx(conn, id).await?)
    }
}
