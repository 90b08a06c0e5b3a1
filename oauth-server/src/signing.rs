//! Per-client token signing.
//!
//! Every client signs its access and refresh tokens with its own secrets and
//! lifetimes, so a leaked secret only exposes that client's tokens. Contexts are
//! built by [`SigningContexts::for_client`] and memoized per client id.

use crate::models::OAuthClient;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use moka::future::Cache as MokaCache;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Failed to sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("Token failed verification: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("Expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    /// User id, or the client id for tokens a client holds for itself
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub scope: String,
    pub typ: TokenKind,
}

/// A freshly signed token and its absolute expiry
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: i64,
}

pub struct SigningContext {
    kind: TokenKind,
    issuer: String,
    ttl: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningContext {
    fn new(kind: TokenKind, issuer: &str, secret: &str, ttl: i64) -> Self {
        Self {
            kind,
            issuer: issuer.to_string(),
            ttl,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Lifetime in seconds of tokens minted by this context
    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    pub fn mint(
        &self,
        client_id: &str,
        subject: &str,
        scope: &str,
        now: i64,
    ) -> Result<MintedToken, SigningError> {
        let expires_at = now + self.ttl;
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: client_id.to_string(),
            iat: now,
            exp: expires_at,
            jti: new_token_id(),
            scope: scope.to_string(),
            typ: self.kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(SigningError::Encode)?;
        Ok(MintedToken { token, expires_at })
    }

    /// Checks signature, issuer, audience, expiry and token kind
    pub fn verify(&self, token: &str, client_id: &str) -> Result<TokenClaims, SigningError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[client_id]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(SigningError::Invalid)?
            .claims;
        if claims.typ != self.kind {
            return Err(SigningError::WrongKind {
                expected: self.kind,
            });
        }
        Ok(claims)
    }
}

/// Identifies the client record a context was built from. `updated_at` alone
/// has one-second resolution, so the secrets are part of it too.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContextVersion {
    updated_at: i64,
    secrets_digest: Vec<u8>,
}

impl ContextVersion {
    fn of(client: &OAuthClient) -> Self {
        let mut hasher = Sha256::new();
        for secret in [&client.access_token_secret, &client.refresh_token_secret] {
            hasher.update((secret.len() as u64).to_be_bytes());
            hasher.update(secret.as_bytes());
        }
        Self {
            updated_at: client.updated_at,
            secrets_digest: hasher.finalize().to_vec(),
        }
    }
}

/// Access and refresh signing contexts for one client
pub struct ClientSigningContext {
    version: ContextVersion,
    pub access: SigningContext,
    pub refresh: SigningContext,
}

impl ClientSigningContext {
    pub fn new(issuer: &str, client: &OAuthClient) -> Self {
        // a refresh token never expires before the access token minted with it
        let refresh_ttl = client.refresh_token_expire.max(client.access_token_expire);
        Self {
            version: ContextVersion::of(client),
            access: SigningContext::new(
                TokenKind::Access,
                issuer,
                &client.access_token_secret,
                client.access_token_expire,
            ),
            refresh: SigningContext::new(
                TokenKind::Refresh,
                issuer,
                &client.refresh_token_secret,
                refresh_ttl,
            ),
        }
    }
}

/// Memoizing factory for [`ClientSigningContext`]
#[derive(Clone)]
pub struct SigningContexts {
    issuer: Arc<str>,
    memo: MokaCache<String, Arc<ClientSigningContext>>,
}

impl SigningContexts {
    pub fn new(issuer: &str, capacity: u64) -> Self {
        Self {
            issuer: Arc::from(issuer),
            memo: MokaCache::new(capacity),
        }
    }

    /// Returns the context for `client`, rebuilding it when the client record changed
    pub async fn for_client(&self, client: &OAuthClient) -> Arc<ClientSigningContext> {
        if let Some(context) = self.memo.get(&client.id).await {
            if context.version == ContextVersion::of(client) {
                return context;
            }
        }

        let context = Arc::new(ClientSigningContext::new(&self.issuer, client));
        self.memo.insert(client.id.clone(), context.clone()).await;
        context
    }

    /// Drops the memoized context, called whenever the client's secrets change
    pub async fn invalidate(&self, client_id: &str) {
        self.memo.invalidate(client_id).await;
    }
}

fn new_token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
