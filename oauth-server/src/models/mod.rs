//! Persisted entities shared by the stores and the OAuth engines.
//!
//! Timestamps are unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role granted to administrators
pub const ROLE_ADMIN: &str = "admin";
/// Role given to newly created users
pub const ROLE_USER: &str = "user";
/// Token type written into every access token row and token response
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Current time as unix seconds
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AuthorizationCode {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub expires_at: i64,
    pub used: bool,
    pub created_at: i64,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AccessToken {
    pub id: i64,
    pub token: String,
    pub token_type: String,
    /// `None` when the token was issued to a client acting for itself
    pub user_id: Option<i64>,
    pub client_id: String,
    pub scope: String,
    pub expires_at: i64,
    pub revoked: bool,
    pub created_at: i64,
}

impl AccessToken {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// The user this token acts for, if any
    pub fn owner(&self) -> Option<i64> {
        self.user_id.filter(|id| *id > 0)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub token: String,
    /// Access token minted together with this one; used for cascading revocation
    pub access_token_id: i64,
    pub user_id: i64,
    pub client_id: String,
    pub scope: String,
    pub expires_at: i64,
    pub revoked: bool,
    pub created_at: i64,
}

impl RefreshToken {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum ClientStatus {
    Disabled,
    Active,
}

impl From<i64> for ClientStatus {
    fn from(value: i64) -> Self {
        if value == 1 {
            Self::Active
        } else {
            Self::Disabled
        }
    }
}

impl From<ClientStatus> for i64 {
    fn from(status: ClientStatus) -> Self {
        match status {
            ClientStatus::Active => 1,
            ClientStatus::Disabled => 0,
        }
    }
}

/// A registered OAuth client. Each client carries its own signing secrets and TTLs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: String,
    pub secret: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub scopes: Vec<String>,
    /// Authorization code lifetime in seconds
    pub auth_code_expire: i64,
    /// Access token lifetime in seconds
    pub access_token_expire: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_expire: i64,
    pub name: String,
    pub description: String,
    pub logo: String,
    pub status: ClientStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OAuthClient {
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }

    pub fn supports_grant(&self, grant: GrantType) -> bool {
        self.grant_types.iter().any(|g| g == grant.as_str())
    }

    /// Exact string match against the registered redirect URIs
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("redirect_uris", &self.redirect_uris)
            .field("grant_types", &self.grant_types)
            .field("scopes", &self.scopes)
            .field("status", &self.status)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub role: String,
    pub status: i64,
    /// Stable public identifier exposed to clients instead of the row id
    pub subject: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Status 0 marks a disabled account
    pub fn is_active(&self) -> bool {
        self.status != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "refresh_token" => Ok(Self::RefreshToken),
            "client_credentials" => Ok(Self::ClientCredentials),
            other => Err(format!("unsupported grant type: {other}")),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient {
            id: "c1".to_string(),
            secret: "s3cret".to_string(),
            access_token_secret: "a".to_string(),
            refresh_token_secret: "r".to_string(),
            redirect_uris: vec!["https://app/cb".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            scopes: vec!["profile".to_string()],
            auth_code_expire: 300,
            access_token_expire: 3600,
            refresh_token_expire: 86400,
            name: "App".to_string(),
            description: String::new(),
            logo: String::new(),
            status: ClientStatus::Active,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_redirect_uri_is_exact_match() {
        let client = client();
        assert!(client.has_redirect_uri("https://app/cb"));
        assert!(!client.has_redirect_uri("https://app/cb/"));
        assert!(!client.has_redirect_uri("https://app/cb?x=1"));
        assert!(!client.has_redirect_uri("https://app/c"));
    }

    #[test]
    fn test_supports_grant() {
        let client = client();
        assert!(client.supports_grant(GrantType::AuthorizationCode));
        assert!(!client.supports_grant(GrantType::RefreshToken));
    }

    #[test]
    fn test_client_debug_hides_secrets() {
        let rendered = format!("{:?}", client());
        assert!(rendered.contains("c1"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_client_status_round_trips_through_cache_json() {
        let json = serde_json::to_string(&client()).unwrap();
        assert!(json.contains("\"status\":1"));
        let back: OAuthClient = serde_json::from_str(&json).unwrap();
        assert!(back.is_active());
    }

    #[test]
    fn test_grant_type_parse() {
        assert_eq!(
            "refresh_token".parse::<GrantType>(),
            Ok(GrantType::RefreshToken)
        );
        assert!("password".parse::<GrantType>().is_err());
    }

    #[test]
    fn test_access_token_owner() {
        let mut token = AccessToken {
            id: 1,
            token: "t".to_string(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            user_id: Some(42),
            client_id: "c1".to_string(),
            scope: String::new(),
            expires_at: 10,
            revoked: false,
            created_at: 0,
        };
        assert_eq!(token.owner(), Some(42));
        token.user_id = Some(0);
        assert_eq!(token.owner(), None);
        token.user_id = None;
        assert_eq!(token.owner(), None);
        assert!(token.is_expired(10));
        assert!(!token.is_expired(9));
    }
}
