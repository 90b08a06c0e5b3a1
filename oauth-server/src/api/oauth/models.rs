//! OAuth 2.0 request structures.
//!
//! Every field is optional so that a missing parameter becomes an OAuth error
//! response instead of an extractor rejection.

use crate::errors::OAuthError;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Authorization request (RFC 6749 section 4.1.1)
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizationRequest {
    /// Must be "code"
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    /// Must exactly match a URI registered for the client
    pub redirect_uri: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
    /// Opaque value echoed back on the redirect
    pub state: Option<String>,
}

/// Token request (RFC 6749 sections 4.1.3, 4.4.2 and 6)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// "authorization_code", "refresh_token" or "client_credentials"
    pub grant_type: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI used in the authorization request (authorization_code grant)
    pub redirect_uri: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Requested scopes (client_credentials grant)
    pub scope: Option<String>,
    /// Client identifier, when not sent with Basic authentication
    pub client_id: Option<String>,
    /// Client secret, when not sent with Basic authentication
    pub client_secret: Option<String>,
}

/// Revocation request (RFC 7009 section 2.1)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevocationRequest {
    pub token: Option<String>,
    /// "access_token" or "refresh_token"; anything else is ignored
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Introspection request (RFC 7662 section 2.1)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IntrospectionRequest {
    pub token: Option<String>,
    /// Only access tokens are introspected, so the hint is logged and ignored
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Returns the parameter when present and non-empty
pub(super) fn required(value: &Option<String>, name: &str) -> Result<String, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

/// Empty form values count as absent
pub(super) fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_and_optional() {
        assert_eq!(required(&Some("x".to_string()), "code").unwrap(), "x");
        assert_eq!(
            required(&Some(String::new()), "code").unwrap_err(),
            OAuthError::InvalidRequest("code is required".to_string())
        );
        assert!(required(&None, "code").is_err());

        assert_eq!(optional(Some(String::new())), None);
        assert_eq!(optional(Some("profile".to_string())).as_deref(), Some("profile"));
    }
}
