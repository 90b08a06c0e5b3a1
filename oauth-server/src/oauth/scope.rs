//! Space-delimited scope handling

use crate::errors::OAuthError;

/// Splits a scope string on spaces, skipping empty segments
pub fn scope_tokens(scope: &str) -> impl Iterator<Item = &str> {
    scope.split(' ').filter(|s| !s.is_empty())
}

/// Every requested token must be one of `allowed`. An empty request is always valid.
pub fn validate_scope(requested: &str, allowed: &[String]) -> Result<(), OAuthError> {
    for token in scope_tokens(requested) {
        if !allowed.iter().any(|a| a == token) {
            return Err(OAuthError::InvalidScope(format!(
                "scope '{token}' is not allowed for this client"
            )));
        }
    }
    Ok(())
}

/// True when every `required` scope appears in `granted`
pub fn has_scopes(granted: &str, required: &[&str]) -> bool {
    required
        .iter()
        .all(|r| scope_tokens(granted).any(|g| g == *r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["profile".to_string(), "email".to_string()]
    }

    #[test]
    fn test_subset_is_valid() {
        assert!(validate_scope("profile", &allowed()).is_ok());
        assert!(validate_scope("email profile", &allowed()).is_ok());
        assert!(validate_scope("profile  email", &allowed()).is_ok());
    }

    #[test]
    fn test_empty_scope_is_valid() {
        assert!(validate_scope("", &allowed()).is_ok());
        assert!(validate_scope("", &[]).is_ok());
    }

    #[test]
    fn test_scope_outside_allowed_set_is_rejected() {
        let err = validate_scope("profile admin", &allowed()).unwrap_err();
        assert_eq!(
            err,
            OAuthError::InvalidScope("scope 'admin' is not allowed for this client".to_string())
        );
    }

    #[test]
    fn test_has_scopes() {
        assert!(has_scopes("profile email", &["profile"]));
        assert!(has_scopes("profile email", &["email", "profile"]));
        assert!(has_scopes("profile", &[]));
        assert!(!has_scopes("profile", &["email"]));
        assert!(!has_scopes("", &["profile"]));
        // no prefix matching
        assert!(!has_scopes("profiles", &["profile"]));
    }
}
