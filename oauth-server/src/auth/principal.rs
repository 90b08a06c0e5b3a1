use crate::models::{AccessToken, ROLE_ADMIN};
use crate::oauth::scope::has_scopes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Client,
}

/// The caller of one request, resolved by the gate and stored in the request
/// extensions for the handlers and the policy layers after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub user_id: Option<i64>,
    pub client_id: Option<String>,
    /// `None` for cookie sessions, which have no scope concept
    pub scope: Option<String>,
    /// Only cookie sessions carry a role
    pub role: Option<String>,
}

impl Principal {
    pub fn session(user_id: i64, role: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::User,
            user_id: Some(user_id),
            client_id: None,
            scope: None,
            role: Some(role.into()),
        }
    }

    /// Bearer principal for a stored access token. Tokens without an owner
    /// belong to the client itself.
    pub fn bearer(token: &AccessToken) -> Self {
        let kind = match token.owner() {
            Some(_) => PrincipalKind::User,
            None => PrincipalKind::Client,
        };
        Self {
            kind,
            user_id: token.owner(),
            client_id: Some(token.client_id.clone()),
            scope: Some(token.scope.clone()),
            role: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    pub fn has_scopes(&self, required: &[&str]) -> bool {
        match &self.scope {
            Some(scope) => has_scopes(scope, required),
            None => true,
        }
    }

    /// Admins and clients may act on any user
    pub fn may_act_for(&self, user_id: i64) -> bool {
        self.is_admin() || self.kind == PrincipalKind::Client || self.user_id == Some(user_id)
    }
}
