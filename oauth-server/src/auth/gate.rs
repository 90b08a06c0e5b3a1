//! Principal resolution and per-route authorization policy.
//!
//! [`authenticate`] resolves the caller from a bearer token or, when there is
//! none, from the session cookie, and stores the [`Principal`] in the request
//! extensions. The `require_*` layers run after it and only read that value.

use super::principal::{Principal, PrincipalKind};
use super::session::SessionManager;
use crate::errors::OAuthError;
use crate::models::now_ts;
use crate::signing::SigningContexts;
use crate::store::{AccessTokenQuery, AccessTokenRepository, ClientLookup, ClientQuery};
use axum::extract::{FromRequestParts, RawPathParams, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::debug;
use std::sync::Arc;

/// Which bearer principals a route admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerPolicy {
    pub allow_user: bool,
    pub allow_client: bool,
}

impl BearerPolicy {
    pub const USER: Self = Self {
        allow_user: true,
        allow_client: false,
    };
    pub const CLIENT: Self = Self {
        allow_user: false,
        allow_client: true,
    };
    pub const ANY: Self = Self {
        allow_user: true,
        allow_client: true,
    };

    fn permits(&self, kind: PrincipalKind) -> bool {
        match kind {
            PrincipalKind::User => self.allow_user,
            PrincipalKind::Client => self.allow_client,
        }
    }
}

/// Credentials a route accepts. `bearer: None` ignores the Authorization header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub bearer: Option<BearerPolicy>,
    pub session: bool,
}

impl RoutePolicy {
    pub const SESSION: Self = Self {
        bearer: None,
        session: true,
    };

    pub const fn bearer(policy: BearerPolicy) -> Self {
        Self {
            bearer: Some(policy),
            session: false,
        }
    }

    pub const fn bearer_or_session(policy: BearerPolicy) -> Self {
        Self {
            bearer: Some(policy),
            session: true,
        }
    }
}

#[derive(Clone)]
pub struct Gate {
    access_tokens: AccessTokenRepository,
    clients: Arc<dyn ClientLookup>,
    signing: SigningContexts,
    sessions: SessionManager,
}

impl Gate {
    pub fn new(
        access_tokens: AccessTokenRepository,
        clients: Arc<dyn ClientLookup>,
        signing: SigningContexts,
        sessions: SessionManager,
    ) -> Self {
        Self {
            access_tokens,
            clients,
            signing,
            sessions,
        }
    }

    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        jar: &CookieJar,
        policy: RoutePolicy,
    ) -> Result<Principal, OAuthError> {
        if let Some(bearer) = policy.bearer {
            if let Some(token) = bearer_token(headers) {
                return self.resolve_bearer(token, bearer).await;
            }
        }
        if policy.session {
            return self.resolve_session(jar);
        }
        Err(OAuthError::Unauthorized(
            "a bearer token is required".to_string(),
        ))
    }

    async fn resolve_bearer(
        &self,
        token: &str,
        policy: BearerPolicy,
    ) -> Result<Principal, OAuthError> {
        let stored = self
            .access_tokens
            .find(&AccessTokenQuery::by_token(token))
            .await?
            .ok_or_else(|| OAuthError::Unauthorized("access token is invalid".to_string()))?;
        if stored.revoked {
            return Err(OAuthError::Unauthorized(
                "access token has been revoked".to_string(),
            ));
        }
        if stored.is_expired(now_ts()) {
            return Err(OAuthError::Unauthorized(
                "access token has expired".to_string(),
            ));
        }

        let client = self
            .clients
            .find_client(&ClientQuery::by_id(&stored.client_id))
            .await?
            .filter(|client| client.is_active())
            .ok_or_else(|| OAuthError::Unauthorized("access token is invalid".to_string()))?;
        let context = self.signing.for_client(&client).await;
        if let Err(e) = context.access.verify(token, &client.id) {
            debug!("Access token {} failed verification: {}", stored.id, e);
            return Err(OAuthError::Unauthorized(
                "access token is invalid".to_string(),
            ));
        }

        let principal = Principal::bearer(&stored);
        if !policy.permits(principal.kind) {
            return Err(OAuthError::Forbidden(match principal.kind {
                PrincipalKind::User => "user tokens are not accepted here".to_string(),
                PrincipalKind::Client => "client tokens are not accepted here".to_string(),
            }));
        }
        Ok(principal)
    }

    fn resolve_session(&self, jar: &CookieJar) -> Result<Principal, OAuthError> {
        let cookie = jar
            .get(self.sessions.cookie_name())
            .ok_or_else(|| OAuthError::Unauthorized("login required".to_string()))?;
        let claims = self.sessions.verify(cookie.value()).map_err(|e| {
            debug!("Rejected session cookie: {}", e);
            OAuthError::Unauthorized("session is invalid or expired".to_string())
        })?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| OAuthError::Unauthorized("session is invalid or expired".to_string()))?;
        Ok(Principal::session(user_id, claims.role))
    }
}

/// Token of an `Authorization: Bearer` header. Other schemes count as absent.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn principal_of(request: &Request) -> Result<Principal, OAuthError> {
    request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| OAuthError::Unauthorized("login required".to_string()))
}

/// State of the [`authenticate`] layer
#[derive(Clone)]
pub struct Authenticate {
    gate: Gate,
    policy: RoutePolicy,
}

impl Authenticate {
    pub fn new(gate: Gate, policy: RoutePolicy) -> Self {
        Self { gate, policy }
    }
}

pub async fn authenticate(
    State(auth): State<Authenticate>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, OAuthError> {
    let principal = auth
        .gate
        .resolve(request.headers(), &jar, auth.policy)
        .await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

#[derive(Debug, Clone, Copy)]
pub struct RequiredRole(pub &'static str);

pub async fn require_role(
    State(RequiredRole(role)): State<RequiredRole>,
    request: Request,
    next: Next,
) -> Result<Response, OAuthError> {
    if !principal_of(&request)?.has_role(role) {
        return Err(OAuthError::Forbidden(format!("the {role} role is required")));
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Clone, Copy)]
pub struct RequiredScopes(pub &'static [&'static str]);

pub async fn require_scopes(
    State(RequiredScopes(scopes)): State<RequiredScopes>,
    request: Request,
    next: Next,
) -> Result<Response, OAuthError> {
    if !principal_of(&request)?.has_scopes(scopes) {
        return Err(OAuthError::Forbidden(format!(
            "insufficient scope, required: {}",
            scopes.join(" ")
        )));
    }
    Ok(next.run(request).await)
}

/// Where the target user id of a request lives
#[derive(Debug, Clone, Copy)]
pub enum OwnerParam {
    Path(&'static str),
    #[allow(dead_code)]
    Query(&'static str),
}

/// Only the targeted user, an admin or a client principal may pass
pub async fn require_resource_owner(
    State(param): State<OwnerParam>,
    request: Request,
    next: Next,
) -> Result<Response, OAuthError> {
    let principal = principal_of(&request)?;
    let (mut parts, body) = request.into_parts();

    let (name, raw) = match param {
        OwnerParam::Path(name) => {
            let raw = RawPathParams::from_request_parts(&mut parts, &())
                .await
                .ok()
                .and_then(|params| {
                    params
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| value.to_string())
                });
            (name, raw)
        }
        OwnerParam::Query(name) => {
            let raw = parts.uri.query().and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.into_owned())
            });
            (name, raw)
        }
    };

    let target: i64 = raw
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} must be a user id")))?;
    if !principal.may_act_for(target) {
        return Err(OAuthError::Forbidden(
            "you may only access your own resources".to_string(),
        ));
    }
    Ok(next.run(Request::from_parts(parts, body)).await)
}
