//! OAuth 2.0 HTTP surface.
//!
//! ## Endpoints
//! - `GET /oauth/authorize`: authorization code issuance for a logged-in user (RFC 6749 4.1)
//! - `POST /oauth/token`: authorization_code, refresh_token and client_credentials grants
//! - `POST /oauth/revoke`: token revocation (RFC 7009)
//! - `POST /oauth/introspect`: token introspection (RFC 7662)
//! - `GET /oauth/userinfo`: profile of the bearer token's user, requires the `profile` scope
//!
//! The token, revocation and introspection endpoints authenticate the client with
//! HTTP Basic or with `client_id`/`client_secret` form fields.

pub(crate) mod handlers;
pub(crate) mod models;

use crate::auth::{
    authenticate, require_scopes, Authenticate, BearerPolicy, RequiredScopes, RoutePolicy,
};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Scopes a bearer token needs for `/oauth/userinfo`
const USERINFO_SCOPES: &[&str] = &["profile"];

/// Creates OAuth 2.0 routes
pub fn router(state: &AppState) -> Router<AppState> {
    let session = Authenticate::new(state.gate.clone(), RoutePolicy::SESSION);
    let user_bearer = Authenticate::new(
        state.gate.clone(),
        RoutePolicy::bearer(BearerPolicy::USER),
    );

    Router::new()
        .route(
            "/oauth/authorize",
            get(handlers::authorize)
                .route_layer(middleware::from_fn_with_state(session, authenticate)),
        )
        .route("/oauth/token", post(handlers::token))
        .route("/oauth/revoke", post(handlers::revoke))
        .route("/oauth/introspect", post(handlers::introspect))
        .route(
            "/oauth/userinfo",
            get(handlers::userinfo)
                // layers run bottom-up: authenticate first, then check scopes
                .route_layer(middleware::from_fn_with_state(
                    RequiredScopes(USERINFO_SCOPES),
                    require_scopes,
                ))
                .route_layer(middleware::from_fn_with_state(user_bearer, authenticate)),
        )
}
