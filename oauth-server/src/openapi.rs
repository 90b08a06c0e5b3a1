use crate::api::{auth, health, oauth, users};
use crate::state::AppState;
use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

pub(crate) const AUTH_TAG: &str = "Auth API";
pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0";
pub(crate) const USERS_TAG: &str = "Users API";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::handlers::health_check,
        health::handlers::ready_check,
        auth::login,
        auth::logout,
        oauth::handlers::authorize,
        oauth::handlers::token,
        oauth::handlers::revoke,
        oauth::handlers::introspect,
        oauth::handlers::userinfo,
        users::create_user,
        users::get_user,
        users::delete_user,
    ),
    tags(
        (name = HEALTH_TAG, description = "Liveness and readiness checks"),
        (name = AUTH_TAG, description = "Login and logout for the session cookie"),
        (
            name = OAUTH_TAG,
            description = "Authorization, token, revocation and introspection endpoints"
        ),
        (name = USERS_TAG, description = "User profiles"),
    ),
    info(
        title = "OAuth 2.0 Authorization Server",
        description = "Authorization codes, token rotation, revocation and introspection",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

/// Serves the generated document at `/openapi.json`
pub(crate) fn router(doc: utoipa::openapi::OpenApi) -> Router<AppState> {
    Router::new().route(
        "/openapi.json",
        get(move || {
            let doc = doc.clone();
            async move { Json(doc) }
        }),
    )
}
