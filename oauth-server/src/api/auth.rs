//! Login and logout for the cookie session used by `/oauth/authorize`

use crate::api::users::UserProfile;
use crate::auth::{authenticate, Authenticate, RoutePolicy};
use crate::errors::{ErrorResponse, OAuthError};
use crate::headers::credentials_response;
use crate::openapi::AUTH_TAG;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserProfile,
    /// Seconds until the session expires
    pub expires_in: i64,
}

/// Logs a user in and sets the session cookie
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = LoginResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Invalid username or password", body = ErrorResponse),
        (status = 403, description = "The account is disabled", body = ErrorResponse)
    ),
    tag = AUTH_TAG
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, OAuthError> {
    let Json(request) = payload.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;
    if request.username.is_empty() || request.password.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "username and password are required".to_string(),
        ));
    }

    let login = state
        .login
        .login(&request.username, &request.password)
        .await?;

    let cookie = Cookie::build((state.sessions.cookie_name().to_string(), login.session))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    let body = LoginResponse {
        user: login.user.into(),
        expires_in: login.expires_in,
    };

    let mut response = (jar.add(cookie), Json(body)).into_response();
    credentials_response().apply(&mut response);
    Ok(response)
}

/// Clears the session cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out, session cookie cleared"),
        (status = 401, description = "No valid login session", body = ErrorResponse)
    ),
    tag = AUTH_TAG
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    let mut cookie = Cookie::build((state.sessions.cookie_name().to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    cookie.make_removal();
    (jar.add(cookie), StatusCode::NO_CONTENT)
}

pub fn router(state: &AppState) -> Router<AppState> {
    let session = Authenticate::new(state.gate.clone(), RoutePolicy::SESSION);

    Router::new()
        .route("/auth/login", post(login))
        .route(
            "/auth/logout",
            post(logout).route_layer(middleware::from_fn_with_state(session, authenticate)),
        )
}
