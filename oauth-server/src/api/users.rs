//! User registration and the profile routes guarded by the authorization gate

use crate::auth::login::NewAccount;
use crate::auth::{
    authenticate, require_resource_owner, require_role, require_scopes, Authenticate,
    BearerPolicy, OwnerParam, RequiredRole, RequiredScopes, RoutePolicy,
};
use crate::errors::{ErrorResponse, OAuthError};
use crate::models::{User, ROLE_ADMIN};
use crate::openapi::USERS_TAG;
use crate::state::AppState;
use crate::store::UserQuery;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Scopes a bearer token needs to read a profile
const PROFILE_SCOPES: &[&str] = &["profile"];

/// Public profile of a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub subject: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            nickname: user.nickname,
            avatar: user.avatar,
            subject: user.subject,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

/// Registers a user with the `user` role
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Malformed request or username taken", body = ErrorResponse),
        (
            status = 500,
            description = "Another registration of this username is in progress",
            body = ErrorResponse
        )
    ),
    tag = USERS_TAG
)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserProfile>), OAuthError> {
    let Json(request) = payload.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;
    if request.username.is_empty() || request.password.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "username and password are required".to_string(),
        ));
    }

    let user = state
        .login
        .register(NewAccount {
            username: request.username,
            password: request.password,
            nickname: request.nickname,
            avatar: request.avatar,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User profile", body = UserProfile),
        (status = 401, description = "No bearer token or session", body = ErrorResponse),
        (
            status = 403,
            description = "Not the owner, or missing the profile scope",
            body = ErrorResponse
        ),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = USERS_TAG
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserProfile>, OAuthError> {
    let user = state
        .users
        .get(&UserQuery::by_id(user_id))
        .await?
        .ok_or_else(|| OAuthError::NotFound(format!("user {user_id} not found")))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (
            status = 500,
            description = "Another delete of this user is in progress",
            body = ErrorResponse
        )
    ),
    tag = USERS_TAG
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, OAuthError> {
    state.users.delete(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: &AppState) -> Router<AppState> {
    let reader = Authenticate::new(
        state.gate.clone(),
        RoutePolicy::bearer_or_session(BearerPolicy::USER),
    );
    let session = Authenticate::new(state.gate.clone(), RoutePolicy::SESSION);

    // layers run bottom-up
    let read = get(get_user)
        .route_layer(middleware::from_fn_with_state(
            RequiredScopes(PROFILE_SCOPES),
            require_scopes,
        ))
        .route_layer(middleware::from_fn_with_state(
            OwnerParam::Path("user_id"),
            require_resource_owner,
        ))
        .route_layer(middleware::from_fn_with_state(reader, authenticate));

    let delete = axum::routing::delete(delete_user)
        .route_layer(middleware::from_fn_with_state(
            RequiredRole(ROLE_ADMIN),
            require_role,
        ))
        .route_layer(middleware::from_fn_with_state(session, authenticate));

    Router::new()
        .route("/users", post(create_user))
        .route("/users/{user_id}", read.merge(delete))
}
