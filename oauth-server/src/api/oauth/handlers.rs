//! OAuth 2.0 endpoint handlers

use crate::api::oauth::models::{
    optional, required, AuthorizationRequest, IntrospectionRequest, RevocationRequest,
    TokenRequest,
};
use crate::auth::Principal;
use crate::errors::{ErrorResponse, OAuthError};
use crate::headers::{credentials_response, private_response, BasicCredentials};
use crate::models::{GrantType, OAuthClient};
use crate::oauth::client_auth::authenticate_client;
use crate::oauth::introspect::IntrospectionResponse;
use crate::oauth::revoke::TokenTypeHint;
use crate::oauth::token::{Grant, TokenResponse};
use crate::oauth::userinfo::{userinfo as resolve_userinfo, UserInfo};
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Form, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use log::{debug, error, info, warn};
use url::Url;

/// OAuth 2.0 Authorization endpoint (RFC 6749 Section 4.1.1)
///
/// Requires a logged-in user session. Until the client and its redirect URI are
/// verified, errors go to the frontend error page instead of `redirect_uri`.
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    params(AuthorizationRequest),
    responses(
        (status = 303, description = "Redirect to redirect_uri with a code, or with an error"),
        (status = 401, description = "No valid login session", body = ErrorResponse)
    ),
    tag = OAUTH_TAG
)]
pub async fn authorize(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Response {
    let error_page = state.settings.oauth.error_page_url();
    let request = match query {
        Ok(Query(request)) => request,
        Err(rejection) => {
            let err = OAuthError::InvalidRequest(rejection.body_text());
            return redirect_with_error(&error_page, &err, None);
        }
    };

    let (client, redirect_uri) = match resolve_request(&state, &request).await {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!("Rejected authorization request: {}", err);
            return redirect_with_error(&error_page, &err, None);
        }
    };

    let Some(user_id) = principal.user_id else {
        return OAuthError::Forbidden("a user session is required".to_string()).into_response();
    };
    let scope = request.scope.as_deref().unwrap_or_default();
    let client_state = request.state.as_deref();

    match state.issuer.issue(&client, user_id, &redirect_uri, scope).await {
        Ok(code) => {
            info!(
                "Issued authorization code {} for user {} and client {}",
                code.id, user_id, client.id
            );
            redirect_with(&redirect_uri, &[("code", &code.code)], client_state)
        }
        Err(err) => {
            warn!("Authorization for client {} failed: {}", client.id, err);
            redirect_with_error(&redirect_uri, &err, client_state)
        }
    }
}

/// Checks the parameters that decide whether `redirect_uri` can be trusted
async fn resolve_request(
    state: &AppState,
    request: &AuthorizationRequest,
) -> Result<(OAuthClient, String), OAuthError> {
    if request.response_type.as_deref() != Some("code") {
        return Err(OAuthError::InvalidRequest(
            "response_type must be 'code'".to_string(),
        ));
    }
    let client_id = required(&request.client_id, "client_id")?;
    let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;
    let client = state
        .issuer
        .resolve_client(&client_id, &redirect_uri)
        .await?;
    Ok((client, redirect_uri))
}

/// Redirects to `base` with `params` (and `state`, when given) appended to its query
fn redirect_with(base: &str, params: &[(&str, &str)], state: Option<&str>) -> Response {
    let mut url = match Url::parse(base) {
        Ok(url) => url,
        Err(e) => {
            error!("Cannot redirect to '{}': {}", base, e);
            return OAuthError::SystemBusy(format!("invalid redirect target: {e}")).into_response();
        }
    };

    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, value);
        }
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    Redirect::to(url.as_str()).into_response()
}

fn redirect_with_error(base: &str, err: &OAuthError, state: Option<&str>) -> Response {
    let description = err.description();
    redirect_with(
        base,
        &[("error", err.error_code()), ("error_description", &description)],
        state,
    )
}

/// Client credentials from the Basic header, falling back to form fields
fn client_credentials(
    headers: &HeaderMap,
    client_id: &Option<String>,
    client_secret: &Option<String>,
) -> Result<BasicCredentials, OAuthError> {
    if let Some(credentials) = BasicCredentials::from_headers(headers) {
        return Ok(credentials);
    }
    let client_id = optional(client_id.clone()).ok_or_else(|| {
        OAuthError::InvalidClient("client credentials are required".to_string())
    })?;
    Ok(BasicCredentials {
        client_id,
        client_secret: client_secret.clone().unwrap_or_default(),
    })
}

/// Builds the grant from the form, before any client authentication
fn parse_grant(request: &TokenRequest) -> Result<Grant, OAuthError> {
    let grant_type = required(&request.grant_type, "grant_type")?;
    let grant_type: GrantType = grant_type.parse().map_err(|_| {
        OAuthError::UnsupportedGrantType(format!("grant_type '{grant_type}' is not supported"))
    })?;

    Ok(match grant_type {
        GrantType::AuthorizationCode => Grant::AuthorizationCode {
            code: required(&request.code, "code")?,
            redirect_uri: required(&request.redirect_uri, "redirect_uri")?,
        },
        GrantType::RefreshToken => Grant::RefreshToken {
            refresh_token: required(&request.refresh_token, "refresh_token")?,
        },
        GrantType::ClientCredentials => Grant::ClientCredentials {
            scope: optional(request.scope.clone()),
        },
    })
}

/// OAuth 2.0 Token endpoint (RFC 6749 Sections 4.1.3, 4.4 and 6)
#[utoipa::path(
    post,
    path = "/oauth/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid request or grant", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    ),
    tag = OAUTH_TAG
)]
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(request) = form.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;
    let grant = parse_grant(&request)?;
    let credentials = client_credentials(&headers, &request.client_id, &request.client_secret)?;
    debug!(
        "Token request from client {} with grant {}",
        credentials.client_id,
        grant.grant_type()
    );

    let issued = state
        .tokens
        .exchange(&credentials.client_id, &credentials.client_secret, grant)
        .await?;

    let mut response = Json(issued).into_response();
    credentials_response().apply(&mut response);
    Ok(response)
}

/// OAuth 2.0 Token Revocation endpoint (RFC 7009)
///
/// Answers 200 once the client is authenticated, whatever happened to the token.
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    request_body(content = RevocationRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked, or nothing to revoke"),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    ),
    tag = OAUTH_TAG
)]
pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<RevocationRequest>, FormRejection>,
) -> Result<StatusCode, OAuthError> {
    let request = form.map(|Form(request)| request).unwrap_or_default();
    let credentials = client_credentials(&headers, &request.client_id, &request.client_secret)?;

    let client = match authenticate_client(
        state.clients.as_ref(),
        &credentials.client_id,
        &credentials.client_secret,
    )
    .await
    {
        Ok(client) => client,
        Err(err @ OAuthError::InvalidClient(_)) => return Err(err),
        Err(err) => {
            warn!("Revocation aborted during client authentication: {}", err);
            return Ok(StatusCode::OK);
        }
    };

    let hint = TokenTypeHint::parse(request.token_type_hint.as_deref());
    if let Some(token) = optional(request.token) {
        if let Err(err) = state.revocation.revoke(&token, hint, &client.id).await {
            warn!("Revocation for client {} failed: {}", client.id, err);
        }
    }
    Ok(StatusCode::OK)
}

/// OAuth 2.0 Token Introspection endpoint (RFC 7662)
#[utoipa::path(
    post,
    path = "/oauth/introspect",
    request_body(
        content = IntrospectionRequest,
        content_type = "application/x-www-form-urlencoded"
    ),
    responses(
        (
            status = 200,
            description = "Token metadata, or only active=false",
            body = IntrospectionResponse
        ),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    ),
    tag = OAUTH_TAG
)]
pub async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<IntrospectionRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let request = form.map(|Form(request)| request).unwrap_or_default();
    let credentials = client_credentials(&headers, &request.client_id, &request.client_secret)?;
    authenticate_client(
        state.clients.as_ref(),
        &credentials.client_id,
        &credentials.client_secret,
    )
    .await?;
    if let Some(hint) = optional(request.token_type_hint) {
        debug!(
            "Introspection by client {} ignores token_type_hint {}",
            credentials.client_id, hint
        );
    }

    let introspection = match optional(request.token) {
        Some(token) => state.introspection.introspect(&token).await,
        None => IntrospectionResponse::inactive(),
    };

    let mut response = Json(introspection).into_response();
    credentials_response().apply(&mut response);
    Ok(response)
}

/// Profile of the user owning the bearer token
#[utoipa::path(
    get,
    path = "/oauth/userinfo",
    responses(
        (status = 200, description = "User profile", body = UserInfo),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Token lacks the profile scope", body = ErrorResponse)
    ),
    tag = OAUTH_TAG
)]
pub async fn userinfo(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, OAuthError> {
    let info = resolve_userinfo(state.users.as_ref(), &principal).await?;
    let mut response = Json(info).into_response();
    private_response().apply(&mut response);
    Ok(response)
}
