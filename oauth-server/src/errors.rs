use crate::auth::password::PasswordError;
use crate::lock::LockError;
use crate::signing::SigningError;
use crate::store::StoreError;
use axum::response::IntoResponse;
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Description returned for every internal failure
const SYSTEM_BUSY_DESCRIPTION: &str = "The server is busy, please try again later";

/// Errors surfaced by the OAuth endpoints and the authorization gate.
///
/// Protocol errors carry a description meant for the caller. `SystemBusy`
/// carries internal detail that is logged and never rendered.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OAuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid client: {0}")]
    InvalidClient(String),
    #[error("invalid grant: {0}")]
    InvalidGrant(String),
    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("system busy: {0}")]
    SystemBusy(String),
}

/// RFC 6749 error body
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl OAuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidGrant(_)
            | Self::UnsupportedGrantType(_)
            | Self::InvalidScope(_)
            | Self::InvalidRedirectUri(_) => StatusCode::BAD_REQUEST,
            Self::InvalidClient(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::SystemBusy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `error` code written to the response body and to redirect query strings
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::InvalidRedirectUri(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::SystemBusy(_) => "server_error",
        }
    }

    /// Caller-facing description. Internal detail is never exposed.
    pub fn description(&self) -> String {
        match self {
            Self::InvalidRequest(detail)
            | Self::InvalidClient(detail)
            | Self::InvalidGrant(detail)
            | Self::UnsupportedGrantType(detail)
            | Self::InvalidScope(detail)
            | Self::InvalidRedirectUri(detail)
            | Self::Unauthorized(detail)
            | Self::Forbidden(detail)
            | Self::NotFound(detail) => detail.clone(),
            Self::SystemBusy(_) => SYSTEM_BUSY_DESCRIPTION.to_string(),
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.description(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status_code(), Json(self.to_response_body())).into_response();
        if matches!(self, Self::InvalidClient(_)) {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"oauth\""),
            );
        }
        response
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => OAuthError::InvalidRequest(detail),
            StoreError::NotFound(detail) => OAuthError::NotFound(detail),
            err => {
                error!("Store error: {}", err);
                OAuthError::SystemBusy(err.to_string())
            }
        }
    }
}

impl From<SigningError> for OAuthError {
    fn from(err: SigningError) -> Self {
        error!("Signing error: {}", err);
        OAuthError::SystemBusy(err.to_string())
    }
}

impl From<PasswordError> for OAuthError {
    fn from(err: PasswordError) -> Self {
        error!("Password error: {}", err);
        OAuthError::SystemBusy(err.to_string())
    }
}

impl From<LockError> for OAuthError {
    fn from(err: LockError) -> Self {
        error!("Lock error: {}", err);
        OAuthError::SystemBusy(err.to_string())
    }
}
