pub(crate) mod auth;
pub(crate) mod health;
pub(crate) mod oauth;
pub(crate) mod users;

use crate::errors::OAuthError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use log::warn;
use std::time::Duration;

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router(state))
        .merge(oauth::router(state))
        .merge(users::router(state))
        .layer(middleware::from_fn_with_state(
            Duration::from_secs(state.settings.request_timeout),
            request_deadline,
        ))
}

/// Drops the handler future once the deadline passes, rolling back any open
/// transaction it holds
async fn request_deadline(
    State(deadline): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("{} {} exceeded the {:?} deadline", method, path, deadline);
            OAuthError::SystemBusy("request deadline exceeded".to_string()).into_response()
        }
    }
}
