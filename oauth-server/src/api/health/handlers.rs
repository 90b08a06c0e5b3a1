use super::checkers::{
    check_cache_health, check_database_health, check_lock_health, run_health_check,
};
use super::models::{ComponentHealth, ComponentStatus, HealthResponse, HealthStatusType};
use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use log::{debug, error, info};

fn task_failed(name: &str, e: tokio::task::JoinError) -> ComponentStatus {
    error!("{name} check task panicked: {e:?}");
    ComponentStatus::error(format!("{name} check task failed"))
}

/// Checks every backend concurrently
async fn check_all_health(state: &AppState) -> HealthResponse {
    let database = tokio::spawn(run_health_check(
        "Database",
        check_database_health,
        state.clone(),
    ));
    let cache = tokio::spawn(run_health_check("Cache", check_cache_health, state.clone()));
    let lock = tokio::spawn(run_health_check("Lock", check_lock_health, state.clone()));

    let components = ComponentHealth {
        database: database
            .await
            .unwrap_or_else(|e| task_failed("Database", e)),
        cache: cache.await.unwrap_or_else(|e| task_failed("Cache", e)),
        lock: lock.await.unwrap_or_else(|e| task_failed("Lock", e)),
    };

    let healthy = components.all_ok();
    if healthy {
        debug!("Readiness check passed for all components");
    } else {
        info!("Readiness check failed: {:?}", components);
    }

    HealthResponse {
        status: if healthy {
            HealthStatusType::Ok
        } else {
            HealthStatusType::Error
        },
        components: Some(components),
        status_code: if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
    }
}

/// Liveness: the process is up and serving
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub(crate) async fn health_check() -> impl IntoResponse {
    HealthResponse {
        status: HealthStatusType::Ok,
        components: None,
        status_code: StatusCode::OK,
    }
}

/// Readiness: the database, cache and lock backends all answer in time
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service is not ready", body = HealthResponse)
    )
)]
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    check_all_health(&state).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
}
