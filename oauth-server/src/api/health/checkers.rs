use super::models::ComponentStatus;
use crate::cache::CacheBackend;
use crate::state::AppState;
use crate::store;
use std::future::Future;
use std::pin::Pin;
use tokio::time::timeout;

pub(super) type Check =
    for<'a> fn(&'a AppState) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + 'a>>;

pub(super) fn check_database_health(
    state: &AppState,
) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + '_>> {
    Box::pin(async move { store::health_check(&state.pool).await.into() })
}

pub(super) fn check_cache_health(
    state: &AppState,
) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + '_>> {
    Box::pin(async move { state.cache.health_check().await.into() })
}

pub(super) fn check_lock_health(
    state: &AppState,
) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + '_>> {
    Box::pin(async move { state.locks.health_check().await.into() })
}

/// Runs one check under the configured health timeout
pub(super) async fn run_health_check(
    checker_name: &'static str,
    check: Check,
    state: AppState,
) -> ComponentStatus {
    match timeout(state.health_timeout(), check(&state)).await {
        Ok(status) => status,
        Err(_) => ComponentStatus::error(format!(
            "{checker_name} health check timed out after {:?}",
            state.health_timeout()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;
    use crate::api::health::models::HealthStatusType;
    use std::time::Duration;

    fn stalled(_: &AppState) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + '_>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ComponentStatus::ok()
        })
    }

    #[tokio::test]
    async fn test_checks_pass_on_in_memory_backends() {
        let fixture = TestFixture::new().await;
        for check in [
            check_database_health as Check,
            check_cache_health as Check,
            check_lock_health as Check,
        ] {
            let status = run_health_check("backend", check, fixture.state.clone()).await;
            assert_eq!(status.status, HealthStatusType::Ok);
        }
    }

    #[tokio::test]
    async fn test_stalled_check_times_out() {
        let fixture = TestFixture::new().await;
        let status = run_health_check("Stalled", stalled, fixture.state.clone()).await;
        assert_eq!(status.status, HealthStatusType::Error);
        assert!(status.error.unwrap().contains("Stalled health check timed out"));
    }
}
