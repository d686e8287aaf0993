use std::sync::Arc;
use std::time::Duration;

use crate::breaker::BreakerSettings;
use crate::executor::ExecutorConfig;
use crate::retry::{BackoffStrategy, RetryPolicy};
use wayfare_shared::{AppError, ErrorKind};

/// Errors the caller caused. They say nothing about the health of the
/// dependency, so they never count against a breaker.
pub fn is_client_error(err: &AppError) -> bool {
    matches!(
        err.kind,
        ErrorKind::Validation
            | ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::NotFound
            | ErrorKind::Conflict
    )
}

pub fn database(name: &str) -> ExecutorConfig {
    ExecutorConfig::new(name)
        .with_timeout(Duration::from_secs(5))
        .with_breaker(BreakerSettings {
            is_success: Arc::new(is_client_error),
            ..Default::default()
        })
        .with_retry(RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            jitter_max_factor: 0.1,
            retryable: None,
        })
}

pub fn external_service(name: &str) -> ExecutorConfig {
    ExecutorConfig::new(name)
        .with_timeout(Duration::from_secs(30))
        .with_breaker(BreakerSettings {
            is_success: Arc::new(is_client_error),
            ..Default::default()
        })
        .with_retry(RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            strategy: BackoffStrategy::Jittered,
            jitter: true,
            jitter_max_factor: 0.25,
            retryable: None,
        })
}

pub fn cache(name: &str) -> ExecutorConfig {
    ExecutorConfig::new(name)
        .with_timeout(Duration::from_millis(500))
        .with_breaker(BreakerSettings {
            open_timeout: Duration::from_secs(30),
            ..Default::default()
        })
        .with_retry(RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            multiplier: 1.0,
            strategy: BackoffStrategy::Fixed,
            jitter: false,
            jitter_max_factor: 0.0,
            retryable: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use crate::executor::Executor;
    use crate::manager::BreakerManager;

    #[tokio::test(start_paused = true)]
    async fn test_external_service_ignores_client_errors() {
        let exec = Executor::new(external_service("vendor"), &BreakerManager::new());
        for _ in 0..10 {
            let _ = exec
                .execute(|| async { Err::<(), _>(AppError::authentication("bad credentials")) })
                .await;
        }
        assert_eq!(exec.breaker().unwrap().state(), CircuitState::Closed);

        for _ in 0..5 {
            let _ = exec.execute(|| async { Err::<(), _>(AppError::unavailable("down")) }).await;
        }
        assert_eq!(exec.breaker().unwrap().state(), CircuitState::Open);
    }

    #[test]
    fn test_client_error_classification() {
        assert!(is_client_error(&AppError::conflict("dup")));
        assert!(!is_client_error(&AppError::timeout("slow")));
        assert!(!is_client_error(&AppError::rate_limited("slow down", None)));
    }
}
