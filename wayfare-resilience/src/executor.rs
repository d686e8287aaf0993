use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::breaker::{BreakerSettings, CircuitBreaker};
use crate::manager::BreakerManager;
use crate::retry::RetryPolicy;
use wayfare_shared::{codes, AppError, AppResult};

/// What to wrap around an operation. `None` disables that layer.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub name: String,
    /// One deadline spanning every attempt.
    pub timeout: Option<Duration>,
    pub breaker: Option<BreakerSettings>,
    pub retry: Option<RetryPolicy>,
}

impl ExecutorConfig {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), timeout: None, breaker: None, retry: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_breaker(mut self, settings: BreakerSettings) -> Self {
        self.breaker = Some(settings);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

#[derive(Clone)]
pub struct Executor {
    name: String,
    timeout: Option<Duration>,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: RetryPolicy,
}

impl Executor {
    /// Build an executor whose breaker lives in `manager` under the config name.
    pub fn new(config: ExecutorConfig, manager: &BreakerManager) -> Self {
        let breaker = config
            .breaker
            .map(|settings| manager.get_or_create(&config.name, settings));
        Self {
            name: config.name,
            timeout: config.timeout,
            breaker,
            retry: config.retry.unwrap_or_else(RetryPolicy::none),
        }
    }

    /// Build against the process-wide registry.
    pub fn global(config: ExecutorConfig) -> Self {
        Self::new(config, BreakerManager::global())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub async fn execute<T, F, Fut>(&self, op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.execute_with_cancel(None, op).await
    }

    /// Like [`Executor::execute`], returning early with a cancellation error
    /// once `cancel` flips to `true`.
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        mut cancel: Option<watch::Receiver<bool>>,
        mut op: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    return Err(self.annotate(AppError::cancelled(format!("{} cancelled", self.name)), attempt, started));
                }
                r = self.attempt(&mut op, deadline) => r,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            // An open breaker stays open for its whole timeout; backing off
            // inside it only delays the same answer.
            let open = err.is(codes::CIRCUIT_BREAKER_OPEN);
            if attempt >= max_attempts || open || !self.retry.should_retry(&err) {
                if attempt > 1 {
                    warn!(operation = %self.name, attempts = attempt, error = %err, "giving up after retries");
                }
                return Err(self.annotate(err, attempt, started));
            }

            let delay = self.retry.delay_for(attempt);
            debug!(operation = %self.name, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    return Err(self.annotate(AppError::cancelled(format!("{} cancelled", self.name)), attempt, started));
                }
                _ = until(deadline) => {
                    return Err(self.deadline_error(attempt, started));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One pass through breaker and deadline.
    async fn attempt<T, F, Fut>(&self, op: &mut F, deadline: Option<Instant>) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(AppError::timeout(format!("{} exceeded its deadline", self.name)));
            }
        }
        let timed = async {
            match deadline {
                Some(d) => tokio::time::timeout_at(d, op())
                    .await
                    .unwrap_or_else(|_| Err(AppError::timeout(format!("{} exceeded its deadline", self.name)))),
                None => op().await,
            }
        };
        match &self.breaker {
            Some(breaker) => breaker.call(timed).await,
            None => timed.await,
        }
    }

    fn deadline_error(&self, attempts: u32, started: Instant) -> AppError {
        self.annotate(
            AppError::timeout(format!("{} exceeded its deadline", self.name)),
            attempts,
            started,
        )
    }

    fn annotate(&self, err: AppError, attempts: u32, started: Instant) -> AppError {
        let err = if err.operation.is_none() { err.with_operation(&self.name) } else { err };
        err.with_detail("attempts", attempts)
            .with_detail("elapsed_ms", started.elapsed().as_millis() as u64)
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use crate::retry::BackoffStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retrying(max_attempts: u32, strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            strategy,
            jitter: false,
            jitter_max_factor: 0.5,
            retryable: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_returns_op_error() {
        let exec = Executor::new(
            ExecutorConfig::new("once").with_retry(retrying(1, BackoffStrategy::Fixed)),
            &BreakerManager::new(),
        );
        let calls = AtomicU32::new(0);
        let err = exec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::bad_gateway("upstream 503")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is(codes::BAD_GATEWAY));
        assert_eq!(err.details["attempts"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let exec = Executor::new(
            ExecutorConfig::new("flaky").with_retry(retrying(3, BackoffStrategy::Exponential)),
            &BreakerManager::new(),
        );
        let calls = AtomicU32::new(0);
        let value = exec
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::unavailable("warming up"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let exec = Executor::new(
            ExecutorConfig::new("strict").with_retry(retrying(5, BackoffStrategy::Fixed)),
            &BreakerManager::new(),
        );
        let calls = AtomicU32::new(0);
        let err = exec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::validation("bad origin")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is(codes::VALIDATION_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jittered_retry_honors_deadline() {
        let exec = Executor::new(
            ExecutorConfig::new("deadline")
                .with_timeout(Duration::from_millis(500))
                .with_retry(retrying(5, BackoffStrategy::Jittered)),
            &BreakerManager::new(),
        );
        let calls = AtomicU32::new(0);
        let err = exec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::unavailable("down")) }
            })
            .await
            .unwrap_err();
        assert!(err.is(codes::TIMEOUT));
        let attempts = err.details["attempts"].as_u64().unwrap();
        assert!(attempts <= 3, "attempts = {}", attempts);
        assert!(calls.load(Ordering::SeqCst) < 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_op_times_out() {
        let exec = Executor::new(
            ExecutorConfig::new("slow").with_timeout(Duration::from_millis(100)),
            &BreakerManager::new(),
        );
        let err = exec
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();
        assert!(err.is(codes::TIMEOUT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_short_circuits() {
        let manager = BreakerManager::new();
        let exec = Executor::new(
            ExecutorConfig::new("vendor").with_breaker(BreakerSettings::default()),
            &manager,
        );
        for _ in 0..5 {
            let _ = exec.execute(|| async { Err::<(), _>(AppError::timeout("slow")) }).await;
        }
        assert_eq!(exec.breaker().unwrap().state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let err = exec
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();
        assert!(err.is(codes::CIRCUIT_BREAKER_OPEN));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_is_not_retried() {
        let manager = BreakerManager::new();
        let exec = Executor::new(
            ExecutorConfig::new("vendor")
                .with_breaker(BreakerSettings::default())
                .with_retry(retrying(4, BackoffStrategy::Fixed)),
            &manager,
        );
        let breaker = exec.breaker().unwrap();
        for _ in 0..5 {
            let generation = breaker.before_request().unwrap();
            breaker.after_request(generation, false);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let started = Instant::now();
        let err = exec.execute(|| async { Ok(()) }).await.unwrap_err();
        assert!(err.is(codes::CIRCUIT_BREAKER_OPEN));
        assert!(err.retryable);
        assert_eq!(err.details["attempts"], 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_sleep() {
        let exec = Executor::new(
            ExecutorConfig::new("cancel").with_retry(RetryPolicy {
                initial_delay: Duration::from_secs(30),
                ..retrying(3, BackoffStrategy::Fixed)
            }),
            &BreakerManager::new(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            exec.execute_with_cancel(Some(rx), || async { Err::<(), _>(AppError::unavailable("down")) })
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is(codes::CANCELLED));
    }
}
