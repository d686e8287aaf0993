use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use wayfare_shared::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    /// Exponential plus random jitter on every delay.
    Jittered,
}

pub type RetryPredicate = Arc<dyn Fn(&AppError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub strategy: BackoffStrategy,
    /// Add uniform jitter in `[0, delay * jitter_max_factor]`.
    pub jitter: bool,
    pub jitter_max_factor: f64,
    /// Overrides the error's own `retryable` flag.
    pub retryable: Option<RetryPredicate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: false,
            jitter_max_factor: 0.1,
            retryable: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("strategy", &self.strategy)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    pub fn should_retry(&self, err: &AppError) -> bool {
        match &self.retryable {
            Some(predicate) => predicate(err),
            None => err.retryable,
        }
    }

    /// Deterministic part of the delay after the `attempt`-th failure (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let initial = self.initial_delay.as_secs_f64();
        let secs = match self.strategy {
            BackoffStrategy::Fixed => initial,
            BackoffStrategy::Linear => initial * attempt as f64,
            BackoffStrategy::Exponential | BackoffStrategy::Jittered => {
                initial * self.multiplier.powi(attempt as i32 - 1)
            }
        };
        duration_from_secs(secs)
    }

    /// Delay to sleep after the `attempt`-th failure, jitter applied and
    /// clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let with_jitter = if self.jitter || self.strategy == BackoffStrategy::Jittered {
            let spread = base.as_secs_f64() * self.jitter_max_factor.max(0.0);
            let extra = if spread > 0.0 { rand::thread_rng().gen_range(0.0..=spread) } else { 0.0 };
            base + duration_from_secs(extra)
        } else {
            base
        };
        with_jitter.min(self.max_delay)
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            strategy,
            jitter: false,
            jitter_max_factor: 0.5,
            retryable: None,
        }
    }

    #[test]
    fn test_strategies() {
        let ms = |d: Duration| d.as_millis();
        let fixed = policy(BackoffStrategy::Fixed);
        assert_eq!(ms(fixed.delay_for(3)), 200);
        let linear = policy(BackoffStrategy::Linear);
        assert_eq!(ms(linear.delay_for(3)), 600);
        let exp = policy(BackoffStrategy::Exponential);
        assert_eq!(ms(exp.delay_for(1)), 200);
        assert_eq!(ms(exp.delay_for(3)), 800);
        assert_eq!(ms(exp.delay_for(4)), 1000);
    }

    #[test]
    fn test_jitter_bounds() {
        let p = policy(BackoffStrategy::Jittered);
        for _ in 0..100 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(400) && d <= Duration::from_millis(600));
        }
        // clamp applies after jitter
        assert!(p.delay_for(5) <= Duration::from_secs(1));
    }

    #[test]
    fn test_retryability_follows_error() {
        let p = RetryPolicy::default();
        assert!(p.should_retry(&AppError::timeout("slow")));
        assert!(p.should_retry(&AppError::bad_gateway("502")));
        assert!(!p.should_retry(&AppError::validation("bad")));
        assert!(!p.should_retry(&AppError::not_found("alert", 1)));

        let never = RetryPolicy { retryable: Some(Arc::new(|_: &AppError| false)), ..Default::default() };
        assert!(!never.should_retry(&AppError::timeout("slow")));
    }
}
