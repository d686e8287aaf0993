use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use wayfare_shared::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Per-generation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// In flight right now.
    pub requests: u32,
    pub total_requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
        self.total_requests += 1;
    }

    fn on_success(&mut self) {
        self.requests = self.requests.saturating_sub(1);
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.requests = self.requests.saturating_sub(1);
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn on_abandon(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }

    /// Failures over completed requests.
    pub fn failure_ratio(&self) -> f64 {
        let completed = self.total_successes + self.total_failures;
        if completed == 0 {
            0.0
        } else {
            self.total_failures as f64 / completed as f64
        }
    }
}

pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;
pub type SuccessPredicate = Arc<dyn Fn(&AppError) -> bool + Send + Sync>;

/// Trip after 5 consecutive failures, or at a 60% failure ratio once 10
/// requests have been seen.
pub fn default_ready_to_trip(counts: &Counts) -> bool {
    counts.consecutive_failures >= 5 || (counts.total_requests >= 10 && counts.failure_ratio() >= 0.6)
}

#[derive(Clone)]
pub struct BreakerSettings {
    pub max_half_open_requests: u32,
    /// Rollover period for CLOSED statistics. Zero disables rollover.
    pub interval: Duration,
    pub open_timeout: Duration,
    pub ready_to_trip: TripPredicate,
    /// Which errors still count as a success (client-caused failures).
    pub is_success: SuccessPredicate,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_half_open_requests: 3,
            interval: Duration::from_secs(60),
            open_timeout: Duration::from_secs(60),
            ready_to_trip: Arc::new(default_ready_to_trip),
            is_success: Arc::new(|_: &AppError| false),
        }
    }
}

impl fmt::Debug for BreakerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerSettings")
            .field("max_half_open_requests", &self.max_half_open_requests)
            .field("interval", &self.interval)
            .field("open_timeout", &self.open_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub generation: u64,
    pub counts: Counts,
    pub failure_ratio: f64,
    /// Time until the current generation expires, if it does.
    pub expires_in_ms: Option<u64>,
}

struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, settings: BreakerSettings) -> Self {
        let now = Instant::now();
        let expiry = (!settings.interval.is_zero()).then(|| now + settings.interval);
        Self {
            name: name.to_string(),
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.counts
    }

    pub fn stats(&self) -> BreakerStats {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            generation: inner.generation,
            counts: inner.counts,
            failure_ratio: inner.counts.failure_ratio(),
            expires_in_ms: inner
                .expiry
                .map(|e| e.saturating_duration_since(now).as_millis() as u64),
        }
    }

    /// Force CLOSED with zeroed counters and a new generation.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed, now);
        info!(breaker = %self.name, "circuit breaker reset");
    }

    /// Admit a request, returning the generation it belongs to.
    pub fn before_request(&self) -> AppResult<u64> {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);

        match inner.state {
            CircuitState::Open => return Err(AppError::circuit_open(&self.name)),
            CircuitState::HalfOpen if inner.counts.requests >= self.settings.max_half_open_requests => {
                warn!(breaker = %self.name, "half-open request limit reached");
                return Err(AppError::half_open_limit(&self.name));
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(inner.generation)
    }

    /// Record an outcome. Outcomes from an older generation are dropped.
    pub fn after_request(&self, generation: u64, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        if inner.generation != generation {
            return;
        }
        if success {
            self.on_success(&mut inner, now);
        } else {
            self.on_failure(&mut inner, now);
        }
    }

    fn abandon(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.counts.on_abandon();
        }
    }

    /// Run `fut` through the breaker. An open breaker fails fast without polling it.
    pub async fn call<T, Fut>(&self, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        let generation = self.before_request()?;
        let mut guard = InFlight { breaker: self, generation, done: false };
        let result = fut.await;
        let success = match &result {
            Ok(_) => true,
            Err(e) => (self.settings.is_success)(e),
        };
        guard.done = true;
        self.after_request(generation, success);
        result
    }

    fn on_success(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            CircuitState::Closed => inner.counts.on_success(),
            CircuitState::HalfOpen => {
                inner.counts.on_success();
                self.transition(inner, CircuitState::Closed, now);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                inner.counts.on_failure();
                if (self.settings.ready_to_trip)(&inner.counts) {
                    self.transition(inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => self.transition(inner, CircuitState::Open, now),
            CircuitState::Open => {}
        }
    }

    /// Apply time-based transitions: CLOSED rollover, OPEN -> HALF_OPEN.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.map_or(false, |e| e <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.map_or(false, |e| e <= now) {
                    self.transition(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        self.new_generation(inner, now);
        if from == to {
            return;
        }
        match to {
            CircuitState::Open => error!(
                breaker = %self.name,
                from = %from,
                "circuit breaker tripped open"
            ),
            _ => info!(breaker = %self.name, from = %from, to = %to, "circuit breaker state change"),
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => (!self.settings.interval.is_zero()).then(|| now + self.settings.interval),
            CircuitState::Open => Some(now + self.settings.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }
}

/// Releases the in-flight slot when a call is dropped before completing.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.abandon(self.generation);
        }
    }
}
