//! Retry, circuit breaking and deadlines around any fallible async call.
//!
//! Composition order is fixed: retry wraps the breaker, the breaker wraps the
//! deadline, the deadline wraps the operation. One deadline spans every attempt.

pub mod breaker;
pub mod executor;
pub mod manager;
pub mod presets;
pub mod retry;

pub use breaker::{BreakerSettings, BreakerStats, CircuitBreaker, CircuitState, Counts};
pub use executor::{Executor, ExecutorConfig};
pub use manager::BreakerManager;
pub use retry::{BackoffStrategy, RetryPolicy};
