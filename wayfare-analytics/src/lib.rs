//! Reporting over the analytics event store: cohort retention, funnel
//! conversion and monthly trends. Persistence stays behind `EventStore`.

pub mod cohort;
pub mod funnel;
pub mod stats;
pub mod trends;

pub use cohort::{CohortAnalyzer, CohortReport, CohortRow, RetentionMatrix, RetentionRequest, RetentionSummary};
pub use funnel::{FunnelAnalyzer, FunnelReport, FunnelRequest, StepResult};
pub use trends::{TrendMetric, TrendPoint};
