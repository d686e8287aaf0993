//! Periodic maintenance loops run alongside the HTTP server.

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::state::AppState;
use wayfare_core::iata::split_route_id;
use wayfare_core::price::PriceComparisonRequest;
use wayfare_shared::AppResult;
use wayfare_store::app_config::SchedulerConfig;

pub type Job = Arc<dyn Fn() -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

/// Wrap an async closure as a schedulable [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Days ahead the warmup compares prices for.
const WARMUP_HORIZONS: [i64; 2] = [7, 30];

/// Names of the loops currently executing. A name is held for the whole run.
#[derive(Clone, Default)]
pub struct RunningSet {
    names: Arc<Mutex<HashSet<String>>>,
}

/// Releases the name when the run ends, including on panic.
pub struct RunGuard {
    set: RunningSet,
    name: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut names) = self.set.names.lock() {
            names.remove(&self.name);
        }
    }
}

impl RunningSet {
    pub fn try_acquire(&self, name: &str) -> Option<RunGuard> {
        let mut names = self.names.lock().ok()?;
        if !names.insert(name.to_string()) {
            return None;
        }
        Some(RunGuard { set: self.clone(), name: name.to_string() })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.names.lock().map(|n| n.contains(name)).unwrap_or(false)
    }
}

pub struct Scheduler {
    running: RunningSet,
    cancel: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self { running: RunningSet::default(), cancel, handles: Vec::new() }
    }

    pub fn running(&self) -> &RunningSet {
        &self.running
    }

    /// Run `job` now unless a run under the same name is in flight.
    /// Returns whether the job ran.
    pub async fn run_once(&self, name: &str, job: &Job) -> bool {
        run_guarded(&self.running, name, job).await
    }

    /// Spawn a loop that runs `job` every `period`, first after `delay`.
    pub fn every(&mut self, name: &str, period: Duration, delay: Duration, job: Job) {
        let running = self.running.clone();
        let mut cancel = self.cancel.subscribe();
        let name = name.to_string();

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + delay, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(job = %name, period_secs = period.as_secs(), "scheduled job started");
            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        run_guarded(&running, &name, &job).await;
                    }
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            info!(job = %name, "scheduled job stopped");
                            break;
                        }
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Spawn a single run, e.g. a startup warmup.
    pub fn once(&mut self, name: &str, job: Job) {
        let running = self.running.clone();
        let name = name.to_string();
        self.handles.push(tokio::spawn(async move {
            run_guarded(&running, &name, &job).await;
        }));
    }

    /// Signal every loop to stop and wait for in-flight runs to finish.
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduled job ended abnormally");
            }
        }
    }
}

async fn run_guarded(running: &RunningSet, name: &str, job: &Job) -> bool {
    let Some(_guard) = running.try_acquire(name) else {
        debug!(job = %name, "previous run still in flight, skipping");
        return false;
    };
    if let Err(e) = job().await {
        error!(job = %name, code = %e.code, error = %e.message, "scheduled job failed");
    }
    true
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n.max(1))
}

/// Register the maintenance loops over the services in `state`. Each service
/// logs its own outcome; the scheduler only logs failures.
pub fn start(state: &AppState, config: &SchedulerConfig) -> Scheduler {
    let mut scheduler = Scheduler::new();
    if !config.enabled {
        info!("background scheduler disabled");
        return scheduler;
    }

    let alerts = state.alerts.clone();
    scheduler.every(
        "alert_check",
        secs(config.alert_check_seconds),
        Duration::ZERO,
        job(move || {
            let alerts = alerts.clone();
            async move {
                alerts.check_all(Utc::now()).await?;
                Ok(())
            }
        }),
    );

    let alerts = state.alerts.clone();
    scheduler.every(
        "alert_cleanup",
        secs(config.alert_cleanup_seconds),
        Duration::ZERO,
        job(move || {
            let alerts = alerts.clone();
            async move {
                alerts.cleanup_expired(Utc::now()).await?;
                Ok(())
            }
        }),
    );

    let tracking = state.tracking.clone();
    scheduler.every(
        "tracking_sweep",
        secs(config.tracking_sweep_seconds),
        Duration::ZERO,
        job(move || {
            let tracking = tracking.clone();
            async move {
                tracking.sweep(Utc::now()).await?;
                Ok(())
            }
        }),
    );

    let prices = state.prices.clone();
    scheduler.every(
        "price_cleanup",
        secs(config.price_cleanup_seconds),
        Duration::ZERO,
        job(move || {
            let prices = prices.clone();
            async move {
                prices.cleanup_expired(Utc::now()).await?;
                Ok(())
            }
        }),
    );

    let prices = state.prices.clone();
    scheduler.every(
        "history_rollup",
        secs(config.history_rollup_seconds),
        Duration::from_secs(config.history_rollup_stagger_seconds),
        job(move || {
            let prices = prices.clone();
            async move {
                prices.rollup_history(Utc::now()).await?;
                Ok(())
            }
        }),
    );

    if let Some(ingestion) = state.ingestion.clone() {
        scheduler.every(
            "session_cleanup",
            secs(config.session_cleanup_seconds),
            Duration::ZERO,
            job(move || {
                let ingestion = ingestion.clone();
                async move {
                    ingestion.cleanup_sessions(Utc::now()).await?;
                    Ok(())
                }
            }),
        );
    }

    scheduler.once("cache_warmup", warmup_job(state, config.warmup_routes.clone()));
    scheduler
}

/// Preload comparisons for the configured routes and the theme catalogue.
/// A failing route is logged and skipped.
pub fn warmup_job(state: &AppState, routes: Vec<String>) -> Job {
    let prices = state.prices.clone();
    let discovery = state.discovery.clone();
    let routes = Arc::new(routes);
    job(move || {
        let prices = prices.clone();
        let discovery = discovery.clone();
        let routes = routes.clone();
        async move {
            let now = Utc::now();
            let mut warmed = 0usize;
            for route in routes.iter() {
                let Some((origin, destination)) = split_route_id(route) else {
                    warn!(route = %route, "ignoring malformed warmup route");
                    continue;
                };
                for days in WARMUP_HORIZONS {
                    let date = now.date_naive() + ChronoDuration::days(days);
                    let request = PriceComparisonRequest::new(origin, destination, date);
                    match prices.compare(&request, now).await {
                        Ok(_) => warmed += 1,
                        Err(e) => warn!(route = %route, error = %e.message, "warmup comparison failed"),
                    }
                }
            }
            let themes = discovery.themes().await?;
            info!(comparisons = warmed, themes = themes.len(), "cache warmup finished");
            Ok(())
        }
    })
}
