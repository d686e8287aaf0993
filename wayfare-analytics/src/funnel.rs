use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::stats::{mean, median, rate};
use wayfare_core::analytics::{Event, EventOrder, EventQuery, Funnel};
use wayfare_core::repository::EventStore;
use wayfare_shared::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelRequest {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub order: u32,
    pub name: String,
    pub users: usize,
    /// Share of step-0 users that reached this step.
    pub conversion_rate: f64,
    pub drop_off_rate: f64,
    /// Seconds from the first step; absent for step 0 and unreached steps.
    pub avg_seconds_from_start: Option<f64>,
    pub median_seconds_from_start: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelReport {
    pub funnel_id: Uuid,
    pub name: String,
    pub entered: usize,
    pub completed: usize,
    pub overall_conversion: f64,
    pub steps: Vec<StepResult>,
}

/// Walks one actor's events (ascending) through the steps; returns the
/// timestamp at which each reached step matched.
fn progress(funnel: &Funnel, events: &[&Event]) -> Vec<DateTime<Utc>> {
    let steps = funnel.ordered_steps();
    let window = funnel.window_hours.map(Duration::hours);
    let mut reached: Vec<DateTime<Utc>> = Vec::with_capacity(steps.len());

    for event in events {
        let Some(step) = steps.get(reached.len()) else {
            break;
        };
        if let (Some(start), Some(window)) = (reached.first(), window) {
            if event.timestamp > *start + window {
                break;
            }
        }
        if step.matches(event) {
            reached.push(event.timestamp);
        }
    }
    reached
}

/// Step counts over `events`, ascending by timestamp.
pub fn analyze_funnel(funnel: &Funnel, events: &[Event]) -> Vec<StepResult> {
    let mut by_actor: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in events {
        by_actor.entry(event.actor()).or_default().push(event);
    }
    let journeys: Vec<Vec<DateTime<Utc>>> = by_actor.values().map(|evs| progress(funnel, evs)).collect();

    let entered = journeys.iter().filter(|j| !j.is_empty()).count();
    funnel
        .ordered_steps()
        .into_iter()
        .enumerate()
        .map(|(k, step)| {
            let at_step: Vec<&Vec<DateTime<Utc>>> = journeys.iter().filter(|j| j.len() > k).collect();
            let users = at_step.len();
            let conversion = rate(users, entered);
            let elapsed: Vec<f64> = if k == 0 {
                Vec::new()
            } else {
                at_step
                    .iter()
                    .map(|j| (j[k] - j[0]).num_milliseconds() as f64 / 1000.0)
                    .collect()
            };
            StepResult {
                order: step.order,
                name: step.name.clone(),
                users,
                conversion_rate: conversion,
                drop_off_rate: if entered == 0 { 0.0 } else { 1.0 - conversion },
                avg_seconds_from_start: mean(&elapsed),
                median_seconds_from_start: median(&elapsed),
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct FunnelAnalyzer {
    events: Arc<dyn EventStore>,
}

impl FunnelAnalyzer {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    pub async fn analyze(&self, id: Uuid, request: &FunnelRequest) -> AppResult<FunnelReport> {
        if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
            if end <= start {
                return Err(AppError::validation("end_time must be after start_time"));
            }
        }
        let funnel = self
            .events
            .get_funnel(id)
            .await?
            .ok_or_else(|| AppError::not_found("funnel", id))?;

        let mut event_types: Vec<String> = funnel.steps.iter().map(|s| s.event_type.clone()).collect();
        event_types.sort();
        event_types.dedup();
        let query = EventQuery {
            event_types,
            start_time: request.start_time,
            end_time: request.end_time,
            order_by: EventOrder::TimestampAsc,
            ..Default::default()
        };
        let events = self
            .events
            .query_events(&query)
            .await
            .map_err(|e| e.with_operation("query_events"))?;

        let steps = analyze_funnel(&funnel, &events);
        let entered = steps.first().map_or(0, |s| s.users);
        let completed = steps.last().map_or(0, |s| s.users);
        info!(funnel_id = %funnel.id, entered, completed, "funnel analyzed");
        Ok(FunnelReport {
            funnel_id: funnel.id,
            name: funnel.name,
            entered,
            completed,
            overall_conversion: rate(completed, entered),
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::tests::{at, event};
    use chrono::TimeZone;
    use wayfare_core::analytics::{Condition, FunnelStep};
    use wayfare_core::memory::MemoryEventStore;
    use wayfare_shared::codes;

    fn step(order: u32, name: &str, event_type: &str) -> FunnelStep {
        FunnelStep { order, name: name.into(), event_type: event_type.into(), conditions: vec![] }
    }

    fn booking_funnel(window_hours: Option<i64>) -> Funnel {
        Funnel {
            id: Uuid::new_v4(),
            name: "search to booking".into(),
            // Stored out of order on purpose; analysis sorts by `order`.
            steps: vec![step(3, "book", "booking"), step(1, "search", "search"), step(2, "view", "offer_view")],
            window_hours,
        }
    }

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
    }

    fn journeys() -> Vec<Event> {
        let mut events = vec![
            event("search", "u1", t(10, 0)),
            event("offer_view", "u1", t(10, 5)),
            event("booking", "u1", t(10, 30)),
            event("search", "u2", t(11, 0)),
            event("offer_view", "u2", t(11, 15)),
            event("search", "u3", t(12, 0)),
            // Booking without a view does not skip the middle step.
            event("booking", "u3", t(12, 10)),
            event("offer_view", "u4", t(9, 0)),
        ];
        events.sort_by_key(|e| e.timestamp);
        events
    }

    #[test]
    fn test_step_counts_and_rates() {
        let steps = analyze_funnel(&booking_funnel(None), &journeys());
        let users: Vec<usize> = steps.iter().map(|s| s.users).collect();
        assert_eq!(users, vec![3, 2, 1]);
        assert_eq!(steps[0].name, "search");
        assert_eq!(steps[0].conversion_rate, 1.0);
        assert!((steps[1].conversion_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((steps[2].drop_off_rate - 2.0 / 3.0).abs() < 1e-12);

        assert_eq!(steps[0].avg_seconds_from_start, None);
        assert_eq!(steps[1].avg_seconds_from_start, Some(600.0));
        assert_eq!(steps[1].median_seconds_from_start, Some(600.0));
        assert_eq!(steps[2].avg_seconds_from_start, Some(1800.0));
    }

    #[test]
    fn test_window_cuts_late_steps() {
        let mut events = journeys();
        events.push(event("booking", "u2", t(14, 0)));
        events.sort_by_key(|e| e.timestamp);

        let open = analyze_funnel(&booking_funnel(None), &events);
        assert_eq!(open[2].users, 2);
        let windowed = analyze_funnel(&booking_funnel(Some(2)), &events);
        assert_eq!(windowed[2].users, 1);
    }

    #[test]
    fn test_conditions_and_session_fallback() {
        let mut funnel = booking_funnel(None);
        funnel.steps[1].conditions = vec![Condition::eq("properties.origin", "LHR")];

        let mut anon = event("search", "ignored", t(8, 0));
        anon.user_id = None;
        anon.session_id = "anon-session".into();
        anon.properties.insert("origin".into(), serde_json::json!("LHR"));
        let mut view = event("offer_view", "ignored", t(8, 1));
        view.user_id = None;
        view.session_id = "anon-session".into();

        let events = vec![anon, view, event("search", "u1", t(9, 0))];
        let steps = analyze_funnel(&funnel, &events);
        assert_eq!(steps[0].users, 1);
        assert_eq!(steps[1].users, 1);
    }

    #[tokio::test]
    async fn test_analyzer_reads_store() {
        let store = Arc::new(MemoryEventStore::new());
        for e in journeys() {
            store.append(&e).await.unwrap();
        }
        store.append(&event("search", "u9", at(4, 1))).await.unwrap();
        let funnel = booking_funnel(None);
        store.create_funnel(&funnel).await.unwrap();
        let analyzer = FunnelAnalyzer::new(store);

        let request = FunnelRequest { start_time: Some(t(0, 0)), end_time: Some(t(23, 0)) };
        let report = analyzer.analyze(funnel.id, &request).await.unwrap();
        assert_eq!(report.entered, 3);
        assert_eq!(report.completed, 1);
        assert!((report.overall_conversion - 1.0 / 3.0).abs() < 1e-12);

        let err = analyzer.analyze(Uuid::new_v4(), &FunnelRequest::default()).await.unwrap_err();
        assert!(err.is(codes::NOT_FOUND));
        let backwards = FunnelRequest { start_time: Some(t(12, 0)), end_time: Some(t(10, 0)) };
        let err = analyzer.analyze(funnel.id, &backwards).await.unwrap_err();
        assert!(err.is(codes::VALIDATION_ERROR));
    }
}
