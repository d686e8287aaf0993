use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::stats::{mean, rate};
use crate::trends::{TrendMetric, TrendPoint};
use wayfare_core::analytics::{add_months, Cohort, CohortPeriod, Event, EventOrder, EventQuery};
use wayfare_core::repository::EventStore;
use wayfare_shared::{AppError, AppResult};

pub const MAX_PERIODS: u32 = 52;
pub const MAX_TREND_MONTHS: u32 = 24;

fn default_periods() -> u32 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRequest {
    /// Event type that counts as a return visit.
    pub retention_event: String,
    #[serde(default = "default_periods")]
    pub periods: u32,
}

impl RetentionRequest {
    pub fn new(retention_event: &str) -> Self {
        Self { retention_event: retention_event.to_string(), periods: default_periods() }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.retention_event.trim().is_empty() {
            return Err(AppError::validation("retention_event is required"));
        }
        if !(1..=MAX_PERIODS).contains(&self.periods) {
            return Err(AppError::validation("periods must be between 1 and 52").with_detail("periods", self.periods));
        }
        Ok(())
    }
}

/// One cohort period: its members and, per offset, how many came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRow {
    pub period_start: NaiveDate,
    pub users: usize,
    pub retained: Vec<usize>,
    pub rates: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionSummary {
    pub total_users: usize,
    pub retention_day_1: f64,
    pub retention_day_7: f64,
    pub retention_day_30: f64,
    pub churn_rate: f64,
}

impl RetentionSummary {
    pub fn metric(&self, metric: TrendMetric) -> f64 {
        match metric {
            TrendMetric::RetentionDay1 => self.retention_day_1,
            TrendMetric::RetentionDay7 => self.retention_day_7,
            TrendMetric::RetentionDay30 => self.retention_day_30,
            TrendMetric::ChurnRate => self.churn_rate,
            TrendMetric::TotalUsers => self.total_users as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionMatrix {
    pub rows: Vec<CohortRow>,
    /// Mean of the row rates at each offset.
    pub average_rates: Vec<f64>,
    pub summary: RetentionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortReport {
    pub cohort_id: Uuid,
    pub name: String,
    pub period: CohortPeriod,
    #[serde(flatten)]
    pub matrix: RetentionMatrix,
    pub analyzed_at: DateTime<Utc>,
}

struct Member<'a> {
    first: &'a Event,
    returns: Vec<NaiveDate>,
}

/// Retention over `events` (ascending by timestamp) for actors whose first
/// event falls in `[from, until)` and satisfies the cohort criteria.
pub fn retention_matrix(
    cohort: &Cohort,
    events: &[Event],
    request: &RetentionRequest,
    from: NaiveDate,
    until: NaiveDate,
) -> RetentionMatrix {
    let mut members: BTreeMap<&str, Member<'_>> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for event in events {
        let actor = event.actor();
        if seen.insert(actor) {
            let day = event.timestamp.date_naive();
            if day >= from && day < until && cohort.admits(event) {
                members.insert(actor, Member { first: event, returns: Vec::new() });
            }
            continue;
        }
        if event.event_type == request.retention_event {
            if let Some(member) = members.get_mut(actor) {
                member.returns.push(event.timestamp.date_naive());
            }
        }
    }

    let mut grouped: BTreeMap<NaiveDate, Vec<&Member<'_>>> = BTreeMap::new();
    for member in members.values() {
        let start = cohort.period.start_of(member.first.timestamp.date_naive());
        grouped.entry(start).or_default().push(member);
    }

    let rows: Vec<CohortRow> = grouped
        .into_iter()
        .map(|(period_start, group)| {
            let retained: Vec<usize> = (0..request.periods)
                .map(|k| {
                    let lo = cohort.period.advance(period_start, k);
                    let hi = cohort.period.advance(period_start, k + 1);
                    group
                        .iter()
                        .filter(|m| m.returns.iter().any(|d| *d >= lo && *d < hi))
                        .count()
                })
                .collect();
            let rates = retained.iter().map(|r| rate(*r, group.len())).collect();
            CohortRow { period_start, users: group.len(), retained, rates }
        })
        .collect();

    let average_rates = (0..request.periods as usize)
        .map(|k| {
            let at_offset: Vec<f64> = rows.iter().map(|r| r.rates[k]).collect();
            mean(&at_offset).unwrap_or(0.0)
        })
        .collect();

    let total = members.len();
    let returned_on = |n: i64| {
        members
            .values()
            .filter(|m| {
                let first = m.first.timestamp.date_naive();
                m.returns.iter().any(|d| (*d - first).num_days() == n)
            })
            .count()
    };
    let churned = members
        .values()
        .filter(|m| {
            let first = m.first.timestamp.date_naive();
            !m.returns.iter().any(|d| *d > first)
        })
        .count();

    RetentionMatrix {
        rows,
        average_rates,
        summary: RetentionSummary {
            total_users: total,
            retention_day_1: rate(returned_on(1), total),
            retention_day_7: rate(returned_on(7), total),
            retention_day_30: rate(returned_on(30), total),
            churn_rate: rate(churned, total),
        },
    }
}

#[derive(Clone)]
pub struct CohortAnalyzer {
    events: Arc<dyn EventStore>,
}

impl CohortAnalyzer {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    async fn cohort(&self, id: Uuid) -> AppResult<Cohort> {
        self.events
            .get_cohort(id)
            .await?
            .ok_or_else(|| AppError::not_found("cohort", id))
    }

    /// Everything up to `now`: first appearances need the full history.
    async fn history(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let query = EventQuery {
            end_time: Some(now),
            order_by: EventOrder::TimestampAsc,
            ..Default::default()
        };
        self.events
            .query_events(&query)
            .await
            .map_err(|e| e.with_operation("query_events"))
    }

    pub async fn analyze(&self, id: Uuid, request: &RetentionRequest, now: DateTime<Utc>) -> AppResult<CohortReport> {
        request.validate()?;
        let cohort = self.cohort(id).await?;
        let events = self.history(now).await?;
        let until = cohort
            .end_date
            .map(|d| d + Duration::days(1))
            .unwrap_or_else(|| now.date_naive() + Duration::days(1));
        let matrix = retention_matrix(&cohort, &events, request, cohort.start_date, until);

        if !cohort.is_frozen() {
            self.events.mark_cohort_analyzed(cohort.id, now).await?;
        }
        info!(cohort_id = %cohort.id, users = matrix.summary.total_users, rows = matrix.rows.len(), "cohort analyzed");
        Ok(CohortReport {
            cohort_id: cohort.id,
            name: cohort.name,
            period: cohort.period,
            matrix,
            analyzed_at: now,
        })
    }

    /// One point per calendar month from the cohort start: the metric for
    /// users first seen in that month.
    pub async fn trend(
        &self,
        id: Uuid,
        request: &RetentionRequest,
        metric: TrendMetric,
        months: u32,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<TrendPoint>> {
        request.validate()?;
        if !(1..=MAX_TREND_MONTHS).contains(&months) {
            return Err(AppError::validation("months must be between 1 and 24").with_detail("months", months));
        }
        let cohort = self.cohort(id).await?;
        let events = self.history(now).await?;
        let first_month = CohortPeriod::Monthly.start_of(cohort.start_date);
        let today = now.date_naive();

        let points = (0..months)
            .map(|i| (add_months(first_month, i), add_months(first_month, i + 1)))
            .take_while(|(start, _)| *start <= today)
            .map(|(start, end)| {
                let matrix = retention_matrix(&cohort, &events, request, start, end);
                TrendPoint { window_start: start, value: matrix.summary.metric(metric) }
            })
            .collect();
        Ok(points)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use wayfare_core::analytics::EventContext;
    use wayfare_core::memory::MemoryEventStore;
    use wayfare_shared::codes;

    pub fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, 12, 0, 0).unwrap()
    }

    pub fn event(event_type: &str, user: &str, timestamp: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            user_id: Some(user.to_string()),
            session_id: format!("s-{}", user),
            timestamp,
            properties: BTreeMap::new(),
            context: EventContext::default(),
        }
    }

    fn cohort(period: CohortPeriod) -> Cohort {
        Cohort {
            id: Uuid::new_v4(),
            name: "spring signups".into(),
            period,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: None,
            criteria: BTreeMap::new(),
            first_analyzed_at: None,
        }
    }

    fn sample_events() -> Vec<Event> {
        let mut events = vec![
            event("signup", "u1", at(3, 3)),
            event("search", "u1", at(3, 4)),
            event("search", "u1", at(3, 10)),
            event("signup", "u2", at(3, 5)),
            event("signup", "u3", at(3, 12)),
            event("search", "u3", at(3, 19)),
            event("signup", "u4", at(4, 2)),
            event("search", "u4", at(5, 2)),
        ];
        events.sort_by_key(|e| e.timestamp);
        events
    }

    #[test]
    fn test_weekly_matrix() {
        let c = cohort(CohortPeriod::Weekly);
        let request = RetentionRequest { retention_event: "search".into(), periods: 3 };
        let until = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let matrix = retention_matrix(&c, &sample_events(), &request, c.start_date, until);

        // Weeks of Mar 3 (u1, u2) and Mar 10 (u3); u4 falls outside the range.
        assert_eq!(matrix.rows.len(), 2);
        let first = &matrix.rows[0];
        assert_eq!(first.period_start, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(first.users, 2);
        assert_eq!(first.retained, vec![1, 1, 0]);
        assert_eq!(first.rates, vec![0.5, 0.5, 0.0]);
        let second = &matrix.rows[1];
        assert_eq!(second.retained, vec![0, 1, 0]);
        assert_eq!(matrix.average_rates, vec![0.25, 0.75, 0.0]);

        assert_eq!(matrix.summary.total_users, 3);
        assert!((matrix.summary.retention_day_1 - 1.0 / 3.0).abs() < 1e-12);
        assert!((matrix.summary.retention_day_7 - 2.0 / 3.0).abs() < 1e-12);
        assert!((matrix.summary.churn_rate - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_criteria_filter_first_event() {
        let mut c = cohort(CohortPeriod::Monthly);
        c.criteria.insert("type".into(), serde_json::json!("signup"));
        let mut events = sample_events();
        events.insert(0, event("search", "u9", at(3, 1)));
        let request = RetentionRequest::new("search");
        let until = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let matrix = retention_matrix(&c, &events, &request, c.start_date, until);
        assert_eq!(matrix.summary.total_users, 4);
    }

    #[tokio::test]
    async fn test_analyze_marks_cohort() {
        let store = Arc::new(MemoryEventStore::new());
        for e in sample_events() {
            store.append(&e).await.unwrap();
        }
        let c = cohort(CohortPeriod::Monthly);
        store.create_cohort(&c).await.unwrap();
        let analyzer = CohortAnalyzer::new(store.clone());

        let report = analyzer.analyze(c.id, &RetentionRequest::new("search"), at(6, 1)).await.unwrap();
        assert_eq!(report.matrix.rows.len(), 2);
        assert_eq!(report.matrix.rows[1].retained[1], 1);
        let stored = store.get_cohort(c.id).await.unwrap().unwrap();
        assert_eq!(stored.first_analyzed_at, Some(at(6, 1)));

        let err = analyzer.analyze(Uuid::new_v4(), &RetentionRequest::new("search"), at(6, 1)).await.unwrap_err();
        assert!(err.is(codes::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_monthly_trend_of_total_users() {
        let store = Arc::new(MemoryEventStore::new());
        for e in sample_events() {
            store.append(&e).await.unwrap();
        }
        let c = cohort(CohortPeriod::Weekly);
        store.create_cohort(&c).await.unwrap();
        let analyzer = CohortAnalyzer::new(store);

        let points = analyzer
            .trend(c.id, &RetentionRequest::new("search"), TrendMetric::TotalUsers, 6, at(5, 15))
            .await
            .unwrap();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![3.0, 1.0, 0.0]);
        assert_eq!(points[1].window_start, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
    }
}
