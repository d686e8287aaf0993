use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

// ============================================================================
// Events
// ============================================================================

/// Context recognised on the wire. Keys we don't model stay in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EventContext {
    /// Look a key up across typed and untyped fields.
    pub fn get(&self, key: &str) -> Option<Value> {
        let typed = match key {
            "device_type" => self.device_type.as_ref(),
            "country" => self.country.as_ref(),
            "utm_source" => self.utm_source.as_ref(),
            "utm_campaign" => self.utm_campaign.as_ref(),
            _ => return self.extra.get(key).cloned(),
        };
        typed.map(|v| Value::String(v.clone()))
    }
}

/// Append-only analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub context: EventContext,
}

impl Event {
    /// The identity used for grouping: user, falling back to session.
    pub fn actor(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.session_id)
    }

    /// Resolve a dotted field: `type`, `user_id`, `properties.x`, `context.x`,
    /// or a bare property name.
    pub fn field(&self, path: &str) -> Option<Value> {
        match path {
            "type" => Some(Value::String(self.event_type.clone())),
            "user_id" => self.user_id.clone().map(Value::String),
            "session_id" => Some(Value::String(self.session_id.clone())),
            _ => {
                if let Some(key) = path.strip_prefix("context.") {
                    self.context.get(key)
                } else {
                    let key = path.strip_prefix("properties.").unwrap_or(path);
                    self.properties.get(key).cloned()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: ConditionOp::Eq, value: value.into() }
    }

    pub fn matches(&self, event: &Event) -> bool {
        let actual = event.field(&self.field);
        match self.op {
            ConditionOp::Exists => actual.is_some(),
            ConditionOp::Eq => actual.as_ref() == Some(&self.value),
            ConditionOp::Ne => actual.as_ref() != Some(&self.value),
            ConditionOp::Gt => compare_numbers(actual.as_ref(), &self.value).map_or(false, |o| o > 0.0),
            ConditionOp::Lt => compare_numbers(actual.as_ref(), &self.value).map_or(false, |o| o < 0.0),
            ConditionOp::Contains => match (actual, self.value.as_str()) {
                (Some(Value::String(s)), Some(needle)) => s.contains(needle),
                (Some(Value::Array(items)), _) => items.contains(&self.value),
                _ => false,
            },
        }
    }
}

fn compare_numbers(actual: Option<&Value>, expected: &Value) -> Option<f64> {
    Some(actual?.as_f64()? - expected.as_f64()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrder {
    #[default]
    TimestampAsc,
    TimestampDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub event_types: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_ids: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Vec<Condition>,
    #[serde(default)]
    pub order_by: EventOrder,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start_time: Some(start), end_time: Some(end), ..Default::default() }
    }

    pub fn matches(&self, event: &Event) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && self.start_time.map_or(true, |s| event.timestamp >= s)
            && self.end_time.map_or(true, |e| event.timestamp < e)
            && self.user_ids.as_ref().map_or(true, |ids| {
                event.user_id.as_ref().map_or(false, |u| ids.contains(u))
            })
            && self.filters.iter().all(|c| c.matches(event))
    }
}

// ============================================================================
// Cohorts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CohortPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl CohortPeriod {
    /// Start of the period containing `date`. Weeks start on Monday.
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            CohortPeriod::Daily => date,
            CohortPeriod::Weekly => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            CohortPeriod::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    /// Whole periods between two period starts.
    pub fn offset(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        match self {
            CohortPeriod::Daily => (to - from).num_days(),
            CohortPeriod::Weekly => (to - from).num_days().div_euclid(7),
            CohortPeriod::Monthly => {
                (to.year() as i64 - from.year() as i64) * 12 + to.month() as i64 - from.month() as i64
            }
        }
    }

    /// Start of the period `n` periods after `start`.
    pub fn advance(&self, start: NaiveDate, n: u32) -> NaiveDate {
        match self {
            CohortPeriod::Daily => start + Duration::days(n as i64),
            CohortPeriod::Weekly => start + Duration::weeks(n as i64),
            CohortPeriod::Monthly => add_months(start, n),
        }
    }
}

pub fn add_months(date: NaiveDate, n: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + n as i32;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    NaiveDate::from_ymd_opt(year, month0 + 1, 1).unwrap_or(date)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: Uuid,
    pub name: String,
    pub period: CohortPeriod,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Conditions a user's first event must satisfy to join the cohort.
    #[serde(default)]
    pub criteria: BTreeMap<String, Value>,
    /// Set on first analysis; the cohort is frozen from then on.
    #[serde(default)]
    pub first_analyzed_at: Option<DateTime<Utc>>,
}

impl Cohort {
    pub fn is_frozen(&self) -> bool {
        self.first_analyzed_at.is_some()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError("cohort name is required".into()));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(CoreError::ValidationError("cohort end_date precedes start_date".into()));
            }
        }
        Ok(())
    }

    pub fn admits(&self, event: &Event) -> bool {
        self.criteria
            .iter()
            .all(|(field, expected)| event.field(field).as_ref() == Some(expected))
    }
}

// ============================================================================
// Funnels
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStep {
    pub order: u32,
    pub name: String,
    pub event_type: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl FunnelStep {
    pub fn matches(&self, event: &Event) -> bool {
        event.event_type == self.event_type && self.conditions.iter().all(|c| c.matches(event))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funnel {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<FunnelStep>,
    /// How long after the first step later steps still count.
    #[serde(default)]
    pub window_hours: Option<i64>,
}

impl Funnel {
    pub fn ordered_steps(&self) -> Vec<&FunnelStep> {
        let mut steps: Vec<&FunnelStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.steps.is_empty() {
            return Err(CoreError::ValidationError(format!("funnel {} has no steps", self.name)));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    pub fn event(event_type: &str, user: &str, at: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            user_id: Some(user.to_string()),
            session_id: format!("s-{}", user),
            timestamp: at,
            properties: BTreeMap::new(),
            context: EventContext::default(),
        }
    }

    #[test]
    fn test_context_decodes_known_keys() {
        let raw = json!({
            "id": Uuid::nil(),
            "type": "search",
            "session_id": "s1",
            "timestamp": "2025-03-01T10:00:00Z",
            "properties": {"origin": "LHR"},
            "context": {"device_type": "mobile", "utm_source": "mail", "screen": "1080p"}
        });
        let e: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(e.context.device_type.as_deref(), Some("mobile"));
        assert_eq!(e.context.extra.get("screen"), Some(&json!("1080p")));
        assert_eq!(e.field("context.utm_source"), Some(json!("mail")));
        assert_eq!(e.field("origin"), Some(json!("LHR")));
        assert_eq!(e.actor(), "s1");
    }

    #[test]
    fn test_conditions() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let mut e = event("purchase", "u1", at);
        e.properties.insert("amount".into(), json!(120));
        assert!(Condition::eq("type", "purchase").matches(&e));
        let gt = Condition { field: "amount".into(), op: ConditionOp::Gt, value: json!(100) };
        assert!(gt.matches(&e));
        let lt = Condition { field: "amount".into(), op: ConditionOp::Lt, value: json!(100) };
        assert!(!lt.matches(&e));
    }

    #[test]
    fn test_period_arithmetic() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap(); // Thursday
        assert_eq!(CohortPeriod::Weekly.start_of(d), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(CohortPeriod::Monthly.start_of(d), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(CohortPeriod::Monthly.offset(jan, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()), 3);
        assert_eq!(add_months(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(), 3), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
    }
}
