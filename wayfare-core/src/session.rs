use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::{CabinClass, FlightSearchRequest};

pub fn session_lifetime() -> Duration {
    Duration::hours(24)
}

/// One interactive search, kept for a day so results can be paged and shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub search_params: serde_json::Value,
    pub results_count: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SearchSession {
    pub fn open(
        user_id: Option<String>,
        request: &FlightSearchRequest,
        results_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            search_params: serde_json::to_value(request)?,
            results_count: results_count as i32,
            created_at: now,
            expires_at: now + session_lifetime(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passengers: i32,
    pub cabin_class: CabinClass,
    pub results_count: i32,
    pub searched_at: DateTime<Utc>,
}

impl SearchHistoryEntry {
    pub fn record(
        user_id: Option<String>,
        request: &FlightSearchRequest,
        results_count: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            departure_date: request.departure_date,
            return_date: request.return_date,
            passengers: request.passenger_count() as i32,
            cabin_class: request.cabin_class,
            results_count: results_count as i32,
            searched_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expires_after_a_day() {
        let now = Utc::now();
        let req = FlightSearchRequest::one_way("LHR", "CDG", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let session = SearchSession::open(None, &req, 12, now).unwrap();
        assert_eq!(session.search_params["origin"], "LHR");
        assert!(!session.is_expired(now + Duration::hours(23)));
        assert!(session.is_expired(now + Duration::hours(24)));

        let entry = SearchHistoryEntry::record(Some("u1".into()), &req, 12, now);
        assert_eq!(entry.passengers, 1);
    }
}
