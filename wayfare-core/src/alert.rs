use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::iata::{is_airport_code, route_id};
use crate::money::is_supported_currency;
use crate::price::{PriceComparisonRequest, TripType};
use crate::search::CabinClass;
use crate::validation::FieldErrors;
use wayfare_shared::models::events::AlertTriggeredEvent;
use wayfare_shared::{AppError, Masked};

pub const MAX_ACTIVE_ALERTS: usize = 5;

/// Minimum time between two triggers of the same alert.
pub fn suppression_window() -> Duration {
    Duration::hours(4)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: Uuid,
    pub user_id: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub max_price: Decimal,
    pub currency: String,
    pub trip_type: TripType,
    pub passenger_count: u8,
    pub cabin_class: CabinClass,
    pub notification_email: Masked<String>,
    pub is_active: bool,
    pub trigger_count: i32,
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PriceAlert {
    pub fn route_id(&self) -> String {
        route_id(&self.origin, &self.destination)
    }

    /// Active, unexpired, and outside the suppression window.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.expires_at > now
            && self
                .last_triggered
                .map_or(true, |last| now - last > suppression_window())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_satisfied_by(&self, price: Decimal) -> bool {
        price <= self.max_price
    }

    /// Query used by the evaluation loop: the single best current price.
    pub fn comparison_request(&self) -> PriceComparisonRequest {
        PriceComparisonRequest {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_date: self.departure_date,
            return_date: self.return_date,
            trip_type: self.trip_type,
            passenger_count: self.passenger_count,
            cabin_class: Some(self.cabin_class),
            currency: Some(self.currency.clone()),
            max_results: 1,
        }
    }

    pub fn triggered_event(&self, price: Decimal, at: DateTime<Utc>) -> AlertTriggeredEvent {
        AlertTriggeredEvent {
            alert_id: self.id,
            user_id: self.user_id.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_date: self.departure_date,
            price,
            max_price: self.max_price,
            currency: self.currency.clone(),
            notification_email: self.notification_email.clone(),
            trigger_count: self.trigger_count,
            triggered_at: at,
        }
    }
}

fn default_expiry_days() -> i64 {
    30
}

fn default_passengers() -> u8 {
    1
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAlertRequest {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    pub max_price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default = "default_passengers")]
    pub passenger_count: u8,
    #[serde(default)]
    pub cabin_class: CabinClass,
    pub notification_email: String,
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
}

impl CreateAlertRequest {
    pub fn validate(&self, today: NaiveDate) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check(is_airport_code(&self.origin), "origin", "must be a 3-letter airport code");
        errors.check(
            is_airport_code(&self.destination),
            "destination",
            "must be a 3-letter airport code",
        );
        errors.check(self.origin != self.destination, "destination", "must differ from origin");
        errors.check(self.departure_date >= today, "departure_date", "must not be in the past");
        if self.trip_type == TripType::Return {
            match self.return_date {
                None => errors.add("return_date", "is required for return trips"),
                Some(r) => errors.check(
                    r >= self.departure_date,
                    "return_date",
                    "must not be before departure_date",
                ),
            }
        }
        errors.check(self.max_price > Decimal::ZERO, "max_price", "must be greater than zero");
        errors.check(
            (1..=9).contains(&self.passenger_count),
            "passenger_count",
            "must be between 1 and 9",
        );
        errors.check(
            (1..=365).contains(&self.expiry_days),
            "expiry_days",
            "must be between 1 and 365",
        );
        errors.check(is_supported_currency(&self.currency), "currency", "must be one of EUR, USD, GBP");
        errors.check(
            !self.notification_email.trim().is_empty(),
            "notification_email",
            "is required",
        );
        errors.into_result("invalid price alert")
    }

    pub fn into_alert(self, user_id: &str, now: DateTime<Utc>) -> PriceAlert {
        PriceAlert {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            origin: self.origin,
            destination: self.destination,
            departure_date: self.departure_date,
            return_date: self.return_date,
            max_price: self.max_price,
            currency: self.currency,
            trip_type: self.trip_type,
            passenger_count: self.passenger_count,
            cabin_class: self.cabin_class,
            notification_email: Masked::new(self.notification_email.trim().to_string()),
            is_active: true,
            trigger_count: 0,
            last_triggered: None,
            created_at: now,
            expires_at: now + Duration::days(self.expiry_days),
        }
    }
}
