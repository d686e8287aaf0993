use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::iata::{is_airport_code, route_id};
use crate::money::is_supported_currency;
use crate::search::CabinClass;
use crate::validation::FieldErrors;
use crate::{CoreError, CoreResult};
use wayfare_shared::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Oneway,
    Return,
}

impl TripType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripType::Oneway => "oneway",
            TripType::Return => "return",
        }
    }
}

impl Default for TripType {
    fn default() -> Self {
        TripType::Oneway
    }
}

impl fmt::Display for TripType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oneway" => Ok(TripType::Oneway),
            "return" => Ok(TripType::Return),
            other => Err(CoreError::InvalidFormat(format!("trip type '{}'", other))),
        }
    }
}

// ============================================================================
// Price Sample
// ============================================================================

/// One observed price for a route, valid until `valid_until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub id: Uuid,
    pub provider: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub passenger_count: u8,
    pub cabin_class: CabinClass,
    pub price: Decimal,
    pub currency: String,
    pub is_refundable: bool,
    pub baggage_included: bool,
    pub direct_flight: bool,
    pub duration_minutes: Option<u32>,
    pub booking_url: Option<String>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn route_id(&self) -> String {
        route_id(&self.origin, &self.destination)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    pub fn fingerprint(&self) -> PriceFingerprint {
        PriceFingerprint {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_date: self.departure_date,
            trip_type: self.trip_type,
            passenger_count: self.passenger_count,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !is_airport_code(&self.origin) || !is_airport_code(&self.destination) {
            return Err(CoreError::ValidationError(format!(
                "sample {}: route {}-{} is not a pair of airport codes",
                self.id, self.origin, self.destination
            )));
        }
        if self.price <= Decimal::ZERO {
            return Err(CoreError::ValidationError(format!(
                "sample {}: price must be positive",
                self.id
            )));
        }
        if self.valid_until <= self.created_at {
            return Err(CoreError::ValidationError(format!(
                "sample {}: valid_until must be after created_at",
                self.id
            )));
        }
        Ok(())
    }
}

/// The tuple used to key cached comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceFingerprint {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub trip_type: TripType,
    pub passenger_count: u8,
}

impl PriceFingerprint {
    pub fn cache_suffix(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.origin, self.destination, self.departure_date, self.trip_type, self.passenger_count
        )
    }
}

// ============================================================================
// Comparison
// ============================================================================

fn default_passengers() -> u8 {
    1
}

fn default_comparison_results() -> u16 {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceComparisonRequest {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default = "default_passengers")]
    pub passenger_count: u8,
    #[serde(default)]
    pub cabin_class: Option<CabinClass>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_comparison_results")]
    pub max_results: u16,
}

impl PriceComparisonRequest {
    pub fn new(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            return_date: None,
            trip_type: TripType::Oneway,
            passenger_count: 1,
            cabin_class: None,
            currency: None,
            max_results: default_comparison_results(),
        }
    }

    pub fn fingerprint(&self) -> PriceFingerprint {
        PriceFingerprint {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_date: self.departure_date,
            trip_type: self.trip_type,
            passenger_count: self.passenger_count,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check(is_airport_code(&self.origin), "origin", "must be a 3-letter airport code");
        errors.check(
            is_airport_code(&self.destination),
            "destination",
            "must be a 3-letter airport code",
        );
        errors.check(self.origin != self.destination, "destination", "must differ from origin");
        errors.check(
            (1..=9).contains(&self.passenger_count),
            "passenger_count",
            "must be between 1 and 9",
        );
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
        if let Some(currency) = &self.currency {
            errors.check(is_supported_currency(currency), "currency", "must be one of EUR, USD, GBP");
        }
        errors.check(
            (1..=250).contains(&self.max_results),
            "max_results",
            "must be between 1 and 250",
        );
        errors.into_result("invalid price comparison request")
    }

    /// Whether a stored sample answers this request.
    pub fn matches(&self, sample: &PriceSample) -> bool {
        sample.origin == self.origin
            && sample.destination == self.destination
            && sample.departure_date == self.departure_date
            && sample.trip_type == self.trip_type
            && sample.passenger_count == self.passenger_count
            && self.cabin_class.map_or(true, |c| c == sample.cabin_class)
            && self.currency.as_ref().map_or(true, |c| *c == sample.currency)
            && (self.trip_type == TripType::Oneway || sample.return_date == self.return_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComparison {
    pub best: Option<PriceSample>,
    pub average: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub provider_count: usize,
    pub prices: Vec<PriceSample>,
}

impl PriceComparison {
    /// Build a comparison from samples already sorted ascending by price.
    pub fn from_sorted(prices: Vec<PriceSample>) -> Self {
        if prices.is_empty() {
            return Self {
                best: None,
                average: None,
                spread: None,
                provider_count: 0,
                prices,
            };
        }
        let total: Decimal = prices.iter().map(|p| p.price).sum();
        let average = total / Decimal::from(prices.len());
        let min = prices[0].price;
        let max = prices[prices.len() - 1].price;
        let mut providers: Vec<&str> = prices.iter().map(|p| p.provider.as_str()).collect();
        providers.sort_unstable();
        providers.dedup();

        Self {
            best: Some(prices[0].clone()),
            average: Some(average.round_dp(2)),
            spread: Some(max - min),
            provider_count: providers.len(),
            prices,
        }
    }

    /// Keep only the cheapest `n` entries. Statistics keep covering the full set.
    pub fn truncated(mut self, n: usize) -> Self {
        self.prices.truncate(n);
        self
    }
}

// ============================================================================
// Daily History
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub route_id: String,
    pub date: NaiveDate,
    pub average_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub sample_count: i32,
    pub currency: String,
}

impl PriceHistory {
    /// `min <= avg <= max` and at least one sample.
    pub fn is_consistent(&self) -> bool {
        self.sample_count > 0
            && self.min_price <= self.average_price
            && self.average_price <= self.max_price
    }
}

/// Roll samples up into one row per (route, departure day, currency).
pub fn rollup(samples: &[PriceSample]) -> Vec<PriceHistory> {
    let mut groups: BTreeMap<(String, NaiveDate, String), Vec<Decimal>> = BTreeMap::new();
    for s in samples {
        groups
            .entry((s.route_id(), s.departure_date, s.currency.clone()))
            .or_default()
            .push(s.price);
    }

    groups
        .into_iter()
        .map(|((route_id, date, currency), prices)| {
            let total: Decimal = prices.iter().sum();
            let min = prices.iter().copied().min().unwrap_or_default();
            let max = prices.iter().copied().max().unwrap_or_default();
            let average = (total / Decimal::from(prices.len())).round_dp(2).clamp(min, max);
            PriceHistory {
                route_id,
                date,
                average_price: average,
                min_price: min,
                max_price: max,
                sample_count: prices.len() as i32,
                currency,
            }
        })
        .collect()
}

// ============================================================================
// Trend
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTrend {
    pub route_id: String,
    pub series: Vec<PriceHistory>,
    /// Currency units per day.
    pub slope_per_day: f64,
    pub direction: TrendDirection,
    /// Extrapolated average for the day after the last observation.
    pub predicted_next: Option<Decimal>,
}

impl PriceTrend {
    /// Least-squares fit over the daily averages. A slope under 1% of the
    /// mean per day is stable.
    pub fn fit(route_id: &str, mut series: Vec<PriceHistory>) -> Self {
        series.sort_by_key(|h| h.date);
        let points: Vec<(f64, f64)> = match series.first() {
            Some(first) => series
                .iter()
                .filter_map(|h| {
                    let x = (h.date - first.date).num_days() as f64;
                    h.average_price.to_f64().map(|y| (x, y))
                })
                .collect(),
            None => Vec::new(),
        };

        if points.len() < 2 {
            return Self {
                route_id: route_id.to_string(),
                predicted_next: series.last().map(|h| h.average_price),
                series,
                slope_per_day: 0.0,
                direction: TrendDirection::Stable,
            };
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
        let sxy: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        let intercept = mean_y - slope * mean_x;

        let direction = if mean_y == 0.0 || slope.abs() < mean_y.abs() * 0.01 {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Rising
        } else {
            TrendDirection::Falling
        };

        let next_x = points.last().map(|(x, _)| x + 1.0).unwrap_or(0.0);
        let predicted = (intercept + slope * next_x).max(0.0);

        Self {
            route_id: route_id.to_string(),
            series,
            slope_per_day: slope,
            direction,
            predicted_next: Decimal::from_f64_retain(predicted).map(|d| d.round_dp(2)),
        }
    }
}
