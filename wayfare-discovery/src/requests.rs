use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::scoring::PriceEstimate;
use wayfare_core::cache::CacheNamespace;
use wayfare_core::destination::{BudgetLevel, Destination, MatchCriteria, PriceRange, RouteDuration, Theme};
use wayfare_core::iata::is_airport_code;
use wayfare_core::validation::FieldErrors;
use wayfare_shared::AppError;

pub const MAX_THEME_LIMIT: usize = 100;
pub const MAX_EXPLORE_RESULTS: usize = 50;
pub const MAX_EXPLORE_HOURS: f64 = 24.0;

fn default_min_score() -> u8 {
    60
}

fn default_theme_limit() -> usize {
    20
}

fn default_explore_results() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeRequest {
    #[serde(default)]
    pub origin: Option<String>,
    pub theme: Theme,
    #[serde(default = "default_min_score")]
    pub min_score: u8,
    #[serde(default = "default_theme_limit")]
    pub limit: usize,
    /// Hours.
    #[serde(default)]
    pub max_flight_time: Option<f64>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub include_countries: Vec<String>,
    #[serde(default)]
    pub exclude_countries: Vec<String>,
}

impl ThemeRequest {
    pub fn new(theme: Theme) -> Self {
        Self {
            origin: None,
            theme,
            min_score: default_min_score(),
            limit: default_theme_limit(),
            max_flight_time: None,
            price_range: None,
            include_countries: Vec::new(),
            exclude_countries: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if let Some(origin) = &self.origin {
            errors.check(is_airport_code(origin), "origin", "must be a 3-letter airport code");
        }
        errors.check(
            (1..=MAX_THEME_LIMIT).contains(&self.limit),
            "limit",
            "must be between 1 and 100",
        );
        if let Some(hours) = self.max_flight_time {
            errors.check(hours > 0.0, "max_flight_time", "must be positive");
        }
        errors.into_result("invalid theme recommendation request")
    }

    /// Whether a projection row survives the request's filters.
    pub fn admits(&self, destination_country: &str, flight_hours: f64, price_range: PriceRange) -> bool {
        self.max_flight_time.map_or(true, |max| flight_hours <= max)
            && self.price_range.map_or(true, |wanted| wanted == price_range)
            && (self.include_countries.is_empty()
                || self.include_countries.iter().any(|c| c.eq_ignore_ascii_case(destination_country)))
            && !self.exclude_countries.iter().any(|c| c.eq_ignore_ascii_case(destination_country))
    }

    /// Every input contributes; the hour is appended so entries roll over hourly.
    pub fn cache_key(&self, now: DateTime<Utc>) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        let suffix = format!("theme:{}:{}", self.theme, hex::encode(&digest[..12]));
        CacheNamespace::Recommendations.hourly_key(&suffix, now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub destination: Destination,
    pub theme_score: u8,
    /// Set when the request names an origin with a known route.
    pub flight_minutes: Option<u32>,
    pub estimated_price: PriceEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryStats {
    pub country_code: String,
    pub country: String,
    pub destinations: usize,
    pub average_theme_score: f64,
    pub best_theme_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeRecommendations {
    pub theme: Theme,
    pub recommendations: Vec<Recommendation>,
    pub countries: Vec<CountryStats>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreRequest {
    pub origin: String,
    pub min_flight_duration_hours: f64,
    pub max_flight_duration_hours: f64,
    #[serde(default)]
    pub preferred_activities: Vec<String>,
    #[serde(default)]
    pub budget_level: BudgetLevel,
    #[serde(default = "default_explore_results")]
    pub max_results: usize,
    #[serde(default)]
    pub include_visa_required: bool,
}

impl ExploreRequest {
    pub fn new(origin: &str, min_hours: f64, max_hours: f64) -> Self {
        Self {
            origin: origin.to_string(),
            min_flight_duration_hours: min_hours,
            max_flight_duration_hours: max_hours,
            preferred_activities: Vec::new(),
            budget_level: BudgetLevel::Any,
            max_results: default_explore_results(),
            include_visa_required: false,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check(is_airport_code(&self.origin), "origin", "must be a 3-letter airport code");
        errors.check(
            (0.0..=MAX_EXPLORE_HOURS).contains(&self.min_flight_duration_hours),
            "min_flight_duration_hours",
            "must be between 0 and 24",
        );
        errors.check(
            (0.0..=MAX_EXPLORE_HOURS).contains(&self.max_flight_duration_hours),
            "max_flight_duration_hours",
            "must be between 0 and 24",
        );
        errors.check(
            self.max_flight_duration_hours >= self.min_flight_duration_hours,
            "max_flight_duration_hours",
            "must not be below min_flight_duration_hours",
        );
        errors.check(
            (1..=MAX_EXPLORE_RESULTS).contains(&self.max_results),
            "max_results",
            "must be between 1 and 50",
        );
        errors.into_result("invalid exploration request")
    }

    /// Hour bounds as whole minutes for the duration table.
    pub fn minute_bounds(&self) -> (u32, u32) {
        (
            (self.min_flight_duration_hours * 60.0).round() as u32,
            (self.max_flight_duration_hours * 60.0).round() as u32,
        )
    }

    pub fn criteria(&self) -> MatchCriteria {
        MatchCriteria {
            preferred_activities: self.preferred_activities.clone(),
            budget_level: self.budget_level,
            include_visa_required: self.include_visa_required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreResult {
    pub destination: Destination,
    pub route: RouteDuration,
    pub match_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarDestination {
    pub destination: Destination,
    pub similarity: f64,
}
