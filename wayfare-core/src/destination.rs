use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

// ============================================================================
// Themes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Party,
    Adventure,
    Learn,
    Shopping,
    Beach,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Party,
        Theme::Adventure,
        Theme::Learn,
        Theme::Shopping,
        Theme::Beach,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Party => "party",
            Theme::Adventure => "adventure",
            Theme::Learn => "learn",
            Theme::Shopping => "shopping",
            Theme::Beach => "beach",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| CoreError::ValidationError(format!("unknown theme '{}'", s)))
    }
}

/// Display metadata for a theme, stored in `theme_definitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDefinition {
    pub theme: Theme,
    pub display_name: String,
    pub description: String,
    pub icon: Option<String>,
}

impl ThemeDefinition {
    pub fn builtin() -> Vec<ThemeDefinition> {
        let define = |theme: Theme, display_name: &str, description: &str, icon: &str| ThemeDefinition {
            theme,
            display_name: display_name.to_string(),
            description: description.to_string(),
            icon: Some(icon.to_string()),
        };
        vec![
            define(Theme::Party, "Party", "Nightlife, festivals and late nights", "music"),
            define(Theme::Adventure, "Adventure", "Mountains, hiking and outdoor sports", "mountain"),
            define(Theme::Learn, "Learn", "Museums, history and culture", "book"),
            define(Theme::Shopping, "Shopping", "Markets, boutiques and malls", "bag"),
            define(Theme::Beach, "Beach", "Sun, sea and coastline", "sun"),
        ]
    }
}

// ============================================================================
// Price Range / Budget
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceRange {
    #[serde(rename = "budget")]
    Budget,
    #[serde(rename = "mid-range")]
    MidRange,
    #[serde(rename = "luxury")]
    Luxury,
}

impl PriceRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceRange::Budget => "budget",
            PriceRange::MidRange => "mid-range",
            PriceRange::Luxury => "luxury",
        }
    }
}

impl FromStr for PriceRange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "budget" => Ok(PriceRange::Budget),
            "mid-range" => Ok(PriceRange::MidRange),
            "luxury" => Ok(PriceRange::Luxury),
            other => Err(CoreError::ValidationError(format!("unknown price range '{}'", other))),
        }
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget requested by a traveler; `Any` waives the budget criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetLevel {
    Any,
    Budget,
    MidRange,
    Luxury,
}

impl Default for BudgetLevel {
    fn default() -> Self {
        BudgetLevel::Any
    }
}

impl BudgetLevel {
    pub fn matches(&self, range: PriceRange) -> bool {
        match self {
            BudgetLevel::Any => true,
            BudgetLevel::Budget => range == PriceRange::Budget,
            BudgetLevel::MidRange => range == PriceRange::MidRange,
            BudgetLevel::Luxury => range == PriceRange::Luxury,
        }
    }
}

// ============================================================================
// Destination
// ============================================================================

/// The source of truth for a destination. Theme scores are 0..=100, activity
/// scores 0.0..=10.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: Uuid,
    pub iata_code: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub description: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    pub theme_scores: BTreeMap<Theme, u8>,
    #[serde(default)]
    pub activities: BTreeMap<String, f64>,
    /// Hours.
    pub average_flight_time: f64,
    pub price_range: PriceRange,
    #[serde(default)]
    pub best_months: BTreeSet<u8>,
    pub popularity_score: u8,
    pub timezone: String,
    #[serde(default)]
    pub languages: Vec<String>,
    pub currency: String,
    pub visa_required: bool,
    #[serde(default)]
    pub climate_type: Option<String>,
}

impl Destination {
    pub const MAX_SCORE: u8 = 100;

    pub fn validate(&self) -> CoreResult<()> {
        if let Some((theme, score)) = self.theme_scores.iter().find(|(_, s)| **s > Self::MAX_SCORE) {
            return Err(CoreError::ValidationError(format!(
                "{}: theme score {} for {} is outside 0..=100",
                self.iata_code, score, theme
            )));
        }
        if self.popularity_score > Self::MAX_SCORE {
            return Err(CoreError::ValidationError(format!(
                "{}: popularity {} is outside 0..=100",
                self.iata_code, self.popularity_score
            )));
        }
        if let Some(month) = self.best_months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(CoreError::ValidationError(format!(
                "{}: month {} is not a calendar month",
                self.iata_code, month
            )));
        }
        if self.activities.values().any(|s| !(0.0..=10.0).contains(s)) {
            return Err(CoreError::ValidationError(format!(
                "{}: activity scores must be within 0..=10",
                self.iata_code
            )));
        }
        Ok(())
    }

    pub fn theme_score(&self, theme: Theme) -> u8 {
        self.theme_scores.get(&theme).copied().unwrap_or(0)
    }

    pub fn activity_score(&self, activity: &str) -> f64 {
        self.activities.get(activity).copied().unwrap_or(0.0)
    }

    /// Base fit of this destination for a traveler: activities 60%, budget 20%,
    /// visa 10%, popularity 10%. Returns 0..=100.
    pub fn match_score(&self, criteria: &MatchCriteria) -> f64 {
        let activity_fraction = if criteria.preferred_activities.is_empty() {
            1.0
        } else {
            let total: f64 = criteria
                .preferred_activities
                .iter()
                .map(|a| self.activity_score(a))
                .sum();
            total / criteria.preferred_activities.len() as f64 / 10.0
        };

        let budget_fraction = if criteria.budget_level.matches(self.price_range) { 1.0 } else { 0.0 };

        let visa_fraction = match (self.visa_required, criteria.include_visa_required) {
            (false, _) => 1.0,
            (true, true) => 0.5,
            (true, false) => 0.0,
        };

        let popularity_fraction = self.popularity_score as f64 / 100.0;

        let score = activity_fraction * 60.0
            + budget_fraction * 20.0
            + visa_fraction * 10.0
            + popularity_fraction * 10.0;
        score.clamp(0.0, 100.0)
    }
}

/// Traveler preferences used by [`Destination::match_score`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    pub preferred_activities: Vec<String>,
    pub budget_level: BudgetLevel,
    pub include_visa_required: bool,
}

/// Denormalized projection row of `destinations_by_theme`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub theme: Theme,
    pub theme_score: u8,
    pub destination_id: Uuid,
    pub iata_code: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub average_flight_time: f64,
    pub price_range: PriceRange,
    pub popularity_score: u8,
}

impl ThemeEntry {
    /// One projection row per theme the destination scores on.
    pub fn project(destination: &Destination) -> Vec<ThemeEntry> {
        destination
            .theme_scores
            .iter()
            .map(|(theme, score)| ThemeEntry {
                theme: *theme,
                theme_score: *score,
                destination_id: destination.id,
                iata_code: destination.iata_code.clone(),
                city: destination.city.clone(),
                country: destination.country.clone(),
                country_code: destination.country_code.clone(),
                average_flight_time: destination.average_flight_time,
                price_range: destination.price_range,
                popularity_score: destination.popularity_score,
            })
            .collect()
    }
}

// ============================================================================
// Route Duration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDuration {
    pub origin: String,
    pub destination: String,
    pub duration_minutes: u32,
    pub distance_km: f64,
    pub is_direct: bool,
    pub typical_stops: u32,
}

impl RouteDuration {
    pub const MIN_DURATION_MINUTES: u32 = 45;
    /// Routes at or under this length are considered intra-region.
    pub const INTRA_REGION_MINUTES: u32 = 8 * 60;

    pub fn validate(&self) -> CoreResult<()> {
        if self.duration_minutes < Self::MIN_DURATION_MINUTES {
            return Err(CoreError::ValidationError(format!(
                "{}-{}: duration {} below {} minutes",
                self.origin, self.destination, self.duration_minutes, Self::MIN_DURATION_MINUTES
            )));
        }
        if self.distance_km <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "{}-{}: distance must be positive",
                self.origin, self.destination
            )));
        }
        Ok(())
    }

    pub fn is_intra_region(&self) -> bool {
        self.duration_minutes <= Self::INTRA_REGION_MINUTES
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes as f64 / 60.0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn destination(code: &str, theme_scores: &[(Theme, u8)]) -> Destination {
        Destination {
            id: Uuid::new_v4(),
            iata_code: code.to_string(),
            city: format!("City {}", code),
            country: "Spain".to_string(),
            country_code: "ES".to_string(),
            description: String::new(),
            highlights: vec![],
            theme_scores: theme_scores.iter().copied().collect(),
            activities: BTreeMap::new(),
            average_flight_time: 2.5,
            price_range: PriceRange::MidRange,
            best_months: [5, 6, 9].into_iter().collect(),
            popularity_score: 70,
            timezone: "Europe/Madrid".to_string(),
            languages: vec!["es".to_string()],
            currency: "EUR".to_string(),
            visa_required: false,
            climate_type: Some("mediterranean".to_string()),
        }
    }

    #[test]
    fn test_theme_round_trip() {
        assert_eq!("Beach".parse::<Theme>().unwrap(), Theme::Beach);
        assert!("ski".parse::<Theme>().is_err());
        assert_eq!(serde_json::to_string(&PriceRange::MidRange).unwrap(), "\"mid-range\"");
    }

    #[test]
    fn test_theme_scores_bounded() {
        let mut d = destination("BCN", &[(Theme::Beach, 90)]);
        assert!(d.validate().is_ok());
        d.theme_scores.insert(Theme::Party, 101);
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_match_score_weights() {
        let mut d = destination("BCN", &[(Theme::Beach, 90)]);
        d.activities.insert("beach".to_string(), 8.0);
        d.activities.insert("nightlife".to_string(), 6.0);
        d.popularity_score = 80;

        let criteria = MatchCriteria {
            preferred_activities: vec!["beach".to_string(), "nightlife".to_string()],
            budget_level: BudgetLevel::MidRange,
            include_visa_required: false,
        };
        // 0.7 * 60 + 20 + 10 + 8
        let score = d.match_score(&criteria);
        assert!((score - 80.0).abs() < 1e-9);

        let luxury = MatchCriteria { budget_level: BudgetLevel::Luxury, ..criteria };
        assert!((d.match_score(&luxury) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_projection_rows() {
        let d = destination("LIS", &[(Theme::Beach, 85), (Theme::Learn, 70)]);
        let rows = ThemeEntry::project(&d);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.destination_id == d.id));
    }

    #[test]
    fn test_route_duration_region() {
        let r = RouteDuration {
            origin: "LHR".into(),
            destination: "ATH".into(),
            duration_minutes: 220,
            distance_km: 2400.0,
            is_direct: true,
            typical_stops: 0,
        };
        assert!(r.validate().is_ok());
        assert!(r.is_intra_region());
    }
}
