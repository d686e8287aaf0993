//! Pure scoring functions: no I/O, deterministic for a given input.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use wayfare_core::destination::{Destination, MatchCriteria};
use wayfare_core::money::format_amount;

pub const DURATION_BONUS: f64 = 5.0;
pub const ACTIVITY_BONUS: f64 = 10.0;
pub const POPULARITY_BONUS: f64 = 3.0;

/// Minimum similarity for a destination to be suggested as an alternative.
pub const SIMILARITY_THRESHOLD: f64 = 50.0;
/// Activities below this score do not count as shared.
pub const SHARED_ACTIVITY_FLOOR: f64 = 6.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Up to +5 for flights in the lower half of `[min_hours, max_hours]`,
/// falling linearly to zero at the midpoint.
pub fn duration_bonus(duration_hours: f64, min_hours: f64, max_hours: f64) -> f64 {
    let span = max_hours - min_hours;
    if span <= 0.0 {
        return DURATION_BONUS;
    }
    let position = ((duration_hours - min_hours) / span).clamp(0.0, 1.0);
    if position >= 0.5 {
        0.0
    } else {
        DURATION_BONUS * (1.0 - position * 2.0)
    }
}

/// Mean score (0..=10) of the preferred activities the destination offers.
pub fn activity_bonus(destination: &Destination, preferred: &[String]) -> f64 {
    let offered: Vec<f64> = preferred
        .iter()
        .filter_map(|a| destination.activities.get(a).copied())
        .filter(|s| *s > 0.0)
        .collect();
    if offered.is_empty() {
        return 0.0;
    }
    let mean = offered.iter().sum::<f64>() / offered.len() as f64;
    mean.min(ACTIVITY_BONUS)
}

pub fn popularity_bonus(destination: &Destination) -> f64 {
    destination.popularity_score as f64 / 100.0 * POPULARITY_BONUS
}

/// Base match score plus the exploration bonuses, clamped to 0..=100 and
/// rounded to one decimal.
pub fn exploration_score(
    destination: &Destination,
    criteria: &MatchCriteria,
    duration_hours: f64,
    min_hours: f64,
    max_hours: f64,
) -> f64 {
    let score = destination.match_score(criteria)
        + duration_bonus(duration_hours, min_hours, max_hours)
        + activity_bonus(destination, &criteria.preferred_activities)
        + popularity_bonus(destination);
    round1(score.clamp(0.0, 100.0))
}

/// Budget 30, shared strong activities 40, climate 15, popularity 15.
pub fn similarity(target: &Destination, candidate: &Destination) -> f64 {
    let budget = if target.price_range == candidate.price_range { 30.0 } else { 0.0 };

    let activities = if target.activities.is_empty() {
        0.0
    } else {
        let shared = target
            .activities
            .iter()
            .filter(|(name, score)| {
                **score >= SHARED_ACTIVITY_FLOOR && candidate.activity_score(name) >= SHARED_ACTIVITY_FLOOR
            })
            .count();
        shared as f64 / target.activities.len() as f64 * 40.0
    };

    let climate = match (&target.climate_type, &candidate.climate_type) {
        (Some(a), Some(b)) if a == b => 15.0,
        _ => 0.0,
    };

    let delta = (target.popularity_score as f64 - candidate.popularity_score as f64).abs();
    let popularity = (1.0 - delta / 100.0) * 15.0;

    round1((budget + activities + climate + popularity).clamp(0.0, 100.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub destination: String,
    pub currency: String,
    pub estimate: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub formatted: String,
    pub flight_hours: f64,
}

/// Heuristic fare: `(50 + 30 × hours) × (1 + popularity/200)`, to the nearest 10,
/// with a ±20% band. Not a quote.
pub fn estimate_price(destination: &Destination, flight_hours: f64) -> PriceEstimate {
    let hours = Decimal::from_f64(flight_hours.max(0.0)).unwrap_or(Decimal::ZERO);
    let base = Decimal::from(50) + hours * Decimal::from(30);
    let factor = Decimal::ONE + Decimal::from(destination.popularity_score) / Decimal::from(200);
    let ten = Decimal::from(10);
    let estimate = ((base * factor) / ten)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        * ten;
    let low = (estimate * Decimal::new(8, 1)).round_dp(2).normalize();
    let high = (estimate * Decimal::new(12, 1)).round_dp(2).normalize();
    let estimate = estimate.normalize();

    PriceEstimate {
        destination: destination.iata_code.clone(),
        currency: destination.currency.clone(),
        formatted: format!(
            "{} - {}",
            format_amount(low, &destination.currency),
            format_amount(high, &destination.currency)
        ),
        estimate,
        low,
        high,
        flight_hours,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, BTreeSet};
    use uuid::Uuid;
    use wayfare_core::destination::{BudgetLevel, PriceRange, Theme};

    pub fn destination(code: &str, country_code: &str, scores: &[(Theme, u8)]) -> Destination {
        Destination {
            id: Uuid::new_v4(),
            iata_code: code.to_string(),
            city: format!("City {}", code),
            country: format!("Country {}", country_code),
            country_code: country_code.to_string(),
            description: String::new(),
            highlights: vec![],
            theme_scores: scores.iter().copied().collect(),
            activities: BTreeMap::new(),
            average_flight_time: 2.5,
            price_range: PriceRange::MidRange,
            best_months: BTreeSet::new(),
            popularity_score: 70,
            timezone: "Europe/Madrid".to_string(),
            languages: vec![],
            currency: "EUR".to_string(),
            visa_required: false,
            climate_type: Some("mediterranean".to_string()),
        }
    }

    #[test]
    fn test_duration_bonus_favors_lower_half() {
        assert_eq!(duration_bonus(1.0, 1.0, 3.0), 5.0);
        assert_eq!(duration_bonus(1.5, 1.0, 3.0), 2.5);
        assert_eq!(duration_bonus(2.0, 1.0, 3.0), 0.0);
        assert_eq!(duration_bonus(2.9, 1.0, 3.0), 0.0);
    }

    #[test]
    fn test_exploration_score_is_clamped() {
        let mut d = destination("BCN", "ES", &[]);
        d.activities.insert("beach".into(), 10.0);
        d.popularity_score = 100;
        let criteria = MatchCriteria {
            preferred_activities: vec!["beach".into()],
            budget_level: BudgetLevel::Any,
            include_visa_required: false,
        };
        assert_eq!(exploration_score(&d, &criteria, 1.0, 1.0, 3.0), 100.0);
    }

    #[test]
    fn test_exploration_score_rounds_to_one_decimal() {
        let mut d = destination("LIS", "PT", &[]);
        d.activities.insert("surf".into(), 7.0);
        d.popularity_score = 33;
        let criteria = MatchCriteria {
            preferred_activities: vec!["surf".into(), "museums".into()],
            budget_level: BudgetLevel::Luxury,
            include_visa_required: false,
        };
        // 0.35*60 + 0 + 10 + 3.3 = 34.3; bonuses 2.5 + 7.0 + 0.99
        let score = exploration_score(&d, &criteria, 1.5, 1.0, 3.0);
        assert_eq!(score, 44.8);
    }

    #[test]
    fn test_similarity_components() {
        let mut target = destination("BCN", "ES", &[]);
        target.activities.insert("beach".into(), 9.0);
        target.activities.insert("nightlife".into(), 8.0);
        let mut twin = destination("VLC", "ES", &[]);
        twin.activities.insert("beach".into(), 8.0);
        twin.activities.insert("nightlife".into(), 5.0);
        twin.popularity_score = 50;
        // 30 + 20 + 15 + 0.8*15
        assert_eq!(similarity(&target, &twin), 77.0);

        twin.price_range = PriceRange::Luxury;
        twin.climate_type = Some("continental".into());
        assert!(similarity(&target, &twin) < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_estimate_price_band() {
        let mut d = destination("ATH", "GR", &[]);
        d.popularity_score = 80;
        let estimate = estimate_price(&d, 3.5);
        // (50 + 105) * 1.4 = 217 -> 220
        assert_eq!(estimate.estimate, dec!(220));
        assert_eq!(estimate.low, dec!(176));
        assert_eq!(estimate.high, dec!(264));
        assert_eq!(estimate.formatted, "€176 - €264");
    }
}
