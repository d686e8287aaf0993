use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::iata::is_airport_code;
use crate::money::is_currency_code;
use crate::validation::FieldErrors;
use crate::CoreError;
use wayfare_shared::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "ECONOMY",
            CabinClass::PremiumEconomy => "PREMIUM_ECONOMY",
            CabinClass::Business => "BUSINESS",
            CabinClass::First => "FIRST",
        }
    }
}

impl Default for CabinClass {
    fn default() -> Self {
        CabinClass::Economy
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CabinClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ECONOMY" => Ok(CabinClass::Economy),
            "PREMIUM_ECONOMY" => Ok(CabinClass::PremiumEconomy),
            "BUSINESS" => Ok(CabinClass::Business),
            "FIRST" => Ok(CabinClass::First),
            other => Err(CoreError::InvalidFormat(format!("cabin class '{}'", other))),
        }
    }
}

fn default_adults() -> u8 {
    1
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_max_results() -> u16 {
    50
}

/// An interactive flight search as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightSearchRequest {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default = "default_adults")]
    pub adults: u8,
    #[serde(default)]
    pub children: u8,
    #[serde(default)]
    pub infants: u8,
    #[serde(default)]
    pub cabin_class: CabinClass,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_max_results")]
    pub max_results: u16,
}

impl FlightSearchRequest {
    pub const MAX_RESULTS: u16 = 250;
    pub const MAX_PASSENGERS_PER_TYPE: u8 = 9;

    pub fn one_way(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            return_date: None,
            adults: 1,
            children: 0,
            infants: 0,
            cabin_class: CabinClass::Economy,
            currency: default_currency(),
            max_results: default_max_results(),
        }
    }

    pub fn is_round_trip(&self) -> bool {
        self.return_date.is_some()
    }

    pub fn passenger_count(&self) -> u32 {
        self.adults as u32 + self.children as u32 + self.infants as u32
    }

    /// Check every field; all failures are reported together.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        errors.check(is_airport_code(&self.origin), "origin", "must be a 3-letter airport code");
        errors.check(
            is_airport_code(&self.destination),
            "destination",
            "must be a 3-letter airport code",
        );
        errors.check(
            self.origin != self.destination,
            "destination",
            "must differ from origin",
        );
        if let Some(return_date) = self.return_date {
            errors.check(
                return_date >= self.departure_date,
                "return_date",
                "must not be before departure_date",
            );
        }
        errors.check(
            (1..=Self::MAX_PASSENGERS_PER_TYPE).contains(&self.adults),
            "adults",
            "must be between 1 and 9",
        );
        errors.check(self.children <= Self::MAX_PASSENGERS_PER_TYPE, "children", "must be at most 9");
        errors.check(self.infants <= Self::MAX_PASSENGERS_PER_TYPE, "infants", "must be at most 9");
        errors.check(self.infants <= self.adults, "infants", "must not exceed adults");
        errors.check(is_currency_code(&self.currency), "currency", "must be a 3-letter code");
        errors.check(
            (1..=Self::MAX_RESULTS).contains(&self.max_results),
            "max_results",
            "must be between 1 and 250",
        );
        errors.into_result("invalid flight search request")
    }

    /// Stable fingerprint identifying equivalent searches.
    pub fn search_id(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.origin,
            self.destination,
            self.departure_date,
            self.return_date.map(|d| d.to_string()).unwrap_or_default(),
            self.adults,
            self.children,
            self.infants,
            self.cabin_class,
            self.currency,
            self.max_results,
        );
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..12])
    }
}
