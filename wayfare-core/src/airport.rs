use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AirportType {
    Airport,
    City,
}

impl Default for AirportType {
    fn default() -> Self {
        AirportType::Airport
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    pub name: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    #[serde(default, rename = "type")]
    pub airport_type: AirportType,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportSuggestion {
    pub airport: Airport,
    pub score: f64,
}

pub const EXACT_CODE_BOOST: f64 = 10.0;
pub const CODE_PREFIX_BOOST: f64 = 5.0;
pub const NAME_PREFIX_BOOST: f64 = 3.0;
pub const FUZZY_BOOST: f64 = 1.0;

/// Composite autocomplete score; zero means no match.
pub fn score(query: &str, airport: &Airport) -> f64 {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return 0.0;
    }
    let code = airport.code.to_lowercase();
    let name = airport.name.to_lowercase();
    let city = airport.city.to_lowercase();

    let mut total = 0.0;
    if code == q {
        total += EXACT_CODE_BOOST;
    }
    if code.starts_with(&q) {
        total += CODE_PREFIX_BOOST;
    }
    if name.starts_with(&q) || city.starts_with(&q) || words(&name).any(|w| w.starts_with(&q)) {
        total += NAME_PREFIX_BOOST;
    }
    if [code.as_str(), name.as_str(), city.as_str()]
        .iter()
        .flat_map(|f| words(*f))
        .any(|w| within_one_edit(&q, w))
    {
        total += FUZZY_BOOST;
    }
    total
}

fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

/// Levenshtein distance of at most one.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if long.len() - short.len() > 1 {
        return false;
    }
    let mut i = 0;
    let mut j = 0;
    let mut edits = 0;
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
            continue;
        }
        edits += 1;
        if edits > 1 {
            return false;
        }
        if short.len() == long.len() {
            i += 1;
        }
        j += 1;
    }
    edits + (long.len() - j) + (short.len() - i) <= 1
}

/// Rank airports for an autocomplete query: score desc, then popularity desc.
pub fn rank(query: &str, airports: &[Airport], limit: usize) -> Vec<AirportSuggestion> {
    let mut hits: Vec<AirportSuggestion> = airports
        .iter()
        .filter_map(|a| {
            let s = score(query, a);
            (s > 0.0).then(|| AirportSuggestion { airport: a.clone(), score: s })
        })
        .collect();
    hits.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| y.airport.popularity.cmp(&x.airport.popularity))
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn airport(code: &str, name: &str, city: &str, popularity: u32) -> Airport {
        Airport {
            code: code.into(),
            name: name.into(),
            city: city.into(),
            country: "United Kingdom".into(),
            country_code: "GB".into(),
            airport_type: AirportType::Airport,
            popularity,
            latitude: None,
            longitude: None,
        }
    }

    fn london() -> Vec<Airport> {
        vec![
            airport("LGW", "London Gatwick", "London", 90),
            airport("LTN", "London Luton", "London", 60),
            airport("LHR", "London Heathrow", "London", 100),
            airport("LIS", "Humberto Delgado", "Lisbon", 80),
        ]
    }

    #[test]
    fn test_exact_code_wins() {
        let hits = rank("LHR", &london(), 10);
        assert_eq!(hits[0].airport.code, "LHR");
        assert!(hits[0].score >= EXACT_CODE_BOOST);
    }

    #[test]
    fn test_city_match_orders_by_popularity() {
        let hits = rank("london", &london(), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].airport.code, "LHR");
        assert_eq!(hits[1].airport.code, "LGW");
    }

    #[test]
    fn test_fuzzy_tolerates_typo() {
        let hits = rank("lisbom", &london(), 5);
        assert_eq!(hits[0].airport.code, "LIS");
        assert!(within_one_edit("gatwik", "gatwick"));
        assert!(!within_one_edit("abc", "xyz"));
    }
}
