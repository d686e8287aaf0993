//! Airport and carrier code helpers.

/// Three uppercase ASCII letters.
pub fn is_airport_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Two alphanumeric characters (IATA airline designators may contain digits).
pub fn is_carrier_code(code: &str) -> bool {
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Route identifier in `ORIG-DEST` form.
pub fn route_id(origin: &str, destination: &str) -> String {
    format!("{}-{}", origin, destination)
}

pub fn split_route_id(route_id: &str) -> Option<(&str, &str)> {
    let (origin, destination) = route_id.split_once('-')?;
    (is_airport_code(origin) && is_airport_code(destination)).then_some((origin, destination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert!(is_airport_code("LHR"));
        assert!(!is_airport_code("lhr"));
        assert!(!is_airport_code("LHRX"));
        assert!(is_carrier_code("U2"));
        assert_eq!(normalize_code(" cdg "), "CDG");
    }

    #[test]
    fn test_route_id_round_trip() {
        let id = route_id("LHR", "CDG");
        assert_eq!(id, "LHR-CDG");
        assert_eq!(split_route_id(&id), Some(("LHR", "CDG")));
        assert_eq!(split_route_id("LHRCDG"), None);
    }
}
