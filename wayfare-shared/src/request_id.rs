use chrono::{DateTime, Utc};
use rand::RngCore;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Longest incoming request id that is honored verbatim.
const MAX_INCOMING_LEN: usize = 128;

/// Generate a request id of the form `YYYYMMDDHHMMSS-XXXXXXXX`.
pub fn generate() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format_id(Utc::now(), bytes)
}

pub fn format_id(at: DateTime<Utc>, random: [u8; 4]) -> String {
    format!("{}-{}", at.format("%Y%m%d%H%M%S"), hex::encode(random))
}

/// Returns the caller-supplied id when it is usable, otherwise a fresh one.
pub fn resolve(incoming: Option<&str>) -> String {
    match incoming.map(str::trim) {
        Some(id)
            if !id.is_empty()
                && id.len() <= MAX_INCOMING_LEN
                && id.chars().all(|c| c.is_ascii_graphic()) =>
        {
            id.to_string()
        }
        _ => generate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(format_id(at, [0xde, 0xad, 0xbe, 0xef]), "20250601100000-deadbeef");
    }

    #[test]
    fn test_generated_shape() {
        let id = generate();
        let (stamp, random) = id.split_once('-').unwrap();
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(random.len(), 8);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_honors_incoming() {
        assert_eq!(resolve(Some("abc-123")), "abc-123");
        assert_ne!(resolve(Some("  ")), "  ");
        assert_eq!(resolve(None).len(), 23);
    }
}
