//! Reconciling realtime trip identifiers with public train numbers.
//!
//! The live feed keys trips by composite identifiers such as
//! `2026-01-16_AMTK_543` (service date, carrier, train number) while riders
//! know the train as `543`. Matching is heuristic: an identifier that does not
//! follow the composite pattern is taken to be a train number already.

use std::sync::LazyLock;

use regex::Regex;

/// Carrier names riders and feeds put in front of train numbers, longest first
pub const CARRIER_PREFIXES: [&str; 2] = ["AMTRAK", "AMTK"];

static COMPOSITE_TRIP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+_(\d+)$").expect("composite trip id pattern is valid"));

/// Canonical form of a train number: carrier prefix, surrounding whitespace
/// and leading zeros removed. Non-numeric values keep their remaining text.
pub fn normalize_train_number(raw: &str) -> String {
    let mut value = raw.trim();

    for prefix in CARRIER_PREFIXES {
        let has_prefix = value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if has_prefix {
            value = value[prefix.len()..].trim_start_matches([' ', '-', '_', '#']);
            break;
        }
    }

    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = value.trim_start_matches('0');
        return if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() };
    }

    value.to_string()
}

/// Train number carried by a trip identifier
pub fn extract_train_number(trip_id: &str) -> String {
    match COMPOSITE_TRIP_ID.captures(trip_id.trim()) {
        Some(captures) => normalize_train_number(&captures[1]),
        None => normalize_train_number(trip_id),
    }
}

/// Whether two spellings name the same train
pub fn match_train_number(a: &str, b: &str) -> bool {
    let a = normalize_train_number(a);
    !a.is_empty() && a == normalize_train_number(b)
}

/// Whether a free-text query looks like a train number
pub fn is_train_number(query: &str) -> bool {
    let normalized = normalize_train_number(query);
    !normalized.is_empty() && normalized.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_leading_zeros() {
        assert_eq!(normalize_train_number("043"), "43");
        assert_eq!(normalize_train_number("43"), "43");
        assert_eq!(normalize_train_number("000"), "0");
    }

    #[test]
    fn test_normalize_strips_carrier_prefix() {
        assert_eq!(normalize_train_number("AMTK 543"), "543");
        assert_eq!(normalize_train_number("amtrak #0049"), "49");
        assert_eq!(normalize_train_number("Amtk-7"), "7");
        assert_eq!(normalize_train_number("Acela"), "Acela");
    }

    #[test]
    fn test_match_train_number() {
        assert!(match_train_number("001", "1"));
        assert!(!match_train_number("43", "44"));
        assert!(!match_train_number("", ""));
    }

    #[test]
    fn test_extract_from_composite_identifier() {
        assert_eq!(extract_train_number("2026-01-16_AMTK_543"), "543");
        assert_eq!(extract_train_number("2026-01-16_AMTK_0007"), "7");
    }

    #[test]
    fn test_extract_falls_back_to_whole_identifier() {
        assert_eq!(extract_train_number("543"), "543");
        assert_eq!(extract_train_number("T1"), "T1");
    }

    #[test]
    fn test_is_train_number() {
        assert!(is_train_number("AMTK 5"));
        assert!(!is_train_number("Chicago"));
        assert!(!is_train_number(""));
    }
}
