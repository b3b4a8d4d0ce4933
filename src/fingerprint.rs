//! Cache-key derivation.
//!
//! Two requests that differ only in spacing, case, quote style or repeated
//! punctuation map to the same fingerprint, so they share one cache entry.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static REPEATED_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([!?.,;:\-])[!?.,;:\-]+").expect("valid punctuation regex"));

/// Strips control characters, collapses whitespace runs to one space and
/// trims.
pub fn normalize_text(text: &str) -> String {
    let visible: String = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    WHITESPACE.replace_all(&visible, " ").trim().to_string()
}

/// [`normalize_text`] plus lowercasing, straight quotes and single
/// punctuation marks.
pub fn normalize_for_hashing(text: &str) -> String {
    let lowered = normalize_text(text).to_lowercase();
    let quotes: String = lowered
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            other => other,
        })
        .collect();
    REPEATED_PUNCTUATION.replace_all(&quotes, "$1").into_owned()
}

/// SHA-256 hex digest identifying a logical request.
///
/// `options` is hashed in its serialized form; object keys serialize in
/// sorted order, so key order does not matter.
pub fn fingerprint(service: &str, text: &str, options: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(service.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_for_hashing(text).as_bytes());
    hasher.update([0u8]);
    hasher.update(options.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  The\tsky \n\n is\u{0007} blue  "), "The sky is blue");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_normalize_for_hashing() {
        assert_eq!(
            normalize_for_hashing("\u{201C}Vaccines\u{201D}  CAUSE autism?!?"),
            "\"vaccines\" cause autism?"
        );
        assert_eq!(normalize_for_hashing("Wait... what"), "wait. what");
    }

    #[test]
    fn test_equivalent_requests_share_fingerprint() {
        let a = fingerprint("fact_check", "The Earth is flat!!", &json!({"lang": "en", "max": 5}));
        let b = fingerprint("fact_check", "  the earth   is FLAT! ", &json!({"max": 5, "lang": "en"}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_service_and_options_change_fingerprint() {
        let base = fingerprint("fact_check", "The Earth is flat", &json!({}));
        assert_ne!(base, fingerprint("llm", "The Earth is flat", &json!({})));
        assert_ne!(base, fingerprint("fact_check", "The Earth is flat", &json!({"lang": "fr"})));
        assert_ne!(base, fingerprint("fact_check", "The Earth is round", &json!({})));
    }
}
