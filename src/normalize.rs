//! Title normalization and year derivation.
//!
//! The normalized title is the enrichment cache key, so any change here
//! invalidates existing cache files. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Parenthesized 4-digit year token, e.g. "(1995)".
static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a raw title into its cache key.
/// Strips every "(YYYY)" token and trims surrounding whitespace.
/// e.g., "Toy Story (1995)" → "Toy Story"
pub fn normalize_title(raw_title: &str) -> String {
    let mut result = raw_title.to_string();

    // Removing one token can splice a new one together ("(19(1995)95)"),
    // so repeat until stable.
    loop {
        let stripped = YEAR_TOKEN.replace_all(&result, "");
        if stripped == result {
            break;
        }
        result = stripped.into_owned();
    }

    result.trim().to_string()
}

/// First 4-digit year found inside parentheses, if any.
pub fn extract_year(raw_title: &str) -> Option<i32> {
    YEAR_TOKEN
        .captures(raw_title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Decade bucket for a year: 1995 → 1990.
pub fn decade(year: Option<i32>) -> Option<i32> {
    year.map(|y| y - y.rem_euclid(10))
}

// ============================================================================
// TESTS
// ============================================================================
