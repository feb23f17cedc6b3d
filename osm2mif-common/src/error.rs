//! Error types and utilities for the osm2mif converter
//!
//! Provides the error taxonomy shared by the rule parser, the element reader and
//! the MIF/MID writer, plus fuzzy matching for misspelled rule keys.

use std::path::PathBuf;
use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

/// Find the best fuzzy match using Jaro-Winkler (70%) and normalized
/// Levenshtein (30%) similarity.
///
/// Rule keys are short snake_case identifiers, so typos are mostly swapped
/// separators (`mif-type`) or a dropped letter (`brek_up`). Jaro-Winkler
/// rewards the shared prefix; Levenshtein catches deletions.
fn find_best_fuzzy_match(input: &str, candidates: &[&str]) -> Option<String> {
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_score = 0.0f64;

    // Below this the suggestion is noise ("xyz" should not become "tv").
    let min_threshold = 0.75;

    for candidate in candidates {
        let candidate_lower = candidate.to_lowercase();
        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let score = (jw_score * 0.7) + (lev_score * 0.3);

        if score >= min_threshold && score > best_score {
            best_score = score;
            best_match = Some((*candidate).to_string());
        }
    }

    best_match
}

/// Suggest a correction for a misspelled key out of `candidates`.
///
/// Returns `None` when the input already matches a candidate (ignoring case)
/// or when nothing is close enough to be a plausible typo.
pub fn suggest_correction(input: &str, candidates: &[&str]) -> Option<String> {
    if candidates.iter().any(|c| c.eq_ignore_ascii_case(input)) {
        return None;
    }
    find_best_fuzzy_match(input, candidates)
}

/// Main error type for osm2mif operations
#[derive(Debug, Error)]
pub enum Error {
    /// A rule description line could not be understood
    #[error("Error in rule description line {line}: '{text}': {reason}")]
    RuleSyntax {
        line: usize,
        text: String,
        reason: String,
    },

    /// A key declares both an all-values inclusion and an all-values exclusion
    #[error("Ambiguous rule for key '{key}': iv=\"*\" and ev=\"*\" cannot both be declared")]
    AmbiguousWildcard { key: String },

    /// A file could not be opened or created
    #[error("Could not open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input line is empty or exceeds the maximum line length
    #[error("Could not read line {line}: line is empty or longer than {max} bytes")]
    UnreadableLine { line: usize, max: usize },

    /// The input ended before the closing `</osm>` marker
    #[error("Input ended after {lines} lines without a closing </osm> marker")]
    UnexpectedEof { lines: usize },

    /// A numeric field failed to parse
    #[error("Could not turn '{token}' into {expected} (line {line})")]
    MalformedField {
        line: usize,
        token: String,
        expected: &'static str,
    },

    /// A required attribute is absent from an element
    #[error("Missing '{attribute}' attribute on <{element}> (line {line})")]
    MissingAttribute {
        line: usize,
        element: &'static str,
        attribute: &'static str,
    },

    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Configuration errors are raised while loading the rule description,
    /// before any input is read.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::RuleSyntax { .. } | Error::AmbiguousWildcard { .. })
    }
}

/// Convenience result type for osm2mif operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    const RULE_KEYS: &[&str] = &["iv", "ev", "style", "tv", "mif_type", "type", "break_up"];

    #[test]
    fn test_suggest_correction_typos() {
        assert_eq!(
            suggest_correction("brek_up", RULE_KEYS),
            Some("break_up".to_string())
        );
        assert_eq!(
            suggest_correction("mif-type", RULE_KEYS),
            Some("mif_type".to_string())
        );
        assert_eq!(
            suggest_correction("styel", RULE_KEYS),
            Some("style".to_string())
        );
    }

    #[test]
    fn test_suggest_correction_no_match() {
        assert_eq!(suggest_correction("totally-unknown-key", RULE_KEYS), None);
        assert_eq!(suggest_correction("style", RULE_KEYS), None); // Correct spelling
        assert_eq!(suggest_correction("STYLE", RULE_KEYS), None); // Only wrong case
    }

    #[test]
    fn test_error_display_carries_offending_text() {
        let err = Error::RuleSyntax {
            line: 3,
            text: "k=\"highway".to_string(),
            reason: "missing closing quote".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("k=\"highway"));
        assert!(err.is_configuration());

        let err = Error::MalformedField {
            line: 12,
            token: "51.x".to_string(),
            expected: "a latitude",
        };
        assert_eq!(err.to_string(), "Could not turn '51.x' into a latitude (line 12)");
        assert!(!err.is_configuration());
    }
}
