//! Normalization and validation of generated text.

use ponder_core::generation::GenerationError;
use ponder_core::item::{MAX_TEXT_CHARS, MIN_TEXT_CHARS};

const QUOTES: [char; 6] = ['"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];

/// Cleans up a raw completion and checks its length.
///
/// Trims whitespace, strips one surrounding quote character at each end,
/// collapses a trailing run of `?`, `.` or `!` to a single character, and
/// requires the result to be `MIN_TEXT_CHARS..=MAX_TEXT_CHARS` characters.
///
/// # Errors
///
/// Returns `GenerationError::Invalid` if the cleaned text is out of bounds.
pub fn normalize_candidate(raw: &str) -> Result<String, GenerationError> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix(QUOTES) {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(QUOTES) {
        text = rest;
    }
    let text = collapse_trailing_punctuation(text.trim());

    let chars = text.chars().count();
    if !(MIN_TEXT_CHARS..=MAX_TEXT_CHARS).contains(&chars) {
        return Err(GenerationError::Invalid(format!(
            "candidate length {chars} outside {MIN_TEXT_CHARS}-{MAX_TEXT_CHARS}"
        )));
    }
    Ok(text)
}

fn collapse_trailing_punctuation(text: &str) -> String {
    let Some(last) = text.chars().last() else {
        return String::new();
    };
    if !matches!(last, '?' | '.' | '!') {
        return text.to_owned();
    }
    let mut collapsed = text.trim_end_matches(last).to_owned();
    collapsed.push(last);
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_quotes_and_whitespace() {
        let text = normalize_candidate("  \"Is a promise kept in secret still kept?\"\n").unwrap();
        assert_eq!(text, "Is a promise kept in secret still kept?");
    }

    #[test]
    fn test_strips_typographic_quotes() {
        let text = normalize_candidate("\u{201c}What does silence owe to sound?\u{201d}").unwrap();
        assert_eq!(text, "What does silence owe to sound?");
    }

    #[test]
    fn test_collapses_repeated_question_marks() {
        let text = normalize_candidate("Who decides what counts as progress???").unwrap();
        assert_eq!(text, "Who decides what counts as progress?");
    }

    #[test]
    fn test_collapses_repeated_exclamation_marks() {
        let text = normalize_candidate("Imagine a world without clocks!!!").unwrap();
        assert_eq!(text, "Imagine a world without clocks!");
    }

    #[test]
    fn test_rejects_too_short_output() {
        let result = normalize_candidate("\"Why?\"");
        assert!(matches!(result, Err(GenerationError::Invalid(_))));
    }

    #[test]
    fn test_rejects_too_long_output() {
        let result = normalize_candidate(&format!("{}?", "why ".repeat(60)));
        assert!(matches!(result, Err(GenerationError::Invalid(_))));
    }

    #[test]
    fn test_rejects_empty_output() {
        assert!(normalize_candidate("   ").is_err());
    }
}
