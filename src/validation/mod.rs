//! Input admissibility rules for respondent answers.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::SessionError;

/// Smallest admissible intensity ("equally valuable").
pub const MIN_INTENSITY: f64 = 1.0;
/// Largest admissible intensity.
pub const MAX_INTENSITY: f64 = 999.0;

fn intensity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // ASCII digits only; `\d` would also admit other Unicode digit classes.
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]*\.?[0-9]{0,2}$").expect("valid intensity regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

/// Whether a raw intensity string is admissible.
///
/// The string must be plain decimal notation with at most two fractional
/// digits, and its value must lie in `[1, 999]`. Leading zeros (`"001"`) are
/// accepted. A trailing bare point (`"1."`) is accepted and read as `1.0`.
pub fn is_valid_intensity(raw: &str) -> bool {
    parse_intensity(raw).is_ok()
}

/// Parse a raw intensity string under the admissibility policy.
pub fn parse_intensity(raw: &str) -> Result<f64, SessionError> {
    if !intensity_pattern().is_match(raw) {
        return Err(SessionError::invalid_input(
            "intensity",
            "use plain decimal notation with at most two decimal places",
        ));
    }

    let value: f64 = raw
        .parse()
        .map_err(|_| SessionError::invalid_input("intensity", "not a number"))?;

    if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&value) {
        return Err(SessionError::invalid_input(
            "intensity",
            format!("must be between {} and {}", MIN_INTENSITY, MAX_INTENSITY),
        ));
    }

    Ok(value)
}

/// Trim and require non-empty reasoning text.
pub fn validate_reasoning(raw: &str) -> Result<String, SessionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SessionError::invalid_input("reasoning", "cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Loose email shape check used at session entry.
pub fn is_valid_email(raw: &str) -> bool {
    email_pattern().is_match(raw)
}

/// Render an intensity back into the text form respondents type.
pub fn format_intensity(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
