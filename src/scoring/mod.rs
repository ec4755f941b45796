//! Preference-to-score transform.
//!
//! A judgment "item B is `m` times better than item A" becomes the signed
//! natural log `ln(m)`; preferring item A flips the sign. These log scores are
//! the input to downstream Bradley-Terry style aggregation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Which slot of a pair the respondent favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Choice {
    /// Item A (code 1).
    First,
    /// Item B (code 2).
    Second,
}

impl Choice {
    /// Map a numeric choice code (`1` or `2`).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Choice::First),
            2 => Some(Choice::Second),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Choice::First => 1,
            Choice::Second => 2,
        }
    }

    /// Signed log score for this choice at `intensity`.
    pub fn log_score(self, intensity: f64) -> Result<f64, SessionError> {
        try_log_multiplier(self, intensity)
    }
}

impl TryFrom<u8> for Choice {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Choice::from_code(i64::from(code)).ok_or_else(|| format!("Unknown choice code: {}", code))
    }
}

impl From<Choice> for u8 {
    fn from(choice: Choice) -> Self {
        choice.code()
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Choice {
    type Err = String;

    /// Accepts both answer formats in use: `1`/`2` and `A`/`B`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1" | "A" => Ok(Choice::First),
            "2" | "B" => Ok(Choice::Second),
            _ => Err(format!("Unknown choice: {}", s)),
        }
    }
}

/// Signed log multiplier for a raw choice code.
///
/// Returns `-ln(multiplier)` for choice 1 and `ln(multiplier)` for choice 2.
/// Returns NaN when the choice is not 1 or 2, or when the multiplier is not a
/// positive finite number. Every positive finite `f64` (subnormals and
/// `f64::MAX` included) yields a finite result.
pub fn log_multiplier(choice: i64, multiplier: f64) -> f64 {
    let Some(choice) = Choice::from_code(choice) else {
        return f64::NAN;
    };
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return f64::NAN;
    }

    let log_value = multiplier.ln();
    if log_value == 0.0 {
        return 0.0;
    }
    match choice {
        Choice::Second => log_value,
        Choice::First => -log_value,
    }
}

/// Typed form of [`log_multiplier`] that reports invalid input instead of NaN.
pub fn try_log_multiplier(choice: Choice, multiplier: f64) -> Result<f64, SessionError> {
    let score = log_multiplier(i64::from(choice.code()), multiplier);
    if score.is_nan() {
        return Err(SessionError::invalid_input(
            "intensity",
            format!("must be a positive finite number, got {}", multiplier),
        ));
    }
    Ok(score)
}

/// Which item came out ahead in a named comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub more_valuable: String,
    pub less_valuable: String,
    pub multiplier: f64,
}

impl ComparisonOutcome {
    pub fn from_names(
        choice: Choice,
        item_a: impl Into<String>,
        item_b: impl Into<String>,
        multiplier: f64,
    ) -> Self {
        let (a, b) = (item_a.into(), item_b.into());
        let (more_valuable, less_valuable) = match choice {
            Choice::First => (a, b),
            Choice::Second => (b, a),
        };
        Self {
            more_valuable,
            less_valuable,
            multiplier,
        }
    }
}

/// A raw comparison as collected, before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawComparison {
    pub item_a_index: usize,
    pub item_b_index: usize,
    pub choice: Choice,
    pub multiplier: f64,
}

/// A scored comparison in the shape consumed by rank aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredComparison {
    pub item_a_index: usize,
    pub item_b_index: usize,
    pub log_multiplier: f64,
}

/// Score a batch of raw comparisons.
pub fn process_comparison_results(comparisons: &[RawComparison]) -> Vec<ScoredComparison> {
    comparisons
        .iter()
        .map(|c| ScoredComparison {
            item_a_index: c.item_a_index,
            item_b_index: c.item_b_index,
            log_multiplier: log_multiplier(i64::from(c.choice.code()), c.multiplier),
        })
        .collect()
}
