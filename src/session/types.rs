//! Value types exchanged with the session engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sampler::IndexPair;
use crate::scoring::Choice;
use crate::store::{JudgmentRecord, RecordId};
use crate::validation::format_intensity;

/// Lifecycle phase of an elicitation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No validated respondent yet
    Unauthenticated,
    /// Presenting the pairs of the current round
    RoundInProgress,
    /// All pairs of the round submitted; history is editable
    RoundReview,
    /// Re-answering one earlier judgment
    EditInProgress,
    /// Session closed; no further mutation
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Unauthenticated => "unauthenticated",
            Phase::RoundInProgress => "round_in_progress",
            Phase::RoundReview => "round_review",
            Phase::EditInProgress => "edit_in_progress",
            Phase::Finished => "finished",
        }
    }

    /// Whether a pair is on screen in this phase.
    pub fn is_presenting(&self) -> bool {
        matches!(self, Phase::RoundInProgress | Phase::EditInProgress)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a judgment within a session: `(round, item_a_index, item_b_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JudgmentKey {
    pub round: u32,
    pub item_a_index: usize,
    pub item_b_index: usize,
}

impl JudgmentKey {
    pub fn new(round: u32, item_a_index: usize, item_b_index: usize) -> Self {
        Self {
            round,
            item_a_index,
            item_b_index,
        }
    }

    pub fn for_pair(round: u32, pair: IndexPair) -> Self {
        Self::new(round, pair.a, pair.b)
    }

    pub fn pair(&self) -> IndexPair {
        IndexPair::new(self.item_a_index, self.item_b_index)
    }
}

impl fmt::Display for JudgmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}:{}-{}",
            self.round, self.item_a_index, self.item_b_index
        )
    }
}

/// Persistence state of a locally applied judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum PersistStatus {
    /// Applied locally, store call outstanding
    Unconfirmed,
    /// Store acknowledged the latest version
    Confirmed,
    /// Last store call failed; retryable
    Failed(String),
}

impl PersistStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, PersistStatus::Failed(_))
    }
}

/// A respondent's answer for one pair in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub key: JudgmentKey,
    pub item_a_name: String,
    pub item_b_name: String,
    pub choice: Choice,
    pub intensity: f64,
    pub log_score: f64,
    pub reasoning: String,
    pub record_id: Option<RecordId>,
    pub status: PersistStatus,
    pub updated_at: DateTime<Utc>,
}

impl Judgment {
    /// The shape written to the record store.
    pub fn to_record(&self) -> JudgmentRecord {
        JudgmentRecord {
            round: self.key.round,
            item_a_index: self.key.item_a_index,
            item_b_index: self.key.item_b_index,
            item_a_name: self.item_a_name.clone(),
            item_b_name: self.item_b_name.clone(),
            choice: self.choice,
            multiplier: self.intensity,
            log_multiplier: self.log_score,
            reasoning: self.reasoning.clone(),
            submitted_at: self.updated_at,
        }
    }

    /// Prefilled form for editing this judgment.
    pub fn to_draft(&self) -> JudgmentDraft {
        JudgmentDraft {
            choice: Some(self.choice),
            intensity: format_intensity(self.intensity),
            reasoning: self.reasoning.clone(),
        }
    }
}

/// Raw form input for one pair. Nothing is validated until submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentDraft {
    pub choice: Option<Choice>,
    pub intensity: String,
    pub reasoning: String,
}

impl JudgmentDraft {
    pub fn new(choice: Choice, intensity: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            choice: Some(choice),
            intensity: intensity.into(),
            reasoning: reasoning.into(),
        }
    }
}

/// Where the respondent was before an edit began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditContinuation {
    pub round: u32,
    pub pair_index: usize,
    pub pairs: Vec<IndexPair>,
}

/// The pair currently presented to the respondent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairView {
    pub round: u32,
    /// 1-based position within the round
    pub position: usize,
    pub total: usize,
    pub item_a: String,
    pub item_b: String,
    pub item_a_index: usize,
    pub item_b_index: usize,
    pub editing: bool,
}

/// Result of an accepted submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub key: JudgmentKey,
    pub log_score: f64,
    /// `false` when an existing judgment was overwritten
    pub created: bool,
    /// Phase after the submit
    pub phase: Phase,
}

/// Applied outcome of one background persistence call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceReport {
    pub key: JudgmentKey,
    pub record_id: Option<RecordId>,
    pub status: PersistStatus,
}

/// Totals reported when a session finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub rounds: u32,
    pub judgments: usize,
    pub confirmed: usize,
    pub unconfirmed: usize,
    pub failed: usize,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {}", self.session_id)?;
        writeln!(f, "  Rounds: {}", self.rounds)?;
        writeln!(f, "  Judgments: {}", self.judgments)?;
        write!(
            f,
            "  Saved: {} confirmed, {} pending, {} failed",
            self.confirmed, self.unconfirmed, self.failed
        )
    }
}
