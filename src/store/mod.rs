//! Record store and identity gate collaborators.
//!
//! The session engine persists judgments through [`RecordStore`] and admits
//! respondents through [`IdentityGate`]. Two store backends are provided:
//! an embedded SQLite database and a Google Sheets spreadsheet.

mod identity;
mod sheets;
mod sqlite;

pub use identity::InviteList;
pub use sheets::SheetsRecordStore;
pub use sqlite::SqliteRecordStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::scoring::Choice;

/// Stable handle to a persisted judgment (a row id or sheet row number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The respondent behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Respondent {
    pub name: String,
    pub email: String,
    pub invite_code: String,
}

impl Respondent {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        invite_code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            invite_code: invite_code.into(),
        }
    }
}

/// A judgment in the shape written to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    pub round: u32,
    pub item_a_index: usize,
    pub item_b_index: usize,
    pub item_a_name: String,
    pub item_b_name: String,
    pub choice: Choice,
    pub multiplier: f64,
    pub log_multiplier: f64,
    pub reasoning: String,
    pub submitted_at: DateTime<Utc>,
}

/// Another respondent's evaluation of the same pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerJudgment {
    pub item_a_name: String,
    pub item_b_name: String,
    pub choice: u8,
    pub multiplier: f64,
    pub reasoning: String,
}

/// Outcome of an identity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IdentityVerdict {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Create-or-overwrite persistence for judgments.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist `record` for `respondent`.
    ///
    /// With `existing == None` a new record is created and its id returned.
    /// Otherwise the record at `existing` is overwritten and the same id is
    /// returned; a missing target is `StorageError::RecordNotFound`.
    async fn upsert(
        &self,
        respondent: &Respondent,
        record: &JudgmentRecord,
        existing: Option<RecordId>,
    ) -> StorageResult<RecordId>;

    /// Judgments by any respondent for the unordered pair `(item_a, item_b)`.
    async fn find_by_key(&self, item_a: &str, item_b: &str) -> StorageResult<Vec<PeerJudgment>>;
}

/// External admission check for respondents.
#[async_trait]
pub trait IdentityGate: Send + Sync {
    async fn validate_identity(&self, code: &str) -> StorageResult<IdentityVerdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_display_and_serde() {
        let id = RecordId::new("15");
        assert_eq!(id.to_string(), "15");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"15\"");
    }

    #[test]
    fn test_identity_verdict_constructors() {
        assert!(IdentityVerdict::accepted().valid);
        let rejected = IdentityVerdict::rejected("Invalid invite code");
        assert!(!rejected.valid);
        assert_eq!(rejected.reason.as_deref(), Some("Invalid invite code"));
        let json = serde_json::to_value(IdentityVerdict::accepted()).unwrap();
        assert!(json.get("reason").is_none());
    }
}
