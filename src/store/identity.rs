use std::collections::HashSet;

use async_trait::async_trait;

use super::{IdentityGate, IdentityVerdict};
use crate::error::StorageResult;

/// Identity gate backed by a fixed set of invite codes.
#[derive(Debug, Clone, Default)]
pub struct InviteList {
    codes: HashSet<String>,
}

impl InviteList {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[async_trait]
impl IdentityGate for InviteList {
    async fn validate_identity(&self, code: &str) -> StorageResult<IdentityVerdict> {
        if code.is_empty() {
            return Ok(IdentityVerdict::rejected("Invite code is required"));
        }
        if self.codes.contains(code) {
            Ok(IdentityVerdict::accepted())
        } else {
            Ok(IdentityVerdict::rejected("Invalid invite code"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_code_is_accepted() {
        let gate = InviteList::new(["DEMO2024"]);
        let verdict = gate.validate_identity("DEMO2024").await.unwrap();
        assert!(verdict.valid);
    }

    #[tokio::test]
    async fn test_unknown_code_is_rejected_with_reason() {
        let gate = InviteList::new(["DEMO2024"]);
        let verdict = gate.validate_identity("demo2024").await.unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.reason.as_deref(), Some("Invalid invite code"));

        let verdict = gate.validate_identity("").await.unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("Invite code is required"));
    }
}
