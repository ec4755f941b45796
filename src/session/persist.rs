//! Background persistence of judgments.
//!
//! Each upsert runs on its own detached task and reports back over an
//! unbounded channel owned by the engine. A panicking store is reported as a
//! failure. If the engine is gone the send fails and the outcome is dropped.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use super::types::JudgmentKey;
use crate::store::{JudgmentRecord, RecordId, RecordStore, Respondent};

/// Completion of one background upsert.
#[derive(Debug)]
pub(crate) struct PersistOutcome {
    pub key: JudgmentKey,
    pub result: Result<RecordId, String>,
}

/// Spawn an upsert for `key`. Must be called from within a Tokio runtime.
///
/// The store call runs on its own task so that a panic inside it is still
/// reported as a failed outcome for `key`.
pub(crate) fn spawn_upsert(
    store: Arc<dyn RecordStore>,
    respondent: Respondent,
    record: JudgmentRecord,
    existing: Option<RecordId>,
    key: JudgmentKey,
    outcomes: UnboundedSender<PersistOutcome>,
) {
    tokio::spawn(async move {
        let upsert = tokio::spawn(async move {
            store
                .upsert(&respondent, &record, existing)
                .await
                .map_err(|e| e.to_string())
        });

        let result = match upsert.await {
            Ok(result) => result,
            Err(e) => {
                error!(key = %key, error = %e, "Persistence task aborted");
                Err(format!("Persistence task aborted: {}", e))
            }
        };

        if outcomes.send(PersistOutcome { key, result }).is_err() {
            debug!(key = %key, "Session dropped before persistence completed");
        }
    });
}
