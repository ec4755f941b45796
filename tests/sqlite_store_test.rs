//! Integration tests for the SQLite record store
//!
//! Covers create/overwrite upsert semantics, unordered pair lookup and
//! file-backed persistence across reopen.

use chrono::Utc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use pairwise_elicitation::config::DatabaseConfig;
use pairwise_elicitation::error::StorageError;
use pairwise_elicitation::scoring::{log_multiplier, Choice};
use pairwise_elicitation::store::{
    JudgmentRecord, RecordId, RecordStore, Respondent, SqliteRecordStore,
};

fn create_test_respondent(name: &str) -> Respondent {
    Respondent::new(name, format!("{}@example.org", name.to_lowercase()), "DEMO2024")
}

fn create_test_record(a: &str, b: &str, choice: Choice, multiplier: f64) -> JudgmentRecord {
    JudgmentRecord {
        round: 1,
        item_a_index: 0,
        item_b_index: 1,
        item_a_name: a.to_string(),
        item_b_name: b.to_string(),
        choice,
        multiplier,
        log_multiplier: log_multiplier(i64::from(choice.code()), multiplier),
        reasoning: "larger ecosystem".to_string(),
        submitted_at: Utc::now(),
    }
}

#[cfg(test)]
mod upsert_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_then_overwrite_keeps_id() {
        let store = SqliteRecordStore::new_in_memory().await.unwrap();
        let ada = create_test_respondent("Ada");

        let created = store
            .upsert(&ada, &create_test_record("x/a", "x/b", Choice::Second, 5.0), None)
            .await
            .unwrap();

        let edited = create_test_record("x/a", "x/b", Choice::First, 2.0);
        let updated = store
            .upsert(&ada, &edited, Some(created.clone()))
            .await
            .unwrap();

        assert_eq!(updated, created);
        assert_eq!(store.count_records().await.unwrap(), 1);

        let stored = store.get_record(&created).await.unwrap().unwrap();
        assert_eq!(stored.respondent, ada);
        assert_eq!(stored.record.choice, Choice::First);
        assert_eq!(stored.record.multiplier, 2.0);
        assert!((stored.record.log_multiplier + 0.6931).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_creates_get_distinct_ids() {
        let store = SqliteRecordStore::new_in_memory().await.unwrap();
        let ada = create_test_respondent("Ada");
        let record = create_test_record("x/a", "x/b", Choice::Second, 3.0);

        let first = store.upsert(&ada, &record, None).await.unwrap();
        let second = store.upsert(&ada, &record, None).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.count_records().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_missing_record() {
        let store = SqliteRecordStore::new_in_memory().await.unwrap();
        let ada = create_test_respondent("Ada");
        let record = create_test_record("x/a", "x/b", Choice::Second, 3.0);

        let result = store.upsert(&ada, &record, Some(RecordId::new("99"))).await;
        assert!(matches!(result, Err(StorageError::RecordNotFound { ref record_id }) if record_id == "99"));

        let result = store
            .upsert(&ada, &record, Some(RecordId::new("row-seven")))
            .await;
        assert_err!(result);
        assert_eq!(store.count_records().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_record_unknown_id() {
        let store = SqliteRecordStore::new_in_memory().await.unwrap();
        assert!(store.get_record(&RecordId::new("1")).await.unwrap().is_none());
        assert!(store.get_record(&RecordId::new("abc")).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod lookup_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_find_by_key_matches_either_order() {
        let store = SqliteRecordStore::new_in_memory().await.unwrap();

        store
            .upsert(
                &create_test_respondent("Ada"),
                &create_test_record("x/a", "x/b", Choice::Second, 5.0),
                None,
            )
            .await
            .unwrap();
        store
            .upsert(
                &create_test_respondent("Grace"),
                &create_test_record("x/b", "x/a", Choice::First, 2.0),
                None,
            )
            .await
            .unwrap();
        store
            .upsert(
                &create_test_respondent("Linus"),
                &create_test_record("x/a", "x/c", Choice::First, 7.0),
                None,
            )
            .await
            .unwrap();

        let peers = store.find_by_key("x/a", "x/b").await.unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].choice, 2);
        assert_eq!(peers[0].multiplier, 5.0);
        assert_eq!(peers[1].item_a_name, "x/b");
        assert_eq!(peers[1].choice, 1);

        let none = store.find_by_key("x/b", "x/c").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_records_for_invite_code() {
        let store = SqliteRecordStore::new_in_memory().await.unwrap();
        let ada = create_test_respondent("Ada");
        let other = Respondent::new("Eve", "eve@example.org", "OTHER");
        let record = create_test_record("x/a", "x/b", Choice::Second, 3.0);

        assert_ok!(store.upsert(&ada, &record, None).await);
        assert_ok!(store.upsert(&other, &record, None).await);

        let mine = store.records_for("DEMO2024").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].respondent.name, "Ada");
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("judgments.db"),
            max_connections: 2,
        };

        let id = {
            let store = SqliteRecordStore::new(&config).await.unwrap();
            let id = store
                .upsert(
                    &create_test_respondent("Ada"),
                    &create_test_record("x/a", "x/b", Choice::Second, 4.0),
                    None,
                )
                .await
                .unwrap();
            store.pool().close().await;
            id
        };

        let reopened = SqliteRecordStore::new(&config).await.unwrap();
        let stored = reopened.get_record(&id).await.unwrap().unwrap();
        assert_eq!(stored.record.multiplier, 4.0);
        assert_eq!(stored.record.item_b_name, "x/b");
    }
}
