//! Integration tests for the Google Sheets record store
//!
//! Tests HTTP behavior using wiremock for request/response mocking.

use chrono::Utc;
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use pairwise_elicitation::config::{RequestConfig, SheetsConfig};
use pairwise_elicitation::error::{SheetsError, StorageError};
use pairwise_elicitation::scoring::Choice;
use pairwise_elicitation::store::{
    IdentityGate, JudgmentRecord, RecordId, RecordStore, Respondent, SheetsRecordStore,
};

const VALUES_PATH: &str = "/v4/spreadsheets/sheet-123/values";

/// Create a test store pointing to mock server
fn create_test_store(base_url: &str, max_retries: u32) -> SheetsRecordStore {
    let config = SheetsConfig {
        base_url: base_url.to_string(),
        spreadsheet_id: "sheet-123".to_string(),
        access_token: "test-token".to_string(),
        responses_tab: "responses".to_string(),
        invites_tab: "invites".to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    SheetsRecordStore::new(&config, request_config).expect("Failed to create store")
}

fn create_test_record(choice: Choice, multiplier: f64) -> JudgmentRecord {
    JudgmentRecord {
        round: 2,
        item_a_index: 3,
        item_b_index: 7,
        item_a_name: "https://github.com/x/a".to_string(),
        item_b_name: "https://github.com/x/b".to_string(),
        choice,
        multiplier,
        log_multiplier: 0.0,
        reasoning: "better docs".to_string(),
        submitted_at: Utc::now(),
    }
}

fn respondent() -> Respondent {
    Respondent::new("Ada", "ada@example.org", "DEMO2024")
}

#[cfg(test)]
mod upsert_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_appends_row_and_parses_row_number() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/responses:append", VALUES_PATH)))
            .and(header("Authorization", "Bearer test-token"))
            .and(query_param("valueInputOption", "RAW"))
            .and(query_param("includeValuesInResponse", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "sheet-123",
                "updates": { "updatedRange": "responses!A15:M15", "updatedRows": 1 }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 2);
        let id = store
            .upsert(&respondent(), &create_test_record(Choice::Second, 5.0), None)
            .await
            .unwrap();
        assert_eq!(id, RecordId::new("15"));

        let requests = mock_server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let row = body["values"][0].as_array().unwrap();
        assert_eq!(row.len(), 13);
        assert_eq!(row[1], "Ada");
        assert_eq!(row[3], "DEMO2024");
        assert_eq!(row[6], "https://github.com/x/a");
        assert_eq!(row[8], 2);
        assert_eq!(row[9], 5.0);
        assert_eq!(row[11], "better docs");
        assert_eq!(row[12], 2);
    }

    #[tokio::test]
    async fn test_update_overwrites_row_in_place() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{}/responses!A15:M15", VALUES_PATH)))
            .and(query_param("valueInputOption", "RAW"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "updatedRange": "responses!A15:M15"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 2);
        let id = store
            .upsert(
                &respondent(),
                &create_test_record(Choice::First, 2.0),
                Some(RecordId::new("15")),
            )
            .await
            .unwrap();
        assert_eq!(id, RecordId::new("15"));
    }

    #[tokio::test]
    async fn test_update_with_non_row_id() {
        let mock_server = MockServer::start().await;
        let store = create_test_store(&mock_server.uri(), 0);

        let result = store
            .upsert(
                &respondent(),
                &create_test_record(Choice::First, 2.0),
                Some(RecordId::new("abc")),
            )
            .await;
        assert!(matches!(result, Err(StorageError::RecordNotFound { .. })));
    }

    #[tokio::test]
    async fn test_append_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/responses:append", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 3);
        let result = store
            .upsert(&respondent(), &create_test_record(Choice::Second, 5.0), None)
            .await;

        match result {
            Err(StorageError::Remote(SheetsError::Api { status, message })) => {
                assert_eq!(status, 503);
                assert_eq!(message, "backend error");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_append_without_updated_range() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/responses:append", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updates": {} })))
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 0);
        let result = store
            .upsert(&respondent(), &create_test_record(Choice::Second, 5.0), None)
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Remote(SheetsError::InvalidResponse { .. }))
        ));
    }
}

#[cfg(test)]
mod lookup_tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_key_filters_rows() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/responses!G:L", VALUES_PATH)))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "responses!G1:L5",
                "majorDimension": "ROWS",
                "values": [
                    ["itemAName", "itemBName", "choice", "multiplier", "logMultiplier", "reasoning"],
                    ["x/a", "x/b", "2", "5", "1.609", "more users"],
                    ["x/b ", "x/a", "1", "3", "-1.098", "stable"],
                    ["x/a", "x/c", "1", "2", "-0.693", "other pair"],
                    ["", "x/b", "1", "2", "-0.693", "no name"]
                ]
            })))
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 0);
        let peers = store.find_by_key("x/a", "x/b").await.unwrap();

        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].choice, 2);
        assert_eq!(peers[0].multiplier, 5.0);
        assert_eq!(peers[0].reasoning, "more users");
        assert_eq!(peers[1].item_a_name, "x/b");
    }

    #[tokio::test]
    async fn test_find_by_key_empty_sheet() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/responses!G:L", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "responses!G1:L1",
                "majorDimension": "ROWS"
            })))
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 0);
        assert!(store.find_by_key("x/a", "x/b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_retries_server_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/responses!G:L", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/responses!G:L", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [["itemAName", "itemBName"], ["x/a", "x/b", "1", "4", "", "ok"]]
            })))
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 2);
        let peers = store.find_by_key("x/a", "x/b").await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].multiplier, 4.0);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/responses!G:L", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 2);
        let result = store.find_by_key("x/a", "x/b").await;

        match result {
            Err(StorageError::Remote(SheetsError::Unavailable { retries, .. })) => {
                assert_eq!(retries, 3)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/responses!G:L", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 3);
        let result = store.find_by_key("x/a", "x/b").await;
        assert!(matches!(
            result,
            Err(StorageError::Remote(SheetsError::Api { status: 403, .. }))
        ));
    }
}

#[cfg(test)]
mod identity_tests {
    use super::*;

    #[tokio::test]
    async fn test_invite_code_lookup() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/invites!D:E", VALUES_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [["code", "used"], ["DEMO2024", ""], ["TEAM-7", "yes"]]
            })))
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 0);

        assert!(store.validate_identity("TEAM-7").await.unwrap().valid);

        let verdict = store.validate_identity("NOPE").await.unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.reason.as_deref(), Some("Invalid invite code"));
    }

    #[tokio::test]
    async fn test_empty_invite_code_skips_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": [] })))
            .expect(0)
            .mount(&mock_server)
            .await;

        let store = create_test_store(&mock_server.uri(), 0);
        let verdict = store.validate_identity("").await.unwrap();
        assert_eq!(verdict.reason.as_deref(), Some("Invite code is required"));
    }
}
