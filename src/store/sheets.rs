use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{
    IdentityGate, IdentityVerdict, JudgmentRecord, PeerJudgment, RecordId, RecordStore,
    Respondent,
};
use crate::config::{RequestConfig, SheetsConfig};
use crate::error::{SheetsError, SheetsResult, StorageError, StorageResult};
use crate::scoring::Choice;

/// Last column of a response row (`A` through `M`).
const LAST_COLUMN: &str = "M";

/// Record store backed by a Google Sheets spreadsheet.
///
/// Each judgment is one row of the responses tab:
///
/// ```text
/// A timestamp | B name | C email | D invite code | E itemAIndex | F itemBIndex |
/// G itemAName | H itemBName | I choice | J multiplier | K logMultiplier |
/// L reasoning | M round
/// ```
///
/// The record id is the 1-based row number.
#[derive(Clone)]
pub struct SheetsRecordStore {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: String,
    responses_tab: String,
    invites_tab: String,
    request_config: RequestConfig,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

impl SheetsRecordStore {
    /// Create a new Sheets store
    pub fn new(config: &SheetsConfig, request_config: RequestConfig) -> SheetsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(SheetsError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            access_token: config.access_token.clone(),
            responses_tab: config.responses_tab.clone(),
            invites_tab: config.invites_tab.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, self.spreadsheet_id, range
        )
    }

    /// Append a row to the responses tab and return its 1-based row number.
    ///
    /// Appends are not retried: a retry after a lost response would add a
    /// second row.
    async fn append_row(&self, row: Vec<Value>) -> SheetsResult<u32> {
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS&includeValuesInResponse=true",
            self.values_url(&self.responses_tab)
        );

        let response = self
            .execute(self.client.post(&url).json(&json!({ "values": [row] })))
            .await?;

        let body: AppendResponse =
            response
                .json()
                .await
                .map_err(|e| SheetsError::InvalidResponse {
                    message: format!("Failed to parse append response: {}", e),
                })?;

        body.updates
            .and_then(|u| u.updated_range)
            .as_deref()
            .and_then(parse_row_number)
            .ok_or_else(|| SheetsError::InvalidResponse {
                message: "Append response did not include an updated range".to_string(),
            })
    }

    /// Overwrite a full response row in place.
    async fn update_row(&self, row_number: u32, row: Vec<Value>) -> SheetsResult<()> {
        let range = format!(
            "{}!A{}:{}{}",
            self.responses_tab, row_number, LAST_COLUMN, row_number
        );
        let url = format!("{}?valueInputOption=RAW", self.values_url(&range));
        let body = json!({ "values": [row] });

        self.execute_with_retry("update", || self.client.put(&url).json(&body))
            .await?;
        Ok(())
    }

    /// Read a range as rows of cell text.
    async fn get_values(&self, range: &str) -> SheetsResult<Vec<Vec<String>>> {
        let url = self.values_url(range);
        let response = self
            .execute_with_retry("read", || self.client.get(&url))
            .await?;

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| SheetsError::InvalidResponse {
                message: format!("Failed to parse values response: {}", e),
            })?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    /// Run an idempotent request with exponential backoff.
    async fn execute_with_retry<F>(&self, operation: &str, build: F) -> SheetsResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    operation,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Sheets request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute(build()).await {
                Ok(response) => {
                    debug!(
                        operation,
                        latency_ms = start.elapsed().as_millis(),
                        "Sheets request succeeded"
                    );
                    return Ok(response);
                }
                // Client errors will not change on retry.
                Err(e @ SheetsError::Api { status, .. }) if status < 500 => return Err(e),
                Err(e) => {
                    error!(
                        operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Sheets request failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(SheetsError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute(&self, request: RequestBuilder) -> SheetsResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SheetsError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    SheetsError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl RecordStore for SheetsRecordStore {
    async fn upsert(
        &self,
        respondent: &Respondent,
        record: &JudgmentRecord,
        existing: Option<RecordId>,
    ) -> StorageResult<RecordId> {
        let row = build_row(respondent, record);

        match existing {
            None => {
                let row_number = self.append_row(row).await?;
                info!(row = row_number, round = record.round, "Judgment row appended");
                Ok(RecordId::new(row_number.to_string()))
            }
            Some(id) => {
                let row_number = id
                    .as_str()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| StorageError::RecordNotFound {
                        record_id: id.to_string(),
                    })?;
                self.update_row(row_number, row).await?;
                info!(row = row_number, round = record.round, "Judgment row updated");
                Ok(id)
            }
        }
    }

    async fn find_by_key(&self, item_a: &str, item_b: &str) -> StorageResult<Vec<PeerJudgment>> {
        let range = format!("{}!G:L", self.responses_tab);
        let rows = self.get_values(&range).await?;
        Ok(matching_peer_rows(&rows, item_a, item_b))
    }
}

#[async_trait]
impl IdentityGate for SheetsRecordStore {
    async fn validate_identity(&self, code: &str) -> StorageResult<IdentityVerdict> {
        if code.is_empty() {
            return Ok(IdentityVerdict::rejected("Invite code is required"));
        }

        let range = format!("{}!D:E", self.invites_tab);
        let rows = self.get_values(&range).await?;

        if rows.iter().any(|row| row.first().map(String::as_str) == Some(code)) {
            Ok(IdentityVerdict::accepted())
        } else {
            Ok(IdentityVerdict::rejected("Invalid invite code"))
        }
    }
}

fn build_row(respondent: &Respondent, record: &JudgmentRecord) -> Vec<Value> {
    vec![
        json!(record.submitted_at.to_rfc3339()),
        json!(respondent.name),
        json!(respondent.email),
        json!(respondent.invite_code),
        json!(record.item_a_index),
        json!(record.item_b_index),
        json!(record.item_a_name),
        json!(record.item_b_name),
        json!(record.choice.code()),
        json!(record.multiplier),
        json!(record.log_multiplier),
        json!(record.reasoning),
        json!(record.round),
    ]
}

/// Filter `G:L` rows (header first) down to the unordered pair.
///
/// Rows missing either item name are skipped; unparsable choice or
/// multiplier cells read as 1.
fn matching_peer_rows(rows: &[Vec<String>], item_a: &str, item_b: &str) -> Vec<PeerJudgment> {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let name_a = row.first()?.trim();
            let name_b = row.get(1)?.trim();
            if name_a.is_empty() || name_b.is_empty() {
                return None;
            }
            let matches =
                (name_a == item_a && name_b == item_b) || (name_a == item_b && name_b == item_a);
            if !matches {
                return None;
            }

            let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
            Some(PeerJudgment {
                item_a_name: name_a.to_string(),
                item_b_name: name_b.to_string(),
                choice: parse_choice_cell(cell(2)),
                multiplier: cell(3).parse().unwrap_or(1.0),
                reasoning: cell(5).to_string(),
            })
        })
        .collect()
}

/// Stored choice as `1`/`2`, accepting `A`/`B` and numeric text such as
/// `2.0`. Anything else reads as 1.
fn parse_choice_cell(cell: &str) -> u8 {
    if let Ok(choice) = cell.parse::<Choice>() {
        return choice.code();
    }
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0)
        .and_then(|v| Choice::from_code(v as i64))
        .map_or(1, Choice::code)
}

/// Extract the first row number from an A1 range such as `responses!A15:M15`.
fn parse_row_number(range: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^\$?[A-Z]+\$?(\d+)").expect("valid range regex"));
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    pattern
        .captures(cells)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_parse_row_number() {
        assert_eq!(parse_row_number("responses!A15:M15"), Some(15));
        assert_eq!(parse_row_number("'tab 2024'!A7:M7"), Some(7));
        assert_eq!(parse_row_number("A3:M3"), Some(3));
        assert_eq!(parse_row_number("TAB1!A5:M5"), Some(5));
        assert_eq!(parse_row_number("responses"), None);
    }

    #[test]
    fn test_matching_peer_rows_either_order() {
        let data = rows(&[
            &["itemAName", "itemBName", "choice", "multiplier", "log", "reasoning"],
            &["x/a", "x/b", "2", "5", "1.6", " broader use "],
            &[" x/b ", "x/a", "1", "3", "-1.1", "docs"],
            &["x/a", "x/c", "1", "2", "-0.7", "unrelated"],
            &["", "x/b", "1", "2", "-0.7", "missing name"],
            &["x/a"],
        ]);
        let found = matching_peer_rows(&data, "x/a", "x/b");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].choice, 2);
        assert_eq!(found[0].multiplier, 5.0);
        assert_eq!(found[0].reasoning, "broader use");
        assert_eq!(found[1].item_a_name, "x/b");
    }

    #[test]
    fn test_matching_peer_rows_defaults_unparsable_cells() {
        let data = rows(&[
            &["header"],
            &["x/a", "x/b", "?", "lots"],
        ]);
        let found = matching_peer_rows(&data, "x/b", "x/a");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].choice, 1);
        assert_eq!(found[0].multiplier, 1.0);
        assert_eq!(found[0].reasoning, "");
    }

    #[test]
    fn test_matching_peer_rows_letter_choices() {
        let data = rows(&[
            &["header"],
            &["x/a", "x/b", "B", "4"],
            &["x/a", "x/b", "a", "2"],
            &["x/a", "x/b", "2.0", "3"],
        ]);
        let found = matching_peer_rows(&data, "x/a", "x/b");
        let choices: Vec<u8> = found.iter().map(|p| p.choice).collect();
        assert_eq!(choices, vec![2, 1, 2]);
    }

    #[test]
    fn test_parse_choice_cell() {
        assert_eq!(parse_choice_cell("2"), 2);
        assert_eq!(parse_choice_cell("B"), 2);
        assert_eq!(parse_choice_cell("1.0"), 1);
        assert_eq!(parse_choice_cell("2.5"), 1);
        assert_eq!(parse_choice_cell("3"), 1);
        assert_eq!(parse_choice_cell(""), 1);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("a")), "a");
        assert_eq!(cell_text(&json!(2)), "2");
        assert_eq!(cell_text(&Value::Null), "");
    }
}
