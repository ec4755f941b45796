use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{JudgmentRecord, PeerJudgment, RecordId, RecordStore, Respondent};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::scoring::Choice;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

/// A persisted judgment together with its id and author.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJudgment {
    pub id: RecordId,
    pub respondent: Respondent,
    pub record: JudgmentRecord,
}

impl SqliteRecordStore {
    /// Create a new SQLite store, creating the database file if needed
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create a store over a private in-memory database
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // Each connection to :memory: is its own database; keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch a single persisted judgment
    pub async fn get_record(&self, id: &RecordId) -> StorageResult<Option<StoredJudgment>> {
        let Ok(row_id) = id.as_str().parse::<i64>() else {
            return Ok(None);
        };

        let row: Option<JudgmentRow> = sqlx::query_as(
            r#"
            SELECT id, respondent_name, respondent_email, invite_code, round,
                   item_a_index, item_b_index, item_a_name, item_b_name,
                   choice, multiplier, log_multiplier, reasoning, submitted_at
            FROM judgments
            WHERE id = ?
            "#,
        )
        .bind(row_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JudgmentRow::into_stored).transpose()
    }

    /// All judgments submitted under an invite code, oldest first
    pub async fn records_for(&self, invite_code: &str) -> StorageResult<Vec<StoredJudgment>> {
        let rows: Vec<JudgmentRow> = sqlx::query_as(
            r#"
            SELECT id, respondent_name, respondent_email, invite_code, round,
                   item_a_index, item_b_index, item_a_name, item_b_name,
                   choice, multiplier, log_multiplier, reasoning, submitted_at
            FROM judgments
            WHERE invite_code = ?
            ORDER BY id ASC
            "#,
        )
        .bind(invite_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JudgmentRow::into_stored).collect()
    }

    /// Total number of persisted judgments
    pub async fn count_records(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM judgments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(
        &self,
        respondent: &Respondent,
        record: &JudgmentRecord,
        existing: Option<RecordId>,
    ) -> StorageResult<RecordId> {
        match existing {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO judgments (
                        respondent_name, respondent_email, invite_code, round,
                        item_a_index, item_b_index, item_a_name, item_b_name,
                        choice, multiplier, log_multiplier, reasoning, submitted_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&respondent.name)
                .bind(&respondent.email)
                .bind(&respondent.invite_code)
                .bind(i64::from(record.round))
                .bind(record.item_a_index as i64)
                .bind(record.item_b_index as i64)
                .bind(&record.item_a_name)
                .bind(&record.item_b_name)
                .bind(i64::from(record.choice.code()))
                .bind(record.multiplier)
                .bind(record.log_multiplier)
                .bind(&record.reasoning)
                .bind(record.submitted_at.to_rfc3339())
                .execute(&self.pool)
                .await?;

                let id = RecordId::new(result.last_insert_rowid().to_string());
                debug!(record_id = %id, round = record.round, "Judgment record created");
                Ok(id)
            }
            Some(id) => {
                let row_id = id
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| StorageError::RecordNotFound {
                        record_id: id.to_string(),
                    })?;

                let result = sqlx::query(
                    r#"
                    UPDATE judgments
                    SET respondent_name = ?, respondent_email = ?, invite_code = ?, round = ?,
                        item_a_index = ?, item_b_index = ?, item_a_name = ?, item_b_name = ?,
                        choice = ?, multiplier = ?, log_multiplier = ?, reasoning = ?,
                        submitted_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&respondent.name)
                .bind(&respondent.email)
                .bind(&respondent.invite_code)
                .bind(i64::from(record.round))
                .bind(record.item_a_index as i64)
                .bind(record.item_b_index as i64)
                .bind(&record.item_a_name)
                .bind(&record.item_b_name)
                .bind(i64::from(record.choice.code()))
                .bind(record.multiplier)
                .bind(record.log_multiplier)
                .bind(&record.reasoning)
                .bind(record.submitted_at.to_rfc3339())
                .bind(row_id)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StorageError::RecordNotFound {
                        record_id: id.to_string(),
                    });
                }

                debug!(record_id = %id, round = record.round, "Judgment record updated");
                Ok(id)
            }
        }
    }

    async fn find_by_key(&self, item_a: &str, item_b: &str) -> StorageResult<Vec<PeerJudgment>> {
        let rows: Vec<PeerRow> = sqlx::query_as(
            r#"
            SELECT item_a_name, item_b_name, choice, multiplier, reasoning
            FROM judgments
            WHERE (item_a_name = ? AND item_b_name = ?)
               OR (item_a_name = ? AND item_b_name = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(item_a)
        .bind(item_b)
        .bind(item_b)
        .bind(item_a)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct JudgmentRow {
    id: i64,
    respondent_name: String,
    respondent_email: String,
    invite_code: String,
    round: i64,
    item_a_index: i64,
    item_b_index: i64,
    item_a_name: String,
    item_b_name: String,
    choice: i64,
    multiplier: f64,
    log_multiplier: f64,
    reasoning: String,
    submitted_at: String,
}

impl JudgmentRow {
    fn into_stored(self) -> StorageResult<StoredJudgment> {
        use chrono::DateTime;

        let id = self.id;
        let choice = Choice::from_code(self.choice).ok_or_else(|| StorageError::Query {
            message: format!("Invalid choice {} in record {}", self.choice, id),
        })?;
        let invalid_column = |column: &str| StorageError::Query {
            message: format!("Invalid {} in record {}", column, id),
        };

        Ok(StoredJudgment {
            id: RecordId::new(id.to_string()),
            respondent: Respondent {
                name: self.respondent_name,
                email: self.respondent_email,
                invite_code: self.invite_code,
            },
            record: JudgmentRecord {
                round: u32::try_from(self.round).map_err(|_| invalid_column("round"))?,
                item_a_index: usize::try_from(self.item_a_index)
                    .map_err(|_| invalid_column("item_a_index"))?,
                item_b_index: usize::try_from(self.item_b_index)
                    .map_err(|_| invalid_column("item_b_index"))?,
                item_a_name: self.item_a_name,
                item_b_name: self.item_b_name,
                choice,
                multiplier: self.multiplier,
                log_multiplier: self.log_multiplier,
                reasoning: self.reasoning,
                submitted_at: DateTime::parse_from_rfc3339(&self.submitted_at)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct PeerRow {
    item_a_name: String,
    item_b_name: String,
    choice: i64,
    multiplier: f64,
    reasoning: String,
}

impl From<PeerRow> for PeerJudgment {
    fn from(row: PeerRow) -> Self {
        Self {
            item_a_name: row.item_a_name,
            item_b_name: row.item_b_name,
            choice: u8::try_from(row.choice).unwrap_or(1),
            multiplier: row.multiplier,
            reasoning: row.reasoning,
        }
    }
}
