use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub sheets: Option<SheetsConfig>,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub session: SessionConfig,
    pub identity: IdentityConfig,
}

/// Which record store backs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Sheets,
}

/// Record store selection
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Google Sheets configuration.
///
/// The access token is minted outside this crate and passed in as-is.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub base_url: String,
    pub spreadsheet_id: String,
    pub access_token: String,
    pub responses_tab: String,
    pub invites_tab: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Elicitation session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pairs_per_round: usize,
    pub catalog_path: Option<PathBuf>,
}

/// Invite codes accepted by the static identity gate
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub invite_codes: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => StoreBackend::Sqlite,
            "sheets" => StoreBackend::Sheets,
            other => {
                return Err(AppError::Config {
                    message: format!("Unknown STORE_BACKEND: {}", other),
                })
            }
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/judgments.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let sheets = match (env::var("GOOGLE_SHEET_ID"), env::var("GOOGLE_ACCESS_TOKEN")) {
            (Ok(spreadsheet_id), Ok(access_token)) => Some(SheetsConfig {
                base_url: env::var("SHEETS_BASE_URL")
                    .unwrap_or_else(|_| "https://sheets.googleapis.com".to_string()),
                spreadsheet_id,
                access_token,
                responses_tab: env::var("SHEETS_RESPONSES_TAB")
                    .unwrap_or_else(|_| "responses".to_string()),
                invites_tab: env::var("SHEETS_INVITES_TAB")
                    .unwrap_or_else(|_| "invites".to_string()),
            }),
            _ => None,
        };

        if backend == StoreBackend::Sheets && sheets.is_none() {
            return Err(AppError::Config {
                message: "GOOGLE_SHEET_ID and GOOGLE_ACCESS_TOKEN are required for the sheets backend"
                    .to_string(),
            });
        }

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let pairs_per_round = match env::var("PAIRS_PER_ROUND") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(AppError::Config {
                        message: format!("PAIRS_PER_ROUND must be a positive integer, got {:?}", raw),
                    })
                }
            },
            Err(_) => SessionConfig::default().pairs_per_round,
        };

        let session = SessionConfig {
            pairs_per_round,
            catalog_path: env::var("CATALOG_PATH").ok().map(PathBuf::from),
        };

        let identity = IdentityConfig {
            invite_codes: env::var("INVITE_CODES")
                .map(|s| parse_invite_codes(&s))
                .unwrap_or_else(|_| IdentityConfig::default().invite_codes),
        };

        Ok(Config {
            store: StoreConfig { backend },
            database,
            sheets,
            logging,
            request,
            session,
            identity,
        })
    }
}

fn parse_invite_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pairs_per_round: 3,
            catalog_path: None,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            invite_codes: vec!["DEMO2024".to_string()],
        }
    }
}
