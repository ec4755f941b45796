//! Command-line interface.
//!
//! Exposes the pure functions (sampling, scoring, intensity validation) as
//! one-shot subcommands, a peer lookup against the configured record store,
//! and a line-oriented interactive elicitation session.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::info;

use crate::catalog::{format_repo_name, Catalog};
use crate::config::{Config, StoreBackend};
use crate::error::{AppError, AppResult, SessionError, StorageError};
use crate::sampler::generate_pairs;
use crate::scoring::{try_log_multiplier, Choice};
use crate::session::{JudgmentDraft, PersistStatus, Phase, SessionEngine, SessionSummary};
use crate::store::{
    IdentityGate, InviteList, PeerJudgment, RecordStore, Respondent, SheetsRecordStore,
    SqliteRecordStore,
};
use crate::validation::{format_intensity, parse_intensity};

const RULE: &str = "───────────────────────────────────────────────────────────────";

/// Pairwise judgment elicitation.
#[derive(Parser, Debug)]
#[command(name = "pairwise-elicit", version, about = "Collect pairwise value judgments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Draw random pairs from the catalog
    Sample {
        /// Number of pairs to draw
        #[arg(long, default_value = "3")]
        count: usize,

        /// Catalog file (defaults to CATALOG_PATH)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Convert a choice and intensity into a log score
    Score {
        /// Preferred item: 1/A or 2/B
        choice: Choice,

        /// How many times more valuable, e.g. 2.5
        intensity: String,
    },

    /// Check whether an intensity string is admissible
    Validate {
        /// Raw intensity text
        intensity: String,
    },

    /// Show stored judgments of a pair by any respondent
    Others {
        /// First item identifier
        item_a: String,

        /// Second item identifier
        item_b: String,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run an interactive session on stdin
    Session {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        invite_code: String,

        /// Catalog file (defaults to CATALOG_PATH)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Pairs per round (defaults to PAIRS_PER_ROUND)
        #[arg(long)]
        pairs_per_round: Option<usize>,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

impl From<AppResult<String>> for CliResult {
    fn from(result: AppResult<String>) -> Self {
        match result {
            Ok(message) => CliResult::success(message),
            Err(e) => CliResult::error(e.to_string()),
        }
    }
}

/// Record store and identity gate selected by configuration.
pub struct Backends {
    pub store: Arc<dyn RecordStore>,
    pub gate: Arc<dyn IdentityGate>,
}

/// Open the configured store backend.
pub async fn open_backends(config: &Config) -> AppResult<Backends> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteRecordStore::new(&config.database).await?;
            info!(path = %config.database.path.display(), "Database initialized");
            Ok(Backends {
                store: Arc::new(store),
                gate: Arc::new(InviteList::new(config.identity.invite_codes.clone())),
            })
        }
        StoreBackend::Sheets => {
            let sheets = config.sheets.as_ref().ok_or_else(|| AppError::Config {
                message: "Sheets backend selected without sheet credentials".to_string(),
            })?;
            let store = Arc::new(
                SheetsRecordStore::new(sheets, config.request.clone())
                    .map_err(StorageError::from)?,
            );
            info!(base_url = %store.base_url(), "Sheets client initialized");
            Ok(Backends {
                store: store.clone(),
                gate: store,
            })
        }
    }
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, config: &Config) -> CliResult {
    match command {
        Commands::Sample {
            count,
            catalog,
            json,
        } => execute_sample(config, catalog, count, json).into(),
        Commands::Score { choice, intensity } => execute_score(choice, &intensity).into(),
        Commands::Validate { intensity } => execute_validate(&intensity),
        Commands::Others {
            item_a,
            item_b,
            json,
        } => execute_others(config, &item_a, &item_b, json).await.into(),
        Commands::Session {
            name,
            email,
            invite_code,
            catalog,
            pairs_per_round,
        } => {
            let respondent = Respondent::new(name, email, invite_code);
            execute_session(config, respondent, catalog, pairs_per_round)
                .await
                .into()
        }
    }
}

fn load_catalog(config: &Config, path: Option<PathBuf>) -> AppResult<Catalog> {
    let path = path
        .or_else(|| config.session.catalog_path.clone())
        .ok_or_else(|| AppError::Config {
            message: "No catalog given; pass --catalog or set CATALOG_PATH".to_string(),
        })?;
    Catalog::from_file(&path)
}

fn execute_sample(
    config: &Config,
    catalog: Option<PathBuf>,
    count: usize,
    json: bool,
) -> AppResult<String> {
    let catalog = load_catalog(config, catalog)?;
    let pairs = generate_pairs(catalog.items(), count).map_err(SessionError::from)?;

    if json {
        return serde_json::to_string_pretty(&pairs).map_err(|e| AppError::Internal {
            message: e.to_string(),
        });
    }

    let lines: Vec<String> = pairs
        .iter()
        .enumerate()
        .map(|(i, (a, b))| {
            format!(
                "{:>3}. {}  vs  {}",
                i + 1,
                format_repo_name(a),
                format_repo_name(b)
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

fn execute_score(choice: Choice, intensity: &str) -> AppResult<String> {
    let intensity = parse_intensity(intensity)?;
    let score = try_log_multiplier(choice, intensity)?;
    Ok(format!("{:.6}", score))
}

fn execute_validate(intensity: &str) -> CliResult {
    match parse_intensity(intensity) {
        Ok(value) => CliResult::success(format!("valid ({})", format_intensity(value))),
        Err(e) => CliResult::error(format!("invalid: {}", e)),
    }
}

async fn execute_others(
    config: &Config,
    item_a: &str,
    item_b: &str,
    json: bool,
) -> AppResult<String> {
    let backends = open_backends(config).await?;
    let peers = backends.store.find_by_key(item_a, item_b).await?;

    if json {
        return serde_json::to_string_pretty(&peers).map_err(|e| AppError::Internal {
            message: e.to_string(),
        });
    }
    Ok(format_peers(&peers))
}

async fn execute_session(
    config: &Config,
    respondent: Respondent,
    catalog: Option<PathBuf>,
    pairs_per_round: Option<usize>,
) -> AppResult<String> {
    let catalog = load_catalog(config, catalog)?;
    let backends = open_backends(config).await?;
    let mut engine = SessionEngine::new(
        catalog,
        backends.store,
        backends.gate,
        pairs_per_round.unwrap_or(config.session.pairs_per_round),
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let summary = run_interactive(&mut engine, respondent, stdin, &mut stdout).await?;

    Ok(match summary {
        Some(summary) => summary.to_string(),
        None => format!(
            "Session {} left unfinished after round {}",
            engine.session_id(),
            engine.round()
        ),
    })
}

/// Drive a session from line input.
///
/// Returns the summary when the respondent finishes, or `None` when input
/// ends (or `:quit` is entered) in the middle of a round.
pub async fn run_interactive<R, W>(
    engine: &mut SessionEngine,
    respondent: Respondent,
    input: R,
    out: &mut W,
) -> AppResult<Option<SessionSummary>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let view = engine.start(respondent).await?;
    writeln!(out, "Welcome! Round {} has {} pairs.", view.round, view.total)?;

    loop {
        for report in engine.sync_persistence() {
            if let PersistStatus::Failed(message) = &report.status {
                writeln!(out, "  ! Could not save {}: {}", report.key, message)?;
            }
        }

        match engine.phase() {
            Phase::RoundInProgress | Phase::EditInProgress => {
                let Some(view) = engine.current_pair() else {
                    break;
                };
                writeln!(out, "{}", RULE)?;
                if view.editing {
                    writeln!(out, "Editing a round {} judgment", view.round)?;
                } else {
                    writeln!(out, "Round {} · pair {} of {}", view.round, view.position, view.total)?;
                }
                writeln!(out, "  A: {}", format_repo_name(&view.item_a))?;
                writeln!(out, "  B: {}", format_repo_name(&view.item_b))?;

                let draft = engine.draft()?;
                let hint = draft
                    .choice
                    .map(|c| format!(" (was {})", if c == Choice::First { "A" } else { "B" }))
                    .unwrap_or_default();
                let Some(answer) =
                    prompt(&mut lines, out, &format!("More valuable [A/B]{}", hint)).await?
                else {
                    break;
                };

                match answer.trim() {
                    ":quit" => break,
                    ":refresh" => {
                        if let Err(e) = engine.refresh_pairs() {
                            writeln!(out, "  {}", e)?;
                        }
                        continue;
                    }
                    ":cancel" => {
                        if let Err(e) = engine.cancel_edit() {
                            writeln!(out, "  {}", e)?;
                        }
                        continue;
                    }
                    ":others" => {
                        match engine.others_evaluations().await {
                            Ok(peers) => writeln!(out, "{}", format_peers(&peers))?,
                            Err(e) => writeln!(out, "  {}", e)?,
                        }
                        continue;
                    }
                    _ => {}
                }

                let Some(intensity) =
                    prompt(&mut lines, out, "How many times more valuable [1-999]").await?
                else {
                    break;
                };
                let Some(reasoning) = prompt(&mut lines, out, "Why").await? else {
                    break;
                };

                let draft = JudgmentDraft {
                    choice: answer.parse().ok(),
                    intensity: intensity.trim().to_string(),
                    reasoning,
                };
                let mut result = engine.submit(&draft);
                if let Err(SessionError::SubmitInFlight { .. }) = result {
                    writeln!(out, "  Waiting for the previous save to finish...")?;
                    engine.settle().await;
                    result = engine.submit(&draft);
                }
                match result {
                    Ok(receipt) => writeln!(out, "  Saved (log score {:.4})", receipt.log_score)?,
                    Err(e) if e.is_recoverable() => writeln!(out, "  {}", e)?,
                    Err(e) => return Err(e.into()),
                }
            }
            Phase::RoundReview => {
                write_review(engine, out)?;
                let Some(line) = prompt(
                    &mut lines,
                    out,
                    "[c]ontinue, [e N] edit, [r N] retry save, [f]inish",
                )
                .await?
                else {
                    break;
                };

                let mut parts = line.split_whitespace();
                let command = parts.next().unwrap_or("");
                let target = parts
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| engine.judgments().get(i))
                    .map(|j| j.key);

                let outcome = match (command, target) {
                    ("c", _) => engine.continue_round().map(|_| ()),
                    ("e", Some(key)) => engine.begin_edit(key).map(|_| ()),
                    ("r", Some(key)) => engine.retry_persist(key).map(|_| ()),
                    ("f", _) => {
                        engine.settle().await;
                        let summary = engine.finish()?;
                        return Ok(Some(summary));
                    }
                    _ => {
                        writeln!(out, "  Unknown command")?;
                        continue;
                    }
                };
                if let Err(e) = outcome {
                    writeln!(out, "  {}", e)?;
                }
            }
            Phase::Unauthenticated | Phase::Finished => break,
        }
    }

    engine.settle().await;
    if engine.phase() == Phase::RoundReview {
        return Ok(Some(engine.finish()?));
    }
    Ok(None)
}

async fn prompt<R, W>(lines: &mut Lines<R>, out: &mut W, label: &str) -> AppResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}: ", label)?;
    out.flush()?;
    Ok(lines.next_line().await?)
}

fn write_review<W: Write>(engine: &SessionEngine, out: &mut W) -> AppResult<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Round {} complete. Your judgments:", engine.round())?;
    for (i, judgment) in engine.judgments().iter().enumerate() {
        let (winner, loser) = match judgment.choice {
            Choice::First => (&judgment.item_a_name, &judgment.item_b_name),
            Choice::Second => (&judgment.item_b_name, &judgment.item_a_name),
        };
        let status = match &judgment.status {
            PersistStatus::Confirmed => "saved",
            PersistStatus::Unconfirmed => "saving",
            PersistStatus::Failed(_) => "NOT SAVED",
        };
        writeln!(
            out,
            "{:>3}. [r{}] {} is {}x {} ({})",
            i + 1,
            judgment.key.round,
            format_repo_name(winner),
            format_intensity(judgment.intensity),
            format_repo_name(loser),
            status
        )?;
    }
    Ok(())
}

fn format_peers(peers: &[PeerJudgment]) -> String {
    if peers.is_empty() {
        return "No other evaluations for this pair yet.".to_string();
    }
    let mut output = format!("{} evaluation(s):\n", peers.len());
    for peer in peers {
        let (winner, loser) = if peer.choice == 2 {
            (&peer.item_b_name, &peer.item_a_name)
        } else {
            (&peer.item_a_name, &peer.item_b_name)
        };
        output.push_str(&format!(
            "  - {} over {} ({}x): {}\n",
            format_repo_name(winner),
            format_repo_name(loser),
            format_intensity(peer.multiplier),
            peer.reasoning
        ));
    }
    output
}
