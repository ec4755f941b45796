//! # Pairwise Elicitation
//!
//! Collects human judgments comparing pairs of items (software repositories)
//! and turns each one into a signed log score for downstream Bradley-Terry
//! style ranking.
//!
//! ## Features
//!
//! - **Unbiased sampling**: pairs drawn uniformly over all unordered pairs,
//!   without repeats inside a round
//! - **Log-score transform**: "B is `m` times better" becomes `ln(m)`,
//!   preferring A flips the sign
//! - **Multi-round sessions**: review and edit any earlier judgment in place
//! - **Upsert persistence**: SQLite or Google Sheets, confirmed in the
//!   background with per-judgment failure tracking
//!
//! ## Architecture
//!
//! ```text
//! CLI → SessionEngine → Sampler / ScoreTransform / InputValidator
//!              ↓
//!        RecordStore (SQLite | Sheets), IdentityGate
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pairwise_elicitation::{Catalog, SessionEngine, JudgmentDraft, Choice};
//! use pairwise_elicitation::store::{InviteList, Respondent, SqliteRecordStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteRecordStore::new_in_memory().await?);
//!     let gate = Arc::new(InviteList::new(["DEMO2024"]));
//!     let catalog = Catalog::new(["https://github.com/a/a", "https://github.com/b/b"]);
//!
//!     let mut engine = SessionEngine::new(catalog, store, gate, 3);
//!     engine.start(Respondent::new("Ada", "ada@example.org", "DEMO2024")).await?;
//!     engine.submit(&JudgmentDraft::new(Choice::Second, "5", "more dependents"))?;
//!     engine.settle().await;
//!     Ok(())
//! }
//! ```

/// Fixed item catalog.
pub mod catalog;
/// Command-line interface.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Unbiased pair sampling.
pub mod sampler;
/// Choice plus intensity to log score.
pub mod scoring;
/// Multi-round session state machine.
pub mod session;
/// Record store and identity gate adapters.
pub mod store;
/// Intensity, reasoning and email admissibility.
pub mod validation;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{AppError, AppResult, SessionError, SessionResult};
pub use scoring::{log_multiplier, Choice};
pub use session::{JudgmentDraft, JudgmentKey, Phase, SessionEngine};
