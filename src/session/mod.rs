//! Multi-round elicitation session.
//!
//! # Phases
//!
//! ```text
//! Unauthenticated -> RoundInProgress -> RoundReview -> RoundInProgress (next round)
//!                                        |    ^  \
//!                                        v    |   -> Finished
//!                                     EditInProgress
//! ```
//!
//! A submit applies the judgment locally first and confirms it through the
//! record store in the background. Each judgment carries a
//! [`PersistStatus`]; a failed write stays in place and can be retried.

mod engine;
mod persist;
mod types;

pub use engine::SessionEngine;
pub use types::{
    EditContinuation, Judgment, JudgmentDraft, JudgmentKey, PairView, PersistStatus,
    PersistenceReport, Phase, SessionSummary, SubmitReceipt,
};
