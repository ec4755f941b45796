use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::persist::{spawn_upsert, PersistOutcome};
use super::types::{
    EditContinuation, Judgment, JudgmentDraft, JudgmentKey, PairView, PersistStatus,
    PersistenceReport, Phase, SessionSummary, SubmitReceipt,
};
use crate::catalog::Catalog;
use crate::error::{SamplerError, SessionError, SessionResult};
use crate::sampler::{generate_index_pairs_excluding, pair_count, IndexPair, PairKey};
use crate::scoring::{process_comparison_results, try_log_multiplier, RawComparison, ScoredComparison};
use crate::store::{IdentityGate, PeerJudgment, RecordStore, Respondent};
use crate::validation::{is_valid_email, parse_intensity, validate_reasoning};

/// Multi-round elicitation session.
///
/// Every mutating call takes `&mut self`; persistence runs on background
/// tasks whose outcomes are applied at the start of the next mutating call
/// (or explicitly through [`SessionEngine::sync_persistence`]). Submitting
/// spawns a task, so it must run inside a Tokio runtime.
pub struct SessionEngine {
    catalog: Catalog,
    store: Arc<dyn RecordStore>,
    gate: Arc<dyn IdentityGate>,
    pairs_per_round: usize,
    session_id: Uuid,
    respondent: Option<Respondent>,
    phase: Phase,
    round: u32,
    pairs: Vec<IndexPair>,
    pair_index: usize,
    judgments: Vec<Judgment>,
    edit_target: Option<JudgmentKey>,
    continuation: Option<EditContinuation>,
    in_flight: HashSet<JudgmentKey>,
    outcomes_tx: UnboundedSender<PersistOutcome>,
    outcomes_rx: UnboundedReceiver<PersistOutcome>,
    rng: Box<dyn RngCore + Send>,
}

impl SessionEngine {
    /// Create an engine drawing pairs from the OS random source.
    pub fn new(
        catalog: Catalog,
        store: Arc<dyn RecordStore>,
        gate: Arc<dyn IdentityGate>,
        pairs_per_round: usize,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            catalog,
            store,
            gate,
            pairs_per_round,
            session_id: Uuid::new_v4(),
            respondent: None,
            phase: Phase::Unauthenticated,
            round: 0,
            pairs: Vec::new(),
            pair_index: 0,
            judgments: Vec::new(),
            edit_target: None,
            continuation: None,
            in_flight: HashSet::new(),
            outcomes_tx,
            outcomes_rx,
            rng: Box::new(OsRng),
        }
    }

    /// Replace the random source (seeded draws in tests).
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round number; 0 before the session starts.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn respondent(&self) -> Option<&Respondent> {
        self.respondent.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// All judgments in creation order.
    pub fn judgments(&self) -> &[Judgment] {
        &self.judgments
    }

    pub fn judgment(&self, key: &JudgmentKey) -> Option<&Judgment> {
        self.judgments.iter().find(|j| j.key == *key)
    }

    pub fn round_judgments(&self, round: u32) -> Vec<&Judgment> {
        self.judgments
            .iter()
            .filter(|j| j.key.round == round)
            .collect()
    }

    pub fn failed_judgments(&self) -> Vec<&Judgment> {
        self.judgments
            .iter()
            .filter(|j| j.status.is_failed())
            .collect()
    }

    /// Whether a persistence call for `key` has not been applied yet.
    pub fn is_in_flight(&self, key: &JudgmentKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Log scores of every judgment, for downstream ranking.
    pub fn export_scores(&self) -> Vec<ScoredComparison> {
        let raw: Vec<RawComparison> = self
            .judgments
            .iter()
            .map(|j| RawComparison {
                item_a_index: j.key.item_a_index,
                item_b_index: j.key.item_b_index,
                choice: j.choice,
                multiplier: j.intensity,
            })
            .collect();
        process_comparison_results(&raw)
    }

    /// The pair on screen, if any.
    pub fn current_pair(&self) -> Option<PairView> {
        if !self.phase.is_presenting() {
            return None;
        }
        let pair = *self.pairs.get(self.pair_index)?;
        let round = self.edit_target.map(|k| k.round).unwrap_or(self.round);

        Some(PairView {
            round,
            position: self.pair_index + 1,
            total: self.pairs.len(),
            item_a: self.item_name(pair.a),
            item_b: self.item_name(pair.b),
            item_a_index: pair.a,
            item_b_index: pair.b,
            editing: self.phase == Phase::EditInProgress,
        })
    }

    /// Form contents for the pair on screen: stored values when a judgment
    /// exists for it, empty otherwise.
    pub fn draft(&self) -> SessionResult<JudgmentDraft> {
        let key = self.presented_key("draft")?;
        Ok(self
            .judgment(&key)
            .map(Judgment::to_draft)
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Admit a respondent and open round 1.
    pub async fn start(&mut self, respondent: Respondent) -> SessionResult<PairView> {
        self.require(&[Phase::Unauthenticated], "start")?;
        if self.pairs_per_round == 0 {
            return Err(SessionError::invalid_input("pairs_per_round", "must be at least 1"));
        }

        let name = respondent.name.trim();
        if name.is_empty() {
            return Err(SessionError::invalid_input("name", "cannot be empty"));
        }
        if !is_valid_email(respondent.email.trim()) {
            return Err(SessionError::invalid_input("email", "not a valid email address"));
        }

        let verdict = self
            .gate
            .validate_identity(respondent.invite_code.trim())
            .await?;
        if !verdict.valid {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "Invalid invite code".to_string());
            warn!(session_id = %self.session_id, reason = %reason, "Identity rejected");
            return Err(SessionError::IdentityRejected { reason });
        }

        let pairs = self.draw(&HashSet::new(), self.round_size())?;

        self.respondent = Some(Respondent::new(
            name,
            respondent.email.trim(),
            respondent.invite_code.trim(),
        ));
        self.round = 1;
        self.pairs = pairs;
        self.pair_index = 0;
        self.phase = Phase::RoundInProgress;

        info!(
            session_id = %self.session_id,
            pairs = self.pairs.len(),
            catalog_size = self.catalog.len(),
            "Session started"
        );
        self.current_pair().ok_or_else(|| self.no_pair("start"))
    }

    /// Validate, score and apply a judgment for the pair on screen, then
    /// persist it in the background.
    pub fn submit(&mut self, draft: &JudgmentDraft) -> SessionResult<SubmitReceipt> {
        self.sync_persistence();
        self.require(&[Phase::RoundInProgress, Phase::EditInProgress], "submit")?;

        let choice = draft
            .choice
            .ok_or_else(|| SessionError::invalid_input("choice", "select one of the two items"))?;
        let intensity = parse_intensity(&draft.intensity)?;
        let reasoning = validate_reasoning(&draft.reasoning)?;

        let key = self.presented_key("submit")?;
        if self.in_flight.contains(&key) {
            return Err(SessionError::SubmitInFlight { key });
        }
        let log_score = try_log_multiplier(choice, intensity)?;

        let now = Utc::now();
        let created = match self.judgments.iter_mut().find(|j| j.key == key) {
            Some(existing) => {
                existing.choice = choice;
                existing.intensity = intensity;
                existing.log_score = log_score;
                existing.reasoning = reasoning;
                existing.status = PersistStatus::Unconfirmed;
                existing.updated_at = now;
                false
            }
            None => {
                let judgment = Judgment {
                    key,
                    item_a_name: self.item_name(key.item_a_index),
                    item_b_name: self.item_name(key.item_b_index),
                    choice,
                    intensity,
                    log_score,
                    reasoning,
                    record_id: None,
                    status: PersistStatus::Unconfirmed,
                    updated_at: now,
                };
                self.judgments.push(judgment);
                true
            }
        };

        self.persist(key)?;

        if self.phase == Phase::EditInProgress {
            self.restore_continuation();
        } else {
            self.pair_index += 1;
            if self.pair_index >= self.pairs.len() {
                self.phase = Phase::RoundReview;
                info!(session_id = %self.session_id, round = self.round, "Round complete");
            }
        }

        debug!(key = %key, log_score, created, "Judgment applied");
        Ok(SubmitReceipt {
            key,
            log_score,
            created,
            phase: self.phase,
        })
    }

    /// Re-open an earlier judgment for editing.
    pub fn begin_edit(&mut self, key: JudgmentKey) -> SessionResult<JudgmentDraft> {
        self.sync_persistence();
        self.require(&[Phase::RoundReview], "edit")?;

        let draft = self
            .judgment(&key)
            .map(Judgment::to_draft)
            .ok_or(SessionError::UnknownJudgment { key })?;

        self.continuation = Some(EditContinuation {
            round: self.round,
            pair_index: self.pair_index,
            pairs: mem::take(&mut self.pairs),
        });
        self.pairs = vec![key.pair()];
        self.pair_index = 0;
        self.edit_target = Some(key);
        self.phase = Phase::EditInProgress;

        info!(session_id = %self.session_id, key = %key, "Editing judgment");
        Ok(draft)
    }

    /// Leave edit mode without changing anything.
    pub fn cancel_edit(&mut self) -> SessionResult<()> {
        self.sync_persistence();
        self.require(&[Phase::EditInProgress], "cancel edit")?;
        self.restore_continuation();
        Ok(())
    }

    /// Open the next round with a fresh draw.
    pub fn continue_round(&mut self) -> SessionResult<PairView> {
        self.sync_persistence();
        self.require(&[Phase::RoundReview], "continue")?;

        let pairs = self.draw(&HashSet::new(), self.round_size())?;
        self.round += 1;
        self.pairs = pairs;
        self.pair_index = 0;
        self.phase = Phase::RoundInProgress;

        info!(session_id = %self.session_id, round = self.round, "Round started");
        self.current_pair().ok_or_else(|| self.no_pair("continue"))
    }

    /// Close the session.
    pub fn finish(&mut self) -> SessionResult<SessionSummary> {
        self.sync_persistence();
        self.require(&[Phase::RoundReview], "finish")?;

        self.phase = Phase::Finished;
        let summary = self.summary();
        info!(
            session_id = %self.session_id,
            rounds = summary.rounds,
            judgments = summary.judgments,
            failed = summary.failed,
            "Session finished"
        );
        Ok(summary)
    }

    /// Discard the pair on screen and redraw the rest of the round.
    ///
    /// Pairs already submitted this round are kept and never redrawn. The
    /// discarded pair is avoided when the catalog has room for it.
    pub fn refresh_pairs(&mut self) -> SessionResult<PairView> {
        self.sync_persistence();
        self.require(&[Phase::RoundInProgress], "refresh pairs")?;

        let discarded = *self
            .pairs
            .get(self.pair_index)
            .ok_or_else(|| self.no_pair("refresh pairs"))?;
        let remaining = self.pairs.len() - self.pair_index;

        let mut exclude: HashSet<PairKey> = self.pairs[..self.pair_index]
            .iter()
            .map(IndexPair::key)
            .collect();
        let without_discarded = exclude.clone();
        exclude.insert(discarded.key());

        let fresh = match self.draw(&exclude, remaining) {
            Err(SessionError::Sampler(SamplerError::TooManyPairs { .. })) => {
                self.draw(&without_discarded, remaining)?
            }
            other => other?,
        };

        self.pairs.truncate(self.pair_index);
        self.pairs.extend(fresh);

        let discarded_key = JudgmentKey::for_pair(self.round, discarded);
        let before = self.judgments.len();
        self.judgments.retain(|j| j.key != discarded_key);

        info!(
            session_id = %self.session_id,
            round = self.round,
            redrawn = remaining,
            removed = before - self.judgments.len(),
            "Pairs refreshed"
        );
        self.current_pair().ok_or_else(|| self.no_pair("refresh pairs"))
    }

    /// Re-issue the upsert for a failed judgment.
    ///
    /// Returns `false` when the judgment has not failed and nothing was sent.
    pub fn retry_persist(&mut self, key: JudgmentKey) -> SessionResult<bool> {
        self.sync_persistence();
        if matches!(self.phase, Phase::Unauthenticated | Phase::Finished) {
            return Err(SessionError::InvalidTransition {
                action: "retry persistence",
                phase: self.phase,
            });
        }
        if self.in_flight.contains(&key) {
            return Err(SessionError::SubmitInFlight { key });
        }

        let judgment = self
            .judgments
            .iter_mut()
            .find(|j| j.key == key)
            .ok_or(SessionError::UnknownJudgment { key })?;
        if !judgment.status.is_failed() {
            return Ok(false);
        }
        judgment.status = PersistStatus::Unconfirmed;

        self.persist(key)?;
        info!(key = %key, "Retrying persistence");
        Ok(true)
    }

    /// Apply every completed persistence outcome to local state.
    pub fn sync_persistence(&mut self) -> Vec<PersistenceReport> {
        let mut reports = Vec::new();
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            if let Some(report) = self.apply_outcome(outcome) {
                reports.push(report);
            }
        }
        reports
    }

    /// Wait until no persistence call is in flight.
    pub async fn settle(&mut self) -> Vec<PersistenceReport> {
        let mut reports = self.sync_persistence();
        while !self.in_flight.is_empty() {
            // The engine holds a sender, so the channel never closes here.
            let Some(outcome) = self.outcomes_rx.recv().await else {
                break;
            };
            if let Some(report) = self.apply_outcome(outcome) {
                reports.push(report);
            }
        }
        reports
    }

    /// Other respondents' judgments of the pair on screen.
    pub async fn others_evaluations(&self) -> SessionResult<Vec<PeerJudgment>> {
        let key = self.presented_key("look up evaluations")?;
        let item_a = self.item_name(key.item_a_index);
        let item_b = self.item_name(key.item_b_index);
        Ok(self.store.find_by_key(&item_a, &item_b).await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require(&self, allowed: &[Phase], action: &'static str) -> SessionResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    fn no_pair(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }

    /// Key of the judgment the on-screen pair maps to. In edit mode this is
    /// the edited judgment's original key.
    fn presented_key(&self, action: &'static str) -> SessionResult<JudgmentKey> {
        if !self.phase.is_presenting() {
            return Err(self.no_pair(action));
        }
        if let Some(target) = self.edit_target {
            return Ok(target);
        }
        self.pairs
            .get(self.pair_index)
            .map(|pair| JudgmentKey::for_pair(self.round, *pair))
            .ok_or_else(|| self.no_pair(action))
    }

    fn round_size(&self) -> usize {
        self.pairs_per_round.min(pair_count(self.catalog.len()))
    }

    fn draw(&mut self, exclude: &HashSet<PairKey>, count: usize) -> SessionResult<Vec<IndexPair>> {
        Ok(generate_index_pairs_excluding(
            self.catalog.len(),
            count,
            exclude,
            &mut *self.rng,
        )?)
    }

    fn item_name(&self, index: usize) -> String {
        self.catalog.get(index).unwrap_or_default().to_string()
    }

    fn restore_continuation(&mut self) {
        if let Some(resume) = self.continuation.take() {
            self.round = resume.round;
            self.pair_index = resume.pair_index;
            self.pairs = resume.pairs;
        }
        self.edit_target = None;
        self.phase = Phase::RoundReview;
    }

    fn persist(&mut self, key: JudgmentKey) -> SessionResult<()> {
        let respondent = self
            .respondent
            .clone()
            .ok_or_else(|| self.no_pair("persist"))?;
        let judgment = self
            .judgment(&key)
            .ok_or(SessionError::UnknownJudgment { key })?;
        let record = judgment.to_record();
        let existing = judgment.record_id.clone();

        debug!(key = %key, update = existing.is_some(), "Persisting judgment");
        self.in_flight.insert(key);
        spawn_upsert(
            Arc::clone(&self.store),
            respondent,
            record,
            existing,
            key,
            self.outcomes_tx.clone(),
        );
        Ok(())
    }

    fn apply_outcome(&mut self, outcome: PersistOutcome) -> Option<PersistenceReport> {
        let PersistOutcome { key, result } = outcome;
        self.in_flight.remove(&key);

        let Some(judgment) = self.judgments.iter_mut().find(|j| j.key == key) else {
            debug!(key = %key, "Persistence outcome for a discarded judgment");
            return None;
        };

        match result {
            Ok(record_id) => {
                if judgment.record_id.is_none() {
                    judgment.record_id = Some(record_id);
                }
                judgment.status = PersistStatus::Confirmed;
                debug!(key = %key, record_id = ?judgment.record_id, "Judgment persisted");
            }
            Err(message) => {
                let error = SessionError::PersistenceFailure {
                    key,
                    message: message.clone(),
                };
                warn!(error = %error, "Judgment not persisted");
                judgment.status = PersistStatus::Failed(message);
            }
        }

        Some(PersistenceReport {
            key,
            record_id: judgment.record_id.clone(),
            status: judgment.status.clone(),
        })
    }

    fn summary(&self) -> SessionSummary {
        let count = |f: fn(&PersistStatus) -> bool| {
            self.judgments.iter().filter(|j| f(&j.status)).count()
        };
        SessionSummary {
            session_id: self.session_id,
            rounds: self.round,
            judgments: self.judgments.len(),
            confirmed: count(|s| *s == PersistStatus::Confirmed),
            unconfirmed: count(|s| *s == PersistStatus::Unconfirmed),
            failed: count(PersistStatus::is_failed),
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
