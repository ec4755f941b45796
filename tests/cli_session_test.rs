//! Interactive session driver tests
//!
//! Feeds scripted stdin lines through `run_interactive` and checks both the
//! transcript and the resulting engine state.

use std::sync::Arc;

use pairwise_elicitation::cli::{run_interactive, CliResult};
use pairwise_elicitation::session::PersistStatus;
use pairwise_elicitation::store::{InviteList, Respondent, SqliteRecordStore};
use pairwise_elicitation::{Catalog, Choice, Phase, SessionEngine};

async fn create_test_engine(pairs_per_round: usize) -> (SessionEngine, Arc<SqliteRecordStore>) {
    let store = Arc::new(SqliteRecordStore::new_in_memory().await.unwrap());
    let catalog = Catalog::new([
        "https://github.com/paradigmxyz/reth",
        "https://github.com/sigp/lighthouse",
        "https://github.com/ethereum/go-ethereum",
        "https://github.com/foundry-rs/foundry",
    ]);
    let engine = SessionEngine::new(
        catalog,
        store.clone(),
        Arc::new(InviteList::new(["DEMO2024"])),
        pairs_per_round,
    );
    (engine, store)
}

fn respondent() -> Respondent {
    Respondent::new("Ada", "ada@example.org", "DEMO2024")
}

#[tokio::test]
async fn test_scripted_session_with_edit() {
    let (mut engine, store) = create_test_engine(2).await;
    let script = "B\n5\nbig community\nx\n2\nno choice\nA\n2\nsolid\ne 1\nA\n3\nrethink\nf\n";
    let mut out = Vec::new();

    let summary = run_interactive(&mut engine, respondent(), script.as_bytes(), &mut out)
        .await
        .unwrap()
        .expect("session should finish");

    let transcript = String::from_utf8(out).unwrap();
    assert!(transcript.contains("Welcome! Round 1 has 2 pairs."));
    assert!(transcript.contains("Invalid input: choice"));
    assert!(transcript.contains("Round 1 complete"));
    assert!(transcript.contains("Editing a round 1 judgment"));
    assert!(transcript.contains("(was B)"));

    assert_eq!(summary.judgments, 2);
    assert_eq!(summary.confirmed, 2);
    assert_eq!(engine.phase(), Phase::Finished);

    let first = &engine.judgments()[0];
    assert_eq!(first.choice, Choice::First);
    assert_eq!(first.intensity, 3.0);
    assert_eq!(first.reasoning, "rethink");
    assert_eq!(first.status, PersistStatus::Confirmed);
    assert_eq!(store.count_records().await.unwrap(), 2);
}

#[tokio::test]
async fn test_input_ending_mid_round_leaves_session_open() {
    let (mut engine, _store) = create_test_engine(3).await;
    let mut out = Vec::new();

    let summary = run_interactive(&mut engine, respondent(), "2\n4\nactive\n".as_bytes(), &mut out)
        .await
        .unwrap();

    assert!(summary.is_none());
    assert_eq!(engine.phase(), Phase::RoundInProgress);
    assert_eq!(engine.judgments().len(), 1);
    assert_eq!(engine.judgments()[0].status, PersistStatus::Confirmed);
}

#[tokio::test]
async fn test_rejected_invite_is_an_error() {
    let (mut engine, _store) = create_test_engine(3).await;
    let mut out = Vec::new();

    let result = run_interactive(
        &mut engine,
        Respondent::new("Ada", "ada@example.org", "WRONG"),
        "".as_bytes(),
        &mut out,
    )
    .await;

    let cli: CliResult = result.map(|_| String::new()).into();
    assert_eq!(cli.exit_code, 1);
    assert!(cli.message.contains("Invalid invite code"));
}
