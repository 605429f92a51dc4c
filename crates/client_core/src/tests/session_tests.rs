use super::*;
use deck::{
    memory::{MemoryDecisionStore, ScriptedCandidateSource},
    MalformedReason, ReconcileMode,
};
use shared::domain::DisplayPayload;

use crate::source::CachedCandidateSource;

fn candidate(identity: &str) -> Candidate {
    Candidate::new(
        identity,
        DisplayPayload {
            name: format!("Name {identity}"),
            email: identity.to_string(),
            ..DisplayPayload::default()
        },
    )
}

fn batch(identities: &[&str]) -> Vec<Candidate> {
    identities.iter().map(|identity| candidate(identity)).collect()
}

fn record(identity: &str, decision: Decision) -> PersistedDecision {
    PersistedDecision::for_candidate(&candidate(identity), decision)
}

fn id(identity: &str) -> CandidateId {
    CandidateId::new(identity)
}

fn session_with(
    responses: Vec<Result<Vec<Candidate>, FetchError>>,
    store: Arc<MemoryDecisionStore>,
    options: SessionOptions,
) -> (ReviewSession, Arc<ScriptedCandidateSource>) {
    let source = Arc::new(ScriptedCandidateSource::new(responses));
    let session = ReviewSession::new(source.clone(), store, options);
    (session, source)
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn start_builds_deck_and_accept_persists_once() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) = session_with(
        vec![Ok(batch(&["a", "b", "c"]))],
        store.clone(),
        SessionOptions::default(),
    );
    let mut events = session.subscribe();

    session.start().await.expect("start");
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("a")));

    let update = session.decide_current(Decision::Accepted).expect("accept");
    assert!(matches!(update, DeckUpdate::Decided(ref event) if event.next == Some(id("b"))));
    session.flush().await;

    let stored = store.get(&id("a")).await.expect("a stored");
    assert_eq!(stored.decision, Decision::Accepted);
    // three undecided rows from the batch, then one decision upsert
    assert_eq!(store.upsert_count(), 4);

    let seen = drain(&mut events);
    assert!(seen
        .iter()
        .any(|event| matches!(event, SessionEvent::DeckRebuilt { cards: 3, undecided: 3, .. })));
    assert!(seen
        .iter()
        .any(|event| matches!(event, SessionEvent::Decided(e) if e.identity == id("a"))));
}

#[tokio::test]
async fn double_decision_does_not_double_persist() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) =
        session_with(vec![Ok(batch(&["a", "b"]))], store.clone(), SessionOptions::default());
    session.start().await.expect("start");
    let baseline = store.upsert_count();

    session
        .apply_decision(&id("a"), Decision::Accepted)
        .expect("first");
    let second = session
        .apply_decision(&id("a"), Decision::Rejected)
        .expect("second");
    session.flush().await;

    assert_eq!(second, DeckUpdate::Ignored);
    assert_eq!(store.upsert_count(), baseline + 1);
    assert_eq!(
        store.get(&id("a")).await.map(|r| r.decision),
        Some(Decision::Accepted)
    );
}

#[tokio::test]
async fn history_marks_decided_candidates_on_start() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![record(
        "a",
        Decision::Rejected,
    )]));
    let options = SessionOptions {
        cache_first: false,
        ..SessionOptions::default()
    };
    let (mut session, _) = session_with(vec![Ok(batch(&["a", "b", "c"]))], store, options);

    let report = session.start().await.expect("start").clone();
    assert_eq!(report.pre_resolved, 1);
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("b")));
    assert_eq!(
        session.controller().card(&id("a")).map(|card| card.decision()),
        Some(Decision::Rejected)
    );
}

#[tokio::test]
async fn start_fails_when_history_cannot_load() {
    let store = Arc::new(MemoryDecisionStore::new());
    store.fail_with(Some("locked".into())).await;
    let (mut session, source) =
        session_with(vec![Ok(batch(&["a"]))], store, SessionOptions::default());

    let error = session.start().await.expect_err("should fail");
    assert!(matches!(error, SessionError::History(ref message) if message.contains("locked")));
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn fetch_failure_on_start_leaves_explicit_empty_deck() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) =
        session_with(vec![Err(FetchError::Timeout)], store, SessionOptions::default());
    let mut events = session.subscribe();

    let error = session.start().await.expect_err("should fail");
    assert!(matches!(error, SessionError::Fetch(FetchError::Timeout)));
    assert!(session.controller().deck().is_empty());
    assert!(session.current_candidate().is_none());
    assert_eq!(session.last_fetch_error(), Some(&FetchError::Timeout));

    let seen = drain(&mut events);
    assert!(seen
        .iter()
        .any(|event| matches!(event, SessionEvent::FetchFailed(api) if api.retryable)));
}

#[tokio::test]
async fn refresh_failure_keeps_previous_deck_and_history() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) = session_with(
        vec![
            Ok(batch(&["a", "b"])),
            Err(FetchError::Status { status: 502 }),
        ],
        store.clone(),
        SessionOptions::default(),
    );
    session.start().await.expect("start");
    session.decide_current(Decision::Rejected).expect("reject a");
    session.flush().await;

    let error = session.refresh().await.expect_err("refresh fails");
    assert_eq!(error, FetchError::Status { status: 502 });
    assert_eq!(session.controller().deck().len(), 2);
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("b")));
    assert_eq!(
        store.get(&id("a")).await.map(|r| r.decision),
        Some(Decision::Rejected)
    );
}

#[tokio::test]
async fn refresh_reconciles_against_decisions_made_this_session() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) = session_with(
        vec![Ok(batch(&["a", "b"])), Ok(batch(&["b", "a", "c"]))],
        store,
        SessionOptions::default(),
    );
    session.start().await.expect("start");
    session.decide_current(Decision::Accepted).expect("accept a");

    session.refresh().await.expect("refresh");
    let order: Vec<_> = session.controller().deck().identities().to_vec();
    assert_eq!(order, vec![id("b"), id("a"), id("c")]);
    assert_eq!(
        session.controller().card(&id("a")).map(|card| card.decision()),
        Some(Decision::Accepted)
    );
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("b")));
}

#[tokio::test]
async fn persistence_failure_is_reported_but_decision_stands() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) =
        session_with(vec![Ok(batch(&["a", "b"]))], store.clone(), SessionOptions::default());
    session.start().await.expect("start");
    let mut events = session.subscribe();

    store.fail_with(Some("disk full".into())).await;
    session.decide_current(Decision::Accepted).expect("accept");
    session.flush().await;

    assert_eq!(
        session.controller().card(&id("a")).map(|card| card.decision()),
        Some(Decision::Accepted)
    );
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("b")));

    let seen = drain(&mut events);
    assert!(seen.iter().any(|event| matches!(
        event,
        SessionEvent::PersistFailed { identity: Some(identity), message }
            if identity == &id("a") && message.contains("disk full")
    )));
}

#[tokio::test]
async fn empty_history_falls_through_to_the_network() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![record(
        "done",
        Decision::Accepted,
    )]));
    let (mut session, source) =
        session_with(vec![Ok(batch(&["n1", "n2"]))], store.clone(), SessionOptions::default());

    session.start().await.expect("start");
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(store.load_count(), 1);
    assert_eq!(session.controller().deck().len(), 2);
}

#[tokio::test]
async fn undecided_history_skips_the_network_and_loads_once() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![
        record("c1", Decision::None),
        record("c2", Decision::Rejected),
    ]));
    let (mut session, source) =
        session_with(vec![Ok(batch(&["n1"]))], store.clone(), SessionOptions::default());

    session.start().await.expect("start");
    assert_eq!(source.fetch_count(), 0);
    assert_eq!(store.load_count(), 1);
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("c1")));
}

#[tokio::test]
async fn cached_start_under_supersede_keeps_decisions_outside_the_batch() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![
        record("u1", Decision::None),
        record("u2", Decision::None),
        record("late", Decision::Accepted),
    ]));
    let options = SessionOptions {
        batch_size: 2,
        batch_persistence: BatchPersistence::Supersede,
        ..SessionOptions::default()
    };
    let (mut session, source) =
        session_with(vec![Ok(batch(&["late", "u1"]))], store.clone(), options);

    session.start().await.expect("start");
    assert_eq!(source.fetch_count(), 0);
    let stored = store.snapshot().await;
    assert_eq!(stored.len(), 3);
    assert_eq!(
        store.get(&id("late")).await.map(|r| r.decision),
        Some(Decision::Accepted)
    );

    session.refresh().await.expect("refresh");
    assert_eq!(
        session.controller().card(&id("late")).map(|card| card.decision()),
        Some(Decision::Accepted)
    );
    assert_eq!(session.current_candidate().map(|c| c.identity.clone()), Some(id("u1")));
    assert_eq!(
        store.get(&id("late")).await.map(|r| r.decision),
        Some(Decision::Accepted)
    );
}

#[tokio::test]
async fn non_authoritative_source_never_supersedes_the_store() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![
        record("u1", Decision::None),
        record("u2", Decision::None),
        record("late", Decision::Accepted),
    ]));
    let options = SessionOptions {
        batch_size: 1,
        cache_first: false,
        batch_persistence: BatchPersistence::Supersede,
        ..SessionOptions::default()
    };
    let source = Arc::new(CachedCandidateSource::new(store.clone()));
    let mut session = ReviewSession::new(source, store.clone(), options);

    session.start().await.expect("start");
    session.refresh().await.expect("refresh");
    assert_eq!(session.controller().deck().len(), 1);

    let identities: Vec<_> = store
        .snapshot()
        .await
        .iter()
        .map(|r| r.identity.as_str().to_string())
        .collect();
    assert_eq!(identities, vec!["u1", "u2", "late"]);
}

#[tokio::test]
async fn supersede_rewrites_store_to_the_latest_batch() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![
        record("old", Decision::Accepted),
        record("b", Decision::Rejected),
    ]));
    let options = SessionOptions {
        batch_persistence: BatchPersistence::Supersede,
        ..SessionOptions::default()
    };
    let (mut session, _) = session_with(vec![Ok(batch(&["a", "b", "a"]))], store.clone(), options);

    session.start().await.expect("start");
    let stored = store.snapshot().await;
    let identities: Vec<_> = stored.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(identities, vec!["a", "b"]);
    assert_eq!(stored[1].decision, Decision::Rejected);
    assert_eq!(stored[0].decision, Decision::None);
}

#[tokio::test]
async fn malformed_records_are_reported_as_events() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) = session_with(
        vec![Ok(batch(&["a", "", "a", "b"]))],
        store.clone(),
        SessionOptions::default(),
    );
    let mut events = session.subscribe();

    session.start().await.expect("start");
    assert_eq!(session.controller().deck().len(), 2);
    assert_eq!(store.snapshot().await.len(), 2);

    let seen = drain(&mut events);
    let rejected = seen
        .iter()
        .find_map(|event| match event {
            SessionEvent::MalformedRecords(rejected) => Some(rejected.clone()),
            _ => None,
        })
        .expect("malformed event");
    let reasons: Vec<_> = rejected.iter().map(|r| r.reason).collect();
    assert_eq!(
        reasons,
        vec![MalformedReason::MissingIdentity, MalformedReason::DuplicateIdentity]
    );
}

#[tokio::test]
async fn exclude_mode_with_removal_emits_exhausted_after_last_decision() {
    let store = Arc::new(MemoryDecisionStore::with_records(vec![record(
        "a",
        Decision::Accepted,
    )]));
    let options = SessionOptions {
        cache_first: false,
        deck: DeckOptions {
            reconcile_mode: ReconcileMode::Exclude,
            remove_resolved_on_decision: true,
            ..DeckOptions::default()
        },
        ..SessionOptions::default()
    };
    let (mut session, _) = session_with(vec![Ok(batch(&["a", "b"]))], store, options);
    let mut events = session.subscribe();

    session.start().await.expect("start");
    assert_eq!(session.controller().deck().len(), 1);

    session.release(150.0, 0.0).expect("swipe right");
    assert!(session.controller().deck().is_empty());
    assert!(session.controller().is_exhausted());

    let seen = drain(&mut events);
    assert!(matches!(seen.last(), Some(SessionEvent::Exhausted)));
}

#[tokio::test]
async fn interrupted_drag_on_session_resolves_and_persists() {
    let store = Arc::new(MemoryDecisionStore::new());
    let (mut session, _) =
        session_with(vec![Ok(batch(&["a", "b"]))], store.clone(), SessionOptions::default());
    session.start().await.expect("start");

    session.drag(-40.0, 3.0).expect("drag");
    session.drag(-130.0, 8.0).expect("drag");
    let update = session.interrupt_drag();
    session.flush().await;

    assert!(matches!(update, DeckUpdate::Decided(ref event) if event.decision == Decision::Rejected));
    assert_eq!(
        store.get(&id("a")).await.map(|r| r.decision),
        Some(Decision::Rejected)
    );
}

#[test]
fn batch_persistence_parses_aliases() {
    assert_eq!(BatchPersistence::parse("Retain"), Some(BatchPersistence::Retain));
    assert_eq!(BatchPersistence::parse(" replace "), Some(BatchPersistence::Supersede));
    assert_eq!(BatchPersistence::parse("nope"), None);
}
