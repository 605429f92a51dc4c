//! The review session: the single owner of a deck and its collaborators.

use std::{collections::HashSet, sync::Arc};

use deck::{
    CandidateSource, DecisionEvent, DecisionStore, DeckController, DeckError, DeckOptions,
    DeckUpdate, ReconcileReport, RejectedRecord, Tally,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Candidate, CandidateId, Decision, PersistedDecision},
    error::{ApiError, FetchError},
};
use thiserror::Error;
use tokio::{
    sync::broadcast,
    task::{JoinHandle, JoinSet},
};
use tracing::{info, warn};

use crate::source::cached_batch;

/// How a freshly installed batch is written back to the decision store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPersistence {
    /// New identities are added as undecided; everything stored stays.
    #[default]
    Retain,
    /// The store is rewritten to hold exactly the latest batch, carrying
    /// over decisions for identities that are still in it.
    Supersede,
}

impl BatchPersistence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Some(Self::Retain),
            "supersede" | "replace" => Some(Self::Supersede),
            _ => None,
        }
    }
}

/// Where an installed batch came from. Only a complete remote batch may
/// supersede the store; cached batches are partial by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrigin {
    Remote,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub batch_size: usize,
    /// Start from the stored history before asking the network.
    pub cache_first: bool,
    pub batch_persistence: BatchPersistence,
    pub deck: DeckOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            cache_first: true,
            batch_persistence: BatchPersistence::Retain,
            deck: DeckOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    DeckRebuilt {
        cards: usize,
        undecided: usize,
        report: ReconcileReport,
    },
    Decided(DecisionEvent),
    MalformedRecords(Vec<RejectedRecord>),
    FetchFailed(ApiError),
    PersistFailed {
        identity: Option<CandidateId>,
        message: String,
    },
    Exhausted,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load decision history: {0}")]
    History(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub struct ReviewSession {
    controller: DeckController,
    source: Arc<dyn CandidateSource>,
    store: Arc<dyn DecisionStore>,
    options: SessionOptions,
    persisted: Vec<PersistedDecision>,
    writes: JoinSet<()>,
    events: broadcast::Sender<SessionEvent>,
    last_fetch_error: Option<FetchError>,
}

impl ReviewSession {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        store: Arc<dyn DecisionStore>,
        options: SessionOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            controller: DeckController::new(options.deck),
            source,
            store,
            options,
            persisted: Vec::new(),
            writes: JoinSet::new(),
            events,
            last_fetch_error: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn controller(&self) -> &DeckController {
        &self.controller
    }

    pub fn current_candidate(&self) -> Option<&Candidate> {
        self.controller.current_candidate()
    }

    pub fn tally(&self) -> Tally {
        self.controller.tally()
    }

    /// Decision history as this session knows it, including writes that
    /// may still be in flight.
    pub fn persisted(&self) -> &[PersistedDecision] {
        &self.persisted
    }

    pub fn last_fetch_error(&self) -> Option<&FetchError> {
        self.last_fetch_error.as_ref()
    }

    /// Loads the decision history once, then builds the first deck from that
    /// history (when enabled and it still holds undecided candidates) or the
    /// source. A failed fetch leaves an empty deck and is returned for the
    /// caller to retry.
    pub async fn start(&mut self) -> Result<&ReconcileReport, SessionError> {
        self.persisted = self
            .store
            .load_all()
            .await
            .map_err(|error| SessionError::History(format!("{error:#}")))?;
        info!(records = self.persisted.len(), "session: decision history loaded");

        if self.options.cache_first {
            match cached_batch(&self.persisted, self.options.batch_size) {
                Ok(batch) => {
                    self.install_batch(batch, BatchOrigin::Cache).await;
                    return Ok(self.controller.last_report());
                }
                Err(error) => info!(%error, "session: cache miss, fetching from source"),
            }
        }

        let result = self
            .spawn_fetch()
            .await
            .unwrap_or_else(|error| Err(FetchError::Other(format!("fetch task failed: {error}"))));
        self.install_fetched(result).await?;
        Ok(self.controller.last_report())
    }

    /// Fetches a new batch from the remote source and rebuilds the deck.
    /// On failure the current deck is left untouched.
    pub async fn refresh(&mut self) -> Result<&ReconcileReport, FetchError> {
        let result = self
            .spawn_fetch()
            .await
            .unwrap_or_else(|error| Err(FetchError::Other(format!("fetch task failed: {error}"))));
        self.install_fetched(result).await?;
        Ok(self.controller.last_report())
    }

    /// Runs a fetch off the caller's task. The result must come back through
    /// [`ReviewSession::install_fetched`] before it touches the deck.
    pub fn spawn_fetch(&self) -> JoinHandle<Result<Vec<Candidate>, FetchError>> {
        let source = Arc::clone(&self.source);
        let count = self.options.batch_size;
        tokio::spawn(async move { source.fetch(count).await })
    }

    pub async fn install_fetched(
        &mut self,
        result: Result<Vec<Candidate>, FetchError>,
    ) -> Result<(), FetchError> {
        match result {
            Ok(batch) => {
                let origin = if self.source.is_authoritative() {
                    BatchOrigin::Remote
                } else {
                    BatchOrigin::Cache
                };
                self.install_batch(batch, origin).await;
                Ok(())
            }
            Err(error) => {
                warn!(
                    %error,
                    retryable = error.is_retryable(),
                    cards = self.controller.deck().len(),
                    "session: fetch failed, keeping current deck"
                );
                let _ = self.events.send(SessionEvent::FetchFailed(ApiError::from(&error)));
                self.last_fetch_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Replaces the deck from `batch` and the known history, then writes the
    /// batch back according to [`BatchPersistence`]. Cached batches are
    /// always retained.
    pub async fn install_batch(&mut self, batch: Vec<Candidate>, origin: BatchOrigin) {
        self.flush().await;
        self.last_fetch_error = None;

        let report = self
            .controller
            .initialize(batch.clone(), &self.persisted)
            .clone();

        match (self.options.batch_persistence, origin) {
            (BatchPersistence::Supersede, BatchOrigin::Remote) => self.supersede_with(batch).await,
            _ => self.retain_batch().await,
        }

        let cards = self.controller.deck().len();
        info!(
            cards,
            undecided = report.undecided,
            pre_resolved = report.pre_resolved,
            "session: deck rebuilt"
        );
        if report.has_malformed() {
            let _ = self
                .events
                .send(SessionEvent::MalformedRecords(report.rejected.clone()));
        }
        let exhausted = self.controller.is_exhausted();
        let _ = self.events.send(SessionEvent::DeckRebuilt {
            cards,
            undecided: report.undecided,
            report,
        });
        if exhausted {
            let _ = self.events.send(SessionEvent::Exhausted);
        }
    }

    pub fn drag(&mut self, dx: f64, dy: f64) -> Result<DeckUpdate, DeckError> {
        let update = self.controller.drag(dx, dy)?;
        Ok(self.after_update(update))
    }

    pub fn release(&mut self, dx: f64, dy: f64) -> Result<DeckUpdate, DeckError> {
        let update = self.controller.release(dx, dy)?;
        Ok(self.after_update(update))
    }

    pub fn interrupt_drag(&mut self) -> DeckUpdate {
        let update = self.controller.interrupt_drag();
        self.after_update(update)
    }

    pub fn apply_decision(
        &mut self,
        identity: &CandidateId,
        decision: Decision,
    ) -> Result<DeckUpdate, DeckError> {
        let update = self.controller.apply_decision(identity, decision)?;
        Ok(self.after_update(update))
    }

    pub fn decide_current(&mut self, decision: Decision) -> Result<DeckUpdate, DeckError> {
        let update = self.controller.decide_current(decision)?;
        Ok(self.after_update(update))
    }

    pub fn remove_resolved(&mut self) -> usize {
        self.controller.remove_resolved()
    }

    /// Waits for every queued store write to finish.
    pub async fn flush(&mut self) {
        while let Some(joined) = self.writes.join_next().await {
            if let Err(error) = joined {
                warn!(%error, "session: store write task failed");
            }
        }
    }

    fn after_update(&mut self, update: DeckUpdate) -> DeckUpdate {
        for record in self.controller.take_pending_writes() {
            self.remember(record.clone());
            self.spawn_upsert(record);
        }
        while let Some(joined) = self.writes.try_join_next() {
            if let Err(error) = joined {
                warn!(%error, "session: store write task failed");
            }
        }

        if let DeckUpdate::Decided(event) = &update {
            let _ = self.events.send(SessionEvent::Decided(event.clone()));
            if event.next.is_none() {
                let _ = self.events.send(SessionEvent::Exhausted);
            }
        }
        update
    }

    fn remember(&mut self, record: PersistedDecision) {
        match self
            .persisted
            .iter_mut()
            .find(|existing| existing.identity == record.identity)
        {
            Some(existing) => *existing = record,
            None => self.persisted.push(record),
        }
    }

    fn spawn_upsert(&mut self, record: PersistedDecision) {
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        self.writes.spawn(async move {
            let identity = record.identity.clone();
            if let Err(error) = store.upsert(record).await {
                warn!(%identity, error = %format!("{error:#}"), "session: decision not persisted");
                let _ = events.send(SessionEvent::PersistFailed {
                    identity: Some(identity),
                    message: format!("{error:#}"),
                });
            }
        });
    }

    async fn retain_batch(&mut self) {
        let known: HashSet<CandidateId> = self
            .persisted
            .iter()
            .map(|record| record.identity.clone())
            .collect();
        let fresh: Vec<PersistedDecision> = self
            .controller
            .cards()
            .filter(|card| !known.contains(card.identity()))
            .map(|card| PersistedDecision::for_candidate(&card.candidate, Decision::None))
            .collect();

        for record in fresh {
            self.remember(record.clone());
            if let Err(error) = self.store.upsert(record.clone()).await {
                self.report_persist_failure(Some(record.identity), &error);
            }
        }
    }

    async fn supersede_with(&mut self, batch: Vec<Candidate>) {
        let mut seen = HashSet::new();
        let records: Vec<PersistedDecision> = batch
            .iter()
            .filter(|candidate| !candidate.identity.is_blank())
            .filter(|candidate| seen.insert(candidate.identity.clone()))
            .map(|candidate| {
                match self
                    .persisted
                    .iter()
                    .find(|record| record.identity == candidate.identity)
                {
                    Some(prior) => PersistedDecision {
                        display_snapshot: candidate.payload.clone(),
                        ..prior.clone()
                    },
                    None => PersistedDecision::for_candidate(candidate, Decision::None),
                }
            })
            .collect();

        self.persisted = records.clone();
        if let Err(error) = self.store.replace_all(records).await {
            self.report_persist_failure(None, &error);
        }
    }

    fn report_persist_failure(&self, identity: Option<CandidateId>, error: &anyhow::Error) {
        warn!(
            identity = identity.as_ref().map(CandidateId::as_str),
            error = %format!("{error:#}"),
            "session: batch not persisted"
        );
        let _ = self.events.send(SessionEvent::PersistFailed {
            identity,
            message: format!("{error:#}"),
        });
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
