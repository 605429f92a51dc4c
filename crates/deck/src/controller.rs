use serde::{Deserialize, Serialize};
use shared::domain::{Candidate, CandidateId, Decision, PersistedDecision};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    gesture::{CardInteractionState, DragSample, GestureConfig, GestureInterpreter, GestureOutcome},
    reconcile::{ReconcileMode, ReconcileReport, ReconciliationEngine},
    state::{Card, DeckState},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeckError {
    #[error("candidate {0} is not in the current deck")]
    UnknownCandidate(CandidateId),
    #[error("only accepted or rejected can be applied, got {0}")]
    InvalidDecision(Decision),
    #[error("no undecided candidate is available for input")]
    NoActiveCandidate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckOptions {
    pub reconcile_mode: ReconcileMode,
    /// Physically drop cards from the queue as soon as they are decided.
    pub remove_resolved_on_decision: bool,
    pub gesture: GestureConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub identity: CandidateId,
    pub decision: Decision,
    /// Where the active pointer went after this decision.
    pub next: Option<CandidateId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckUpdate {
    Moved,
    SnappedBack,
    Decided(DecisionEvent),
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub accepted: usize,
    pub rejected: usize,
    pub pending: usize,
}

#[derive(Debug, Clone)]
struct ActiveDrag {
    identity: CandidateId,
    last: DragSample,
}

/// Owns the deck and is its only writer. Gesture input and explicit
/// decisions both end in [`DeckController::commit`].
#[derive(Debug)]
pub struct DeckController {
    options: DeckOptions,
    interpreter: GestureInterpreter,
    engine: ReconciliationEngine,
    deck: DeckState,
    drag: Option<ActiveDrag>,
    pending_writes: Vec<PersistedDecision>,
    last_report: ReconcileReport,
}

impl DeckController {
    pub fn new(options: DeckOptions) -> Self {
        Self {
            options,
            interpreter: GestureInterpreter::new(options.gesture),
            engine: ReconciliationEngine::new(options.reconcile_mode),
            deck: DeckState::default(),
            drag: None,
            pending_writes: Vec::new(),
            last_report: ReconcileReport::default(),
        }
    }

    pub fn options(&self) -> &DeckOptions {
        &self.options
    }

    /// Replaces the whole deck from a batch and the persisted history. Any
    /// drag in progress is dropped with the old deck.
    pub fn initialize(
        &mut self,
        candidates: Vec<Candidate>,
        persisted: &[PersistedDecision],
    ) -> &ReconcileReport {
        let (deck, report) = self.engine.reconcile(candidates, persisted);
        self.deck = deck;
        self.drag = None;
        self.last_report = report;
        &self.last_report
    }

    pub fn deck(&self) -> &DeckState {
        &self.deck
    }

    pub fn last_report(&self) -> &ReconcileReport {
        &self.last_report
    }

    pub fn current_candidate(&self) -> Option<&Candidate> {
        self.deck.active_card().map(|card| &card.candidate)
    }

    pub fn current_state(&self) -> Option<&CardInteractionState> {
        self.deck.active_card().map(|card| &card.state)
    }

    pub fn card(&self, identity: &CandidateId) -> Option<&Card> {
        self.deck.get(identity)
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> + '_ {
        self.deck.iter()
    }

    pub fn is_exhausted(&self) -> bool {
        self.deck.active().is_none()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn undecided_count(&self) -> usize {
        self.deck.count(Decision::None)
    }

    pub fn tally(&self) -> Tally {
        Tally {
            accepted: self.deck.count(Decision::Accepted),
            rejected: self.deck.count(Decision::Rejected),
            pending: self.undecided_count(),
        }
    }

    pub fn apply_decision(
        &mut self,
        identity: &CandidateId,
        decision: Decision,
    ) -> Result<DeckUpdate, DeckError> {
        if !decision.is_terminal() {
            return Err(DeckError::InvalidDecision(decision));
        }
        let card = self
            .deck
            .get_mut(identity)
            .ok_or_else(|| DeckError::UnknownCandidate(identity.clone()))?;
        if card.state.is_decided() {
            debug!(%identity, existing = %card.state.decision, "deck: decision already recorded");
            return Ok(DeckUpdate::Ignored);
        }
        match self.interpreter.act(&mut card.state, decision) {
            GestureOutcome::Resolved(decision) => Ok(DeckUpdate::Decided(self.commit(identity, decision))),
            _ => Ok(DeckUpdate::Ignored),
        }
    }

    /// Accept or reject the current card, as a button would.
    pub fn decide_current(&mut self, decision: Decision) -> Result<DeckUpdate, DeckError> {
        let identity = self
            .deck
            .active()
            .cloned()
            .ok_or(DeckError::NoActiveCandidate)?;
        self.apply_decision(&identity, decision)
    }

    /// Feeds an intermediate pointer sample. The first sample binds the drag
    /// to the active card; later samples follow that card even if the pointer
    /// moves on.
    pub fn drag(&mut self, dx: f64, dy: f64) -> Result<DeckUpdate, DeckError> {
        let sample = DragSample::new(dx, dy);
        let identity = self.bind_drag(sample)?;
        let Some(card) = self.deck.get_mut(&identity) else {
            self.drag = None;
            return Ok(DeckUpdate::Ignored);
        };
        match self.interpreter.sample(&mut card.state, sample) {
            GestureOutcome::Moved => Ok(DeckUpdate::Moved),
            _ => Ok(DeckUpdate::Ignored),
        }
    }

    pub fn release(&mut self, dx: f64, dy: f64) -> Result<DeckUpdate, DeckError> {
        let sample = DragSample::new(dx, dy);
        let identity = self.bind_drag(sample)?;
        self.drag = None;
        Ok(self.finish_drag(&identity, sample))
    }

    /// Ends an abandoned drag as a release at its last known sample.
    pub fn interrupt_drag(&mut self) -> DeckUpdate {
        match self.drag.take() {
            Some(drag) => {
                debug!(identity = %drag.identity, "deck: drag interrupted, releasing at last sample");
                self.finish_drag(&drag.identity, drag.last)
            }
            None => DeckUpdate::Ignored,
        }
    }

    /// Drops decided cards. Relative order is kept and the active pointer
    /// stays on an undecided card.
    pub fn remove_resolved(&mut self) -> usize {
        let removed = self.deck.remove_resolved();
        let drag_removed = self
            .drag
            .as_ref()
            .is_some_and(|drag| !self.deck.contains(&drag.identity));
        if drag_removed {
            self.drag = None;
        }
        if !removed.is_empty() {
            debug!(removed = removed.len(), remaining = self.deck.len(), "deck: removed decided cards");
        }
        removed.len()
    }

    /// Hands over the records produced by decisions since the last call.
    pub fn take_pending_writes(&mut self) -> Vec<PersistedDecision> {
        std::mem::take(&mut self.pending_writes)
    }

    fn bind_drag(&mut self, sample: DragSample) -> Result<CandidateId, DeckError> {
        if let Some(drag) = self.drag.as_mut() {
            if sample.dx.is_finite() && sample.dy.is_finite() {
                drag.last = sample;
            }
            return Ok(drag.identity.clone());
        }
        let identity = self
            .deck
            .active()
            .cloned()
            .ok_or(DeckError::NoActiveCandidate)?;
        self.drag = Some(ActiveDrag {
            identity: identity.clone(),
            last: sample,
        });
        Ok(identity)
    }

    fn finish_drag(&mut self, identity: &CandidateId, sample: DragSample) -> DeckUpdate {
        let Some(card) = self.deck.get_mut(identity) else {
            return DeckUpdate::Ignored;
        };
        match self.interpreter.release(&mut card.state, sample) {
            GestureOutcome::Resolved(decision) => DeckUpdate::Decided(self.commit(identity, decision)),
            GestureOutcome::SnappedBack => {
                debug!(%identity, dx = sample.dx, "deck: snapped back");
                DeckUpdate::SnappedBack
            }
            GestureOutcome::Moved | GestureOutcome::Ignored => DeckUpdate::Ignored,
        }
    }

    /// Bookkeeping after a card's state already carries its decision.
    fn commit(&mut self, identity: &CandidateId, decision: Decision) -> DecisionEvent {
        if let Some(card) = self.deck.get(identity) {
            self.pending_writes
                .push(PersistedDecision::for_candidate(&card.candidate, decision));
        }
        if self.deck.active() == Some(identity) {
            self.deck.advance_from(identity);
        }
        if self.options.remove_resolved_on_decision {
            self.remove_resolved();
        }
        let next = self.deck.active().cloned();
        info!(
            %identity,
            %decision,
            next = next.as_ref().map(CandidateId::as_str),
            "deck: decision recorded"
        );
        DecisionEvent {
            identity: identity.clone(),
            decision,
            next,
        }
    }
}

impl Default for DeckController {
    fn default() -> Self {
        Self::new(DeckOptions::default())
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
