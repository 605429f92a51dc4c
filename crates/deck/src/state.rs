//! Deck contents keyed by identity. Positions are never used as references;
//! the active pointer is an identity so removal cannot make it dangle.

use std::collections::HashMap;

use shared::domain::{Candidate, CandidateId, Decision};

use crate::gesture::CardInteractionState;

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub candidate: Candidate,
    pub state: CardInteractionState,
}

impl Card {
    pub fn identity(&self) -> &CandidateId {
        &self.candidate.identity
    }

    pub fn decision(&self) -> Decision {
        self.state.decision
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeckState {
    order: Vec<CandidateId>,
    cards: HashMap<CandidateId, Card>,
    active: Option<CandidateId>,
}

impl DeckState {
    /// Appends a card. Callers guarantee identities are unique.
    pub(crate) fn push(&mut self, candidate: Candidate, state: CardInteractionState) {
        let identity = candidate.identity.clone();
        self.order.push(identity.clone());
        self.cards.insert(identity, Card { candidate, state });
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, identity: &CandidateId) -> bool {
        self.cards.contains_key(identity)
    }

    pub fn get(&self, identity: &CandidateId) -> Option<&Card> {
        self.cards.get(identity)
    }

    pub(crate) fn get_mut(&mut self, identity: &CandidateId) -> Option<&mut Card> {
        self.cards.get_mut(identity)
    }

    /// Cards in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Card> + '_ {
        self.order.iter().filter_map(|identity| self.cards.get(identity))
    }

    pub fn identities(&self) -> &[CandidateId] {
        &self.order
    }

    pub fn active(&self) -> Option<&CandidateId> {
        self.active.as_ref()
    }

    pub fn active_card(&self) -> Option<&Card> {
        self.active.as_ref().and_then(|identity| self.cards.get(identity))
    }

    pub fn first_undecided(&self) -> Option<CandidateId> {
        self.iter()
            .find(|card| !card.state.is_decided())
            .map(|card| card.identity().clone())
    }

    /// The next undecided card after `identity` in queue order, falling back
    /// to the first undecided card anywhere in the queue.
    pub fn next_undecided_after(&self, identity: &CandidateId) -> Option<CandidateId> {
        let start = self
            .order
            .iter()
            .position(|candidate| candidate == identity)
            .map(|index| index + 1)
            .unwrap_or(0);
        self.order[start..]
            .iter()
            .find(|candidate| self.is_undecided(candidate))
            .cloned()
            .or_else(|| self.first_undecided())
    }

    pub(crate) fn point_at_first_undecided(&mut self) {
        self.active = self.first_undecided();
    }

    pub(crate) fn advance_from(&mut self, identity: &CandidateId) {
        self.active = self.next_undecided_after(identity);
    }

    /// Drops decided cards, keeping the relative order of the rest.
    pub(crate) fn remove_resolved(&mut self) -> Vec<CandidateId> {
        let cards = &self.cards;
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .order
            .drain(..)
            .partition(|identity| cards.get(identity).is_none_or(|card| card.state.is_decided()));
        self.order = kept;
        for identity in &removed {
            self.cards.remove(identity);
        }
        let active_removed = self
            .active
            .as_ref()
            .is_some_and(|active| !self.is_undecided(active));
        if active_removed {
            self.point_at_first_undecided();
        }
        removed
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.cards
            .values()
            .filter(|card| card.state.decision == decision)
            .count()
    }

    fn is_undecided(&self, identity: &CandidateId) -> bool {
        self.cards
            .get(identity)
            .is_some_and(|card| !card.state.is_decided())
    }
}
