//! Merging a fetched batch with decisions persisted in earlier sessions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shared::domain::{Candidate, CandidateId, Decision, PersistedDecision};
use tracing::{info, warn};

use crate::{gesture::CardInteractionState, state::DeckState};

/// What happens to candidates that already carry a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Kept in the deck, tagged with their earlier outcome.
    #[default]
    Tagged,
    /// Left out of the deck entirely.
    Exclude,
}

impl ReconcileMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tagged" | "tag" => Some(Self::Tagged),
            "exclude" | "excluded" => Some(Self::Exclude),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    MissingIdentity,
    DuplicateIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position of the record in the fetched batch.
    pub position: usize,
    pub identity: CandidateId,
    pub reason: MalformedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub rejected: Vec<RejectedRecord>,
    pub pre_resolved: usize,
    pub excluded: usize,
    pub undecided: usize,
}

impl ReconcileReport {
    pub fn has_malformed(&self) -> bool {
        !self.rejected.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    mode: ReconcileMode,
}

impl ReconciliationEngine {
    pub fn new(mode: ReconcileMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    /// Builds a fresh deck from `fetched` in fetch order. Never fails:
    /// malformed records are reported and skipped, and persisted identities
    /// absent from the batch are ignored.
    pub fn reconcile(
        &self,
        fetched: Vec<Candidate>,
        persisted: &[PersistedDecision],
    ) -> (DeckState, ReconcileReport) {
        let mut prior: HashMap<&CandidateId, Decision> = HashMap::with_capacity(persisted.len());
        for record in persisted {
            // later records overwrite earlier ones
            prior.insert(&record.identity, record.decision);
        }

        let mut deck = DeckState::default();
        let mut report = ReconcileReport::default();
        let mut seen: HashSet<CandidateId> = HashSet::with_capacity(fetched.len());

        for (position, candidate) in fetched.into_iter().enumerate() {
            let reason = if candidate.identity.is_blank() {
                Some(MalformedReason::MissingIdentity)
            } else if !seen.insert(candidate.identity.clone()) {
                Some(MalformedReason::DuplicateIdentity)
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!(
                    position,
                    identity = %candidate.identity,
                    ?reason,
                    "reconcile: rejecting malformed candidate record"
                );
                report.rejected.push(RejectedRecord {
                    position,
                    identity: candidate.identity,
                    reason,
                });
                continue;
            }

            let decision = prior
                .get(&candidate.identity)
                .copied()
                .unwrap_or_default();
            if !decision.is_terminal() {
                report.undecided += 1;
                deck.push(candidate, CardInteractionState::default());
                continue;
            }

            report.pre_resolved += 1;
            match self.mode {
                ReconcileMode::Tagged => {
                    deck.push(candidate, CardInteractionState::resolved(decision));
                }
                ReconcileMode::Exclude => report.excluded += 1,
            }
        }

        deck.point_at_first_undecided();
        info!(
            cards = deck.len(),
            undecided = report.undecided,
            pre_resolved = report.pre_resolved,
            rejected = report.rejected.len(),
            mode = ?self.mode,
            "reconcile: deck rebuilt"
        );
        (deck, report)
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
