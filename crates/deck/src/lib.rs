//! Deck interaction and reconciliation engine.
//!
//! Pointer motion becomes at most one decision per candidate
//! ([`gesture`]), decisions advance an identity-keyed queue
//! ([`controller`]), and every fetched batch is merged with earlier
//! decisions before it becomes the deck ([`reconcile`]).

pub mod controller;
pub mod gesture;
pub mod memory;
pub mod ports;
pub mod reconcile;
pub mod state;

pub use controller::{DeckController, DeckError, DeckOptions, DeckUpdate, DecisionEvent, Tally};
pub use gesture::{CardInteractionState, DragSample, GestureConfig, GestureInterpreter, GestureOutcome};
pub use ports::{CandidateSource, DecisionStore};
pub use reconcile::{MalformedReason, ReconcileMode, ReconcileReport, ReconciliationEngine, RejectedRecord};
pub use state::{Card, DeckState};
