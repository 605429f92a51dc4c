//! Drag-to-decision projection for a single card.

use serde::{Deserialize, Serialize};
use shared::domain::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureConfig {
    /// Horizontal distance a release must exceed to commit a decision.
    pub commit_threshold: f64,
    pub exit_offset: f64,
    pub exit_rotation: f64,
    pub drag_rotation: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            commit_threshold: 100.0,
            exit_offset: 500.0,
            exit_rotation: 12.0,
            drag_rotation: 7.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CardInteractionState {
    pub offset_x: f64,
    pub offset_y: f64,
    pub rotation_degrees: f64,
    pub decision: Decision,
}

impl CardInteractionState {
    /// A card at origin carrying a decision made in an earlier session.
    pub fn resolved(decision: Decision) -> Self {
        Self {
            decision,
            ..Self::default()
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decision.is_terminal()
    }

    pub fn is_at_origin(&self) -> bool {
        self.offset_x == 0.0 && self.offset_y == 0.0 && self.rotation_degrees == 0.0
    }

    fn snap_back(&mut self) {
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.rotation_degrees = 0.0;
    }
}

/// Pointer displacement relative to where the drag started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DragSample {
    pub dx: f64,
    pub dy: f64,
}

impl DragSample {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Moved,
    SnappedBack,
    Resolved(Decision),
    /// The card was already decided, or the input carried nothing usable.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct GestureInterpreter {
    config: GestureConfig,
}

impl GestureInterpreter {
    pub fn new(config: GestureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Projects an intermediate sample onto the card. Replaying a sample
    /// yields the same state.
    pub fn sample(&self, state: &mut CardInteractionState, sample: DragSample) -> GestureOutcome {
        if state.is_decided() || !sample.is_finite() {
            return GestureOutcome::Ignored;
        }
        state.offset_x = sample.dx;
        state.offset_y = sample.dy;
        state.rotation_degrees = direction(sample.dx) * self.config.drag_rotation;
        GestureOutcome::Moved
    }

    /// Classifies the terminal sample of a drag.
    pub fn release(&self, state: &mut CardInteractionState, sample: DragSample) -> GestureOutcome {
        if state.is_decided() {
            return GestureOutcome::Ignored;
        }
        if !sample.is_finite() {
            state.snap_back();
            return GestureOutcome::SnappedBack;
        }
        match self.classify(sample.dx) {
            Decision::None => {
                state.snap_back();
                GestureOutcome::SnappedBack
            }
            decision => {
                self.resolve(state, decision, sample.dy);
                GestureOutcome::Resolved(decision)
            }
        }
    }

    /// An explicit accept/reject control, bypassing sampling.
    pub fn act(&self, state: &mut CardInteractionState, decision: Decision) -> GestureOutcome {
        if state.is_decided() || !decision.is_terminal() {
            return GestureOutcome::Ignored;
        }
        self.resolve(state, decision, 0.0);
        GestureOutcome::Resolved(decision)
    }

    pub fn classify(&self, dx: f64) -> Decision {
        if dx > self.config.commit_threshold {
            Decision::Accepted
        } else if dx < -self.config.commit_threshold {
            Decision::Rejected
        } else {
            Decision::None
        }
    }

    fn resolve(&self, state: &mut CardInteractionState, decision: Decision, dy: f64) {
        let side = match decision {
            Decision::Accepted => 1.0,
            Decision::Rejected => -1.0,
            Decision::None => return,
        };
        state.offset_x = side * self.config.exit_offset;
        state.offset_y = dy;
        state.rotation_degrees = side * self.config.exit_rotation;
        state.decision = decision;
    }
}

// f64::signum maps 0.0 to 1.0, which would tilt an unmoved card.
fn direction(dx: f64) -> f64 {
    if dx > 0.0 {
        1.0
    } else if dx < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
#[path = "tests/gesture_tests.rs"]
mod tests;
