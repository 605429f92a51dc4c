use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a candidate across fetches (an email or an opaque id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank identity cannot be keyed on and marks the record as malformed.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    None,
    Accepted,
    Rejected,
}

impl Decision {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Decision::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Decision::None),
            "accepted" | "accept" => Some(Decision::Accepted),
            "rejected" | "reject" => Some(Decision::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display-only fields of a candidate. Never interpreted by the deck engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub name: String,
    pub age: Option<u32>,
    pub email: String,
    pub city: String,
    pub phone: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub identity: CandidateId,
    pub payload: DisplayPayload,
}

impl Candidate {
    pub fn new(identity: impl Into<String>, payload: DisplayPayload) -> Self {
        Self {
            identity: CandidateId::new(identity),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDecision {
    pub identity: CandidateId,
    pub decision: Decision,
    pub display_snapshot: DisplayPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl PersistedDecision {
    pub fn for_candidate(candidate: &Candidate, decision: Decision) -> Self {
        Self {
            identity: candidate.identity.clone(),
            decision,
            display_snapshot: candidate.payload.clone(),
            decided_at: decision.is_terminal().then(Utc::now),
        }
    }

    /// Rebuilds the candidate a cached record was taken from.
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            identity: self.identity.clone(),
            payload: self.display_snapshot.clone(),
        }
    }
}
