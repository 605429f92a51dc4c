//! Collaborators the engine talks to but does not implement: where candidates
//! come from and where decisions are kept.

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{Candidate, PersistedDecision},
    error::FetchError,
};

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetches up to `count` candidates. Cached and remote batches are
    /// treated the same by the engine.
    async fn fetch(&self, count: usize) -> std::result::Result<Vec<Candidate>, FetchError>;

    /// Whether a batch from this source is the complete current candidate
    /// set. Partial views, such as a local cache, must never supersede the
    /// stored decisions.
    fn is_authoritative(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<PersistedDecision>>;
    /// Supersedes every stored record with `records`.
    async fn replace_all(&self, records: Vec<PersistedDecision>) -> Result<()>;
    async fn upsert(&self, record: PersistedDecision) -> Result<()>;
}
