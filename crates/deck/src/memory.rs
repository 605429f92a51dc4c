//! In-process collaborators for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Candidate, CandidateId, PersistedDecision},
    error::FetchError,
};
use tokio::sync::Mutex;

use crate::ports::{CandidateSource, DecisionStore};

/// Keeps records in insertion order, one per identity.
#[derive(Default)]
pub struct MemoryDecisionStore {
    records: Mutex<Vec<PersistedDecision>>,
    fail_with: Mutex<Option<String>>,
    upserts: AtomicUsize,
    loads: AtomicUsize,
}

impl MemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PersistedDecision>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail with `message`, until cleared.
    pub async fn fail_with(&self, message: Option<String>) {
        *self.fail_with.lock().await = message;
    }

    pub async fn snapshot(&self) -> Vec<PersistedDecision> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, identity: &CandidateId) -> Option<PersistedDecision> {
        self.records
            .lock()
            .await
            .iter()
            .find(|record| &record.identity == identity)
            .cloned()
    }

    /// Number of successful upserts since creation.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::Relaxed)
    }

    /// Number of `load_all` calls since creation, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    async fn check(&self) -> Result<()> {
        match self.fail_with.lock().await.as_ref() {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DecisionStore for MemoryDecisionStore {
    async fn load_all(&self) -> Result<Vec<PersistedDecision>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.check().await?;
        Ok(self.snapshot().await)
    }

    async fn replace_all(&self, records: Vec<PersistedDecision>) -> Result<()> {
        self.check().await?;
        *self.records.lock().await = records;
        Ok(())
    }

    async fn upsert(&self, record: PersistedDecision) -> Result<()> {
        self.check().await?;
        let mut records = self.records.lock().await;
        match records
            .iter_mut()
            .find(|existing| existing.identity == record.identity)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Replays scripted fetch results in order; the last one repeats.
pub struct ScriptedCandidateSource {
    responses: Mutex<Vec<Result<Vec<Candidate>, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedCandidateSource {
    pub fn new(responses: Vec<Result<Vec<Candidate>, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CandidateSource for ScriptedCandidateSource {
    async fn fetch(&self, count: usize) -> Result<Vec<Candidate>, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut responses = self.responses.lock().await;
        let response = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or(Err(FetchError::EmptyCache))
        };
        response.map(|mut batch| {
            batch.truncate(count);
            batch
        })
    }
}
