use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deck::DecisionStore;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

use shared::domain::{CandidateId, Decision, DisplayPayload, PersistedDecision};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionCounts {
    pub undecided: i64,
    pub accepted: i64,
    pub rejected: i64,
}

impl DecisionCounts {
    pub fn total(&self) -> i64 {
        self.undecided + self.accepted + self.rejected
    }
}

const SELECT_DECISIONS: &str = "SELECT identity, decision, name, age, email, city, phone, image_url, decided_at
     FROM persisted_decisions";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            // one connection keeps `sqlite::memory:` a single shared database
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open decision database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to migrate decision database")?;
        info!(%database_url, "storage: decision database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Records in the order they were first stored, optionally filtered by
    /// decision.
    pub async fn list_decisions(&self, filter: Option<Decision>) -> Result<Vec<PersistedDecision>> {
        let rows = match filter {
            Some(decision) => {
                sqlx::query(&format!(
                    "{SELECT_DECISIONS} WHERE decision = ? ORDER BY position ASC"
                ))
                .bind(decision.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{SELECT_DECISIONS} ORDER BY position ASC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(decode_row).collect()
    }

    pub async fn find_decision(&self, identity: &CandidateId) -> Result<Option<PersistedDecision>> {
        let row = sqlx::query(&format!("{SELECT_DECISIONS} WHERE identity = ?"))
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    pub async fn decision_counts(&self) -> Result<DecisionCounts> {
        let rows = sqlx::query(
            "SELECT decision, COUNT(*) FROM persisted_decisions GROUP BY decision",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = DecisionCounts::default();
        for row in rows {
            let decision: String = row.try_get(0)?;
            let count: i64 = row.try_get(1)?;
            match parse_decision(&decision)? {
                Decision::None => counts.undecided += count,
                Decision::Accepted => counts.accepted += count,
                Decision::Rejected => counts.rejected += count,
            }
        }
        Ok(counts)
    }

    pub async fn delete_decision(&self, identity: &CandidateId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM persisted_decisions WHERE identity = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM persisted_decisions")
            .execute(&self.pool)
            .await
            .context("failed to clear persisted decisions")?;
        Ok(result.rows_affected())
    }
}

fn decode_row(row: &SqliteRow) -> Result<PersistedDecision> {
    let decision: String = row.try_get("decision")?;
    let age: Option<i64> = row.try_get("age")?;
    let decided_at: Option<DateTime<Utc>> = row.try_get("decided_at")?;
    Ok(PersistedDecision {
        identity: CandidateId::new(row.try_get::<String, _>("identity")?),
        decision: parse_decision(&decision)?,
        display_snapshot: DisplayPayload {
            name: row.try_get("name")?,
            age: age.and_then(|age| u32::try_from(age).ok()),
            email: row.try_get("email")?,
            city: row.try_get("city")?,
            phone: row.try_get("phone")?,
            image_url: row.try_get("image_url")?,
        },
        decided_at,
    })
}

fn parse_decision(raw: &str) -> Result<Decision> {
    Decision::parse(raw).ok_or_else(|| anyhow!("unknown decision value '{raw}' in storage"))
}

#[async_trait]
impl DecisionStore for Storage {
    async fn load_all(&self) -> Result<Vec<PersistedDecision>> {
        self.list_decisions(None).await
    }

    async fn replace_all(&self, records: Vec<PersistedDecision>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM persisted_decisions")
            .execute(&mut *tx)
            .await
            .context("failed to drop superseded decisions")?;
        for (position, record) in records.iter().enumerate() {
            sqlx::query(
                "INSERT INTO persisted_decisions
                    (identity, decision, name, age, email, city, phone, image_url, decided_at, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(identity) DO UPDATE SET
                    decision = excluded.decision,
                    name = excluded.name,
                    age = excluded.age,
                    email = excluded.email,
                    city = excluded.city,
                    phone = excluded.phone,
                    image_url = excluded.image_url,
                    decided_at = excluded.decided_at,
                    updated_at = CURRENT_TIMESTAMP",
            )
            .bind(record.identity.as_str())
            .bind(record.decision.as_str())
            .bind(&record.display_snapshot.name)
            .bind(record.display_snapshot.age.map(i64::from))
            .bind(&record.display_snapshot.email)
            .bind(&record.display_snapshot.city)
            .bind(&record.display_snapshot.phone)
            .bind(&record.display_snapshot.image_url)
            .bind(record.decided_at)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to store decision for {}", record.identity))?;
        }
        tx.commit().await?;
        debug!(records = records.len(), "storage: decisions replaced");
        Ok(())
    }

    async fn upsert(&self, record: PersistedDecision) -> Result<()> {
        sqlx::query(
            "INSERT INTO persisted_decisions
                (identity, decision, name, age, email, city, phone, image_url, decided_at, position)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM persisted_decisions))
             ON CONFLICT(identity) DO UPDATE SET
                decision = excluded.decision,
                name = excluded.name,
                age = excluded.age,
                email = excluded.email,
                city = excluded.city,
                phone = excluded.phone,
                image_url = excluded.image_url,
                decided_at = excluded.decided_at,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(record.identity.as_str())
        .bind(record.decision.as_str())
        .bind(&record.display_snapshot.name)
        .bind(record.display_snapshot.age.map(i64::from))
        .bind(&record.display_snapshot.email)
        .bind(&record.display_snapshot.city)
        .bind(&record.display_snapshot.phone)
        .bind(&record.display_snapshot.image_url)
        .bind(record.decided_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert decision for {}", record.identity))?;
        debug!(identity = %record.identity, decision = %record.decision, "storage: decision upserted");
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    match sqlite_path(database_url).as_deref().and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}' for the decision database", parent.display())),
        _ => Ok(()),
    }
}

/// File path behind a sqlite URL; `None` for in-memory and non-sqlite URLs.
fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
