use std::{fs, path::Path};

use deck::{DeckOptions, GestureConfig, ReconcileMode};
use serde::Deserialize;
use tracing::warn;

use crate::session::{BatchPersistence, SessionOptions};

pub const SETTINGS_FILE: &str = "review.toml";
const ENV_PREFIX: &str = "REVIEW__";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub feed_url: String,
    pub database_url: String,
    pub batch_size: usize,
    pub fetch_timeout_secs: u64,
    pub reconcile_mode: ReconcileMode,
    pub remove_resolved: bool,
    pub cache_first: bool,
    pub batch_persistence: BatchPersistence,
    pub commit_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_url: "https://randomuser.me/api/".into(),
            database_url: "sqlite://./data/review.db".into(),
            batch_size: 10,
            fetch_timeout_secs: 15,
            reconcile_mode: ReconcileMode::Tagged,
            remove_resolved: false,
            cache_first: true,
            batch_persistence: BatchPersistence::Retain,
            commit_threshold: GestureConfig::default().commit_threshold,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    feed_url: Option<String>,
    database_url: Option<String>,
    batch_size: Option<usize>,
    fetch_timeout_secs: Option<u64>,
    reconcile_mode: Option<String>,
    remove_resolved: Option<bool>,
    cache_first: Option<bool>,
    batch_persistence: Option<String>,
    commit_threshold: Option<f64>,
}

impl Settings {
    /// Defaults, then the TOML file contents (if any), then the environment.
    pub fn from_sources(
        file_contents: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut settings = Self::default();

        if let Some(raw) = file_contents {
            match toml::from_str::<FileSettings>(raw) {
                Ok(file_cfg) => settings.apply_file(file_cfg),
                Err(error) => warn!(%error, "config: ignoring unreadable settings file"),
            }
        }

        let var = |key: &str| env(&format!("{ENV_PREFIX}{key}"));
        if let Some(v) = var("FEED_URL") {
            settings.feed_url = v;
        }
        if let Some(v) = var("DATABASE_URL").or_else(|| env("DATABASE_URL")) {
            settings.database_url = v;
        }
        if let Some(v) = var("BATCH_SIZE").and_then(|v| v.parse().ok()) {
            settings.batch_size = v;
        }
        if let Some(v) = var("FETCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            settings.fetch_timeout_secs = v;
        }
        if let Some(v) = var("RECONCILE_MODE").and_then(|v| ReconcileMode::parse(&v)) {
            settings.reconcile_mode = v;
        }
        if let Some(v) = var("REMOVE_RESOLVED").and_then(|v| parse_bool(&v)) {
            settings.remove_resolved = v;
        }
        if let Some(v) = var("CACHE_FIRST").and_then(|v| parse_bool(&v)) {
            settings.cache_first = v;
        }
        if let Some(v) = var("BATCH_PERSISTENCE").and_then(|v| BatchPersistence::parse(&v)) {
            settings.batch_persistence = v;
        }
        if let Some(v) = var("COMMIT_THRESHOLD").and_then(|v| v.parse().ok()) {
            settings.commit_threshold = v;
        }

        settings
    }

    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.feed_url {
            self.feed_url = v;
        }
        if let Some(v) = file_cfg.database_url {
            self.database_url = v;
        }
        if let Some(v) = file_cfg.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = file_cfg.fetch_timeout_secs {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = file_cfg.reconcile_mode.as_deref() {
            match ReconcileMode::parse(v) {
                Some(mode) => self.reconcile_mode = mode,
                None => warn!(value = v, "config: unknown reconcile_mode"),
            }
        }
        if let Some(v) = file_cfg.remove_resolved {
            self.remove_resolved = v;
        }
        if let Some(v) = file_cfg.cache_first {
            self.cache_first = v;
        }
        if let Some(v) = file_cfg.batch_persistence.as_deref() {
            match BatchPersistence::parse(v) {
                Some(policy) => self.batch_persistence = policy,
                None => warn!(value = v, "config: unknown batch_persistence"),
            }
        }
        if let Some(v) = file_cfg.commit_threshold {
            self.commit_threshold = v;
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            batch_size: self.batch_size.max(1),
            cache_first: self.cache_first,
            batch_persistence: self.batch_persistence,
            deck: DeckOptions {
                reconcile_mode: self.reconcile_mode,
                remove_resolved_on_decision: self.remove_resolved,
                gesture: GestureConfig {
                    commit_threshold: self.commit_threshold.abs(),
                    ..GestureConfig::default()
                },
            },
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

/// Like [`load_settings`], reading the TOML file at `path`. A missing file is
/// not an error.
pub fn load_settings_from(path: &Path) -> Settings {
    let raw = fs::read_to_string(path).ok();
    Settings::from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Turns a plain file path into a `sqlite://` URL. Other URLs pass through.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    format!("sqlite://{path}")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
