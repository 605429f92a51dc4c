//! Client-side wiring around the deck engine: where candidates come from,
//! how settings are loaded, and the session that owns a deck.

pub mod config;
pub mod session;
pub mod source;

pub use config::{load_settings, load_settings_from, normalize_database_url, Settings, SETTINGS_FILE};
pub use session::{BatchOrigin, BatchPersistence, ReviewSession, SessionError, SessionEvent, SessionOptions};
pub use source::{cached_batch, CachedCandidateSource, HttpCandidateSource};
