use super::*;

use std::collections::HashMap;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn defaults_match_the_reference_gesture_geometry() {
    let settings = Settings::from_sources(None, no_env);
    assert_eq!(settings, Settings::default());

    let options = settings.session_options();
    assert_eq!(options.batch_size, 10);
    assert_eq!(options.deck.gesture, GestureConfig::default());
    assert_eq!(options.deck.reconcile_mode, ReconcileMode::Tagged);
    assert!(!options.deck.remove_resolved_on_decision);
}

#[test]
fn file_values_override_defaults() {
    let raw = r#"
        feed_url = "http://localhost:9000/api/"
        batch_size = 25
        reconcile_mode = "exclude"
        remove_resolved = true
        batch_persistence = "supersede"
        commit_threshold = 80.0
    "#;
    let settings = Settings::from_sources(Some(raw), no_env);

    assert_eq!(settings.feed_url, "http://localhost:9000/api/");
    assert_eq!(settings.batch_size, 25);
    assert_eq!(settings.reconcile_mode, ReconcileMode::Exclude);
    assert!(settings.remove_resolved);
    assert_eq!(settings.batch_persistence, BatchPersistence::Supersede);
    assert_eq!(settings.session_options().deck.gesture.commit_threshold, 80.0);
}

#[test]
fn environment_wins_over_file_and_bad_values_are_ignored() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("REVIEW__BATCH_SIZE", "3"),
        ("REVIEW__CACHE_FIRST", "off"),
        ("REVIEW__RECONCILE_MODE", "sideways"),
        ("DATABASE_URL", "sqlite://./elsewhere.db"),
    ]);
    let settings = Settings::from_sources(Some("batch_size = 40\ncache_first = true"), |key| {
        vars.get(key).map(|v| v.to_string())
    });

    assert_eq!(settings.batch_size, 3);
    assert!(!settings.cache_first);
    assert_eq!(settings.reconcile_mode, ReconcileMode::Tagged);
    assert_eq!(settings.database_url, "sqlite://./elsewhere.db");
}

#[test]
fn unreadable_file_falls_back_to_defaults() {
    let settings = Settings::from_sources(Some("batch_size = [not toml"), no_env);
    assert_eq!(settings.batch_size, Settings::default().batch_size);
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite://C:/Users/alice/test.db"
    );
}

#[test]
fn missing_settings_file_is_not_an_error() {
    let settings = load_settings_from(Path::new("./definitely/not/here/review.toml"));
    assert_eq!(settings.batch_size, Settings::default().batch_size);
}
