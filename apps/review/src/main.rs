mod commands;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_settings_from, normalize_database_url, BatchPersistence, CachedCandidateSource,
    HttpCandidateSource, ReviewSession, SessionEvent, SETTINGS_FILE,
};
use commands::{parse_command, Command, HELP};
use deck::{CandidateSource, DeckError, DeckUpdate, ReconcileMode};
use storage::Storage;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Review a deck of candidates from the terminal")]
struct Args {
    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    feed_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// `tagged` keeps decided candidates in the deck, `exclude` drops them.
    #[arg(long)]
    reconcile_mode: Option<String>,
    #[arg(long)]
    remove_resolved: bool,
    /// Skip the local cache and always fetch from the feed.
    #[arg(long)]
    no_cache: bool,
    /// Serve candidates from the local database only; never touch the feed.
    #[arg(long)]
    offline: bool,
    /// `retain` or `supersede`.
    #[arg(long)]
    batch_persistence: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings_from(&args.config);
    if let Some(feed_url) = args.feed_url {
        settings.feed_url = feed_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    if let Some(batch_size) = args.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(raw) = args.reconcile_mode.as_deref() {
        settings.reconcile_mode = ReconcileMode::parse(raw)
            .with_context(|| format!("unknown reconcile mode '{raw}'"))?;
    }
    if let Some(raw) = args.batch_persistence.as_deref() {
        settings.batch_persistence = BatchPersistence::parse(raw)
            .with_context(|| format!("unknown batch persistence '{raw}'"))?;
    }
    settings.remove_resolved |= args.remove_resolved;
    if args.no_cache {
        settings.cache_first = false;
    }

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Arc::new(Storage::new(&database_url).await?);
    storage.health_check().await?;

    let source: Arc<dyn CandidateSource> = if args.offline {
        Arc::new(CachedCandidateSource::new(storage.clone()))
    } else {
        Arc::new(HttpCandidateSource::new(
            &settings.feed_url,
            Duration::from_secs(settings.fetch_timeout_secs),
        )?)
    };
    let mut session = ReviewSession::new(source, storage, settings.session_options());

    tokio::spawn(forward_notices(session.subscribe(), print_notice));

    info!(feed_url = %settings.feed_url, %database_url, "review: starting session");
    if let Err(error) = session.start().await {
        warn!(%error, "review: session started without a deck");
        println!("could not load candidates ({error}); type 'refresh' to retry");
    }
    show_current(&session);
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::List => list_cards(&session),
            Command::Tally => {
                let tally = session.tally();
                println!(
                    "accepted={} rejected={} pending={}",
                    tally.accepted, tally.rejected, tally.pending
                );
            }
            Command::Refresh => match session.refresh().await {
                Ok(_) => show_current(&session),
                Err(error) => println!("refresh failed: {error}"),
            },
            Command::Prune => {
                let removed = session.remove_resolved();
                println!("removed {removed} decided cards");
            }
            Command::Cancel => {
                let update = session.interrupt_drag();
                report(&session, Ok(update));
            }
            Command::Decide(decision) => {
                let result = session.decide_current(decision);
                report(&session, result);
            }
            Command::DecideFor(identity, decision) => {
                let result = session.apply_decision(&identity, decision);
                report(&session, result);
            }
            Command::Drag { dx, dy } => {
                let result = session.drag(dx, dy);
                if let Some(state) = session.controller().current_state() {
                    println!(
                        "  offset=({:.0}, {:.0}) rotation={:.0}",
                        state.offset_x, state.offset_y, state.rotation_degrees
                    );
                }
                if let Err(error) = result {
                    println!("{error}");
                }
            }
            Command::Release { dx, dy } => {
                let result = session.release(dx, dy);
                report(&session, result);
            }
        }
    }

    session.interrupt_drag();
    session.flush().await;
    info!("review: session closed");
    Ok(())
}

/// Hands every session event to `emit` until the session goes away. Falling
/// behind skips the missed events rather than stopping.
async fn forward_notices(
    mut events: broadcast::Receiver<SessionEvent>,
    mut emit: impl FnMut(&SessionEvent),
) {
    loop {
        match events.recv().await {
            Ok(event) => emit(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "review: notice printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn report(session: &ReviewSession, result: Result<DeckUpdate, DeckError>) {
    match result {
        Ok(DeckUpdate::Decided(event)) => {
            println!("{} -> {}", event.identity, event.decision);
            show_current(session);
        }
        Ok(DeckUpdate::SnappedBack) => println!("  snapped back"),
        Ok(DeckUpdate::Moved) => {}
        Ok(DeckUpdate::Ignored) => println!("  nothing to do"),
        Err(error) => println!("{error}"),
    }
}

fn show_current(session: &ReviewSession) {
    match session.current_candidate() {
        Some(candidate) => {
            let payload = &candidate.payload;
            let age = payload
                .age
                .map(|age| format!(", {age}"))
                .unwrap_or_default();
            println!("> {}{age} ({}) {}", payload.name, payload.city, candidate.identity);
        }
        None => println!("> no undecided candidates left"),
    }
}

fn list_cards(session: &ReviewSession) {
    let active = session.controller().deck().active().cloned();
    for card in session.controller().cards() {
        let marker = if Some(card.identity()) == active.as_ref() {
            '>'
        } else {
            ' '
        };
        println!(
            "{marker} {:<8} {} <{}>",
            card.decision().as_str(),
            card.candidate.payload.name,
            card.identity()
        );
    }
}

fn print_notice(event: &SessionEvent) {
    match event {
        SessionEvent::FetchFailed(error) if error.retryable => {
            println!("! fetch failed: {} (retry with 'refresh')", error.message)
        }
        SessionEvent::FetchFailed(error) => println!("! fetch failed: {}", error.message),
        SessionEvent::PersistFailed { identity, message } => match identity {
            Some(identity) => println!("! decision for {identity} was not saved: {message}"),
            None => println!("! batch was not saved: {message}"),
        },
        SessionEvent::MalformedRecords(rejected) => {
            println!("! skipped {} malformed records", rejected.len())
        }
        SessionEvent::Exhausted => println!("! deck exhausted, 'refresh' for more"),
        SessionEvent::DeckRebuilt { .. } | SessionEvent::Decided(_) => {}
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
