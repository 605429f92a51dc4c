use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, normalize_database_url};
use shared::domain::{CandidateId, Decision};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Defaults to the database configured in review.toml / REVIEW__DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print stored records, optionally only one decision kind.
    List {
        #[arg(long)]
        decision: Option<String>,
    },
    /// Dump stored records as JSON.
    Export {
        #[arg(long)]
        pretty: bool,
    },
    Counts,
    Delete {
        identity: String,
    },
    /// Remove every stored record.
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .unwrap_or_else(|| load_settings().database_url);
    let database_url = normalize_database_url(&database_url);
    let storage = Storage::new(&database_url).await?;

    match cli.command {
        Command::List { decision } => {
            let filter = match decision.as_deref() {
                Some(raw) => Some(
                    Decision::parse(raw).with_context(|| format!("unknown decision '{raw}'"))?,
                ),
                None => None,
            };
            for record in storage.list_decisions(filter).await? {
                let decided_at = record
                    .decided_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<8} {:<40} {:<24} {decided_at}",
                    record.decision.as_str(),
                    record.identity,
                    record.display_snapshot.name
                );
            }
        }
        Command::Export { pretty } => {
            let records = storage.list_decisions(None).await?;
            let json = if pretty {
                serde_json::to_string_pretty(&records)?
            } else {
                serde_json::to_string(&records)?
            };
            println!("{json}");
        }
        Command::Counts => {
            let counts = storage.decision_counts().await?;
            println!(
                "accepted={} rejected={} undecided={} total={}",
                counts.accepted,
                counts.rejected,
                counts.undecided,
                counts.total()
            );
        }
        Command::Delete { identity } => {
            let identity = CandidateId::new(identity);
            if storage.delete_decision(&identity).await? {
                println!("deleted {identity}");
            } else {
                println!("no record for {identity}");
            }
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear {database_url} without --yes");
            }
            let removed = storage.clear().await?;
            info!(removed, %database_url, "tools: decisions cleared");
            println!("removed {removed} records");
        }
    }

    Ok(())
}
