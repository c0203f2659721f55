use std::path::PathBuf;

use clap::{Parser, Subcommand};
use green_tracker_data_management::{
    data_path, export::write_export, history_store::HistoryStore, DataManager, DATABASE_PATH, HISTORY_PATH
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Manual data operations on the local history and the snapshot database.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// History file, defaults to GREEN_TRACKER_HISTORY or data/history.json
    #[arg(long, global = true)]
    history: Option<PathBuf>,
    /// Snapshot database, defaults to GREEN_TRACKER_DATABASE or data/snapshots.db
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(subcommand)]
    History(HistoryCommand),
    /// List stored snapshots, newest first
    Snapshots,
    /// Print one stored snapshot as JSON
    Snapshot {
        id: String,
        /// Remove it from the database instead
        #[arg(long)]
        delete: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    List,
    /// Write the history as CSV
    Export {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::History(command) => {
            let path = cli.history
                .or_else(|| std::env::var_os("GREEN_TRACKER_HISTORY").map(PathBuf::from))
                .unwrap_or_else(|| data_path(HISTORY_PATH));
            let store = HistoryStore::open(&path).await?;

            match command {
                HistoryCommand::List => {
                    for record in store.records().await {
                        let live = record.live.as_ref()
                            .map(|live| format!("{:.2} km by {}", live.distance_km(), live.mode))
                            .unwrap_or_default();
                        println!(
                            "{}  {:>8.2} kg CO2  {:>8.2}  {}  {}",
                            record.date.format("%Y-%m-%d %H:%M"),
                            record.report.total_kg_co2,
                            record.report.total_cost,
                            record.report.note.as_deref().unwrap_or("weekly"),
                            live,
                        );
                    }
                }
                HistoryCommand::Export { out } => {
                    let path = write_export(&store.records().await, &out, chrono::Utc::now()).await?;
                    tracing::info!("Exported {} records to {:?}", store.len().await, path);
                }
                HistoryCommand::Clear => {
                    store.clear().await?;
                    tracing::info!("Cleared history at {:?}", store.path());
                }
            }
        }
        Command::Snapshots => {
            let manager = open_manager(cli.database).await;
            for stored in manager.get_snapshots().await? {
                println!(
                    "{:>6}  {}  {:>8.2} km  {:<10}  {:>8.4} kg CO2  {:>8.2}",
                    stored.id,
                    stored.created_at.format("%Y-%m-%d %H:%M"),
                    stored.snapshot.distance_km(),
                    stored.snapshot.mode,
                    stored.snapshot.kg_co2,
                    stored.snapshot.cost,
                );
            }
        }
        Command::Snapshot { id, delete: true } => {
            let manager = open_manager(cli.database).await;
            if !manager.delete_snapshot(&id).await? {
                anyhow::bail!("No snapshot with id {id}");
            }
            tracing::info!("Deleted snapshot {id}");
        }
        Command::Snapshot { id, delete: false } => {
            let manager = open_manager(cli.database).await;
            match manager.get_snapshot(&id).await? {
                Some(stored) => println!("{}", serde_json::to_string_pretty(&stored)?),
                None => anyhow::bail!("No snapshot with id {id}"),
            }
        }
    }

    Ok(())
}

async fn open_manager(database: Option<PathBuf>) -> DataManager {
    let path = database
        .or_else(|| std::env::var_os("GREEN_TRACKER_DATABASE").map(PathBuf::from))
        .unwrap_or_else(|| data_path(DATABASE_PATH));
    DataManager::start(Some(&path)).await
}
