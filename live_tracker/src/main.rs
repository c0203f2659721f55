use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use geo_types::Point;
use green_tracker_data_management::history_store::HistoryStore;
use green_tracker_lib::{
    emissions::EmissionCoefficientTable, estimator::SuggestionId, snapshot::Snapshot, transport_mode::TransportMode,
};
use live_tracker::{
    clock::{Clock, SystemClock},
    config::TrackerConfig,
    dashboard::Dashboard,
    location::{GpxReplaySource, LocationSource, NoLocationSource, SimulatedSource},
    save_channel::{RelayChannel, SaveChannel},
    LiveTracker, Notice,
};
use tokio::{io::{AsyncBufReadExt, BufReader}, sync::{broadcast, mpsc}};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Measure a trip and what it emits")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track a trip. Type pause, resume, stop, cancel, apply, mode <m>, tip <id> or status.
    Run {
        #[arg(long, default_value = "car")]
        mode: TransportMode,
        /// Replay a recorded GPX track instead of a live position
        #[arg(long, conflicts_with = "simulate")]
        gpx: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0, requires = "gpx")]
        speedup: f64,
        /// Random walk around downtown Los Angeles
        #[arg(long)]
        simulate: bool,
        /// Keep the trip local, do not contact the relay
        #[arg(long)]
        no_relay: bool,
    },
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

    let config = TrackerConfig::from_env();

    if let Some(path) = &config.coefficients {
        let table = EmissionCoefficientTable::from_json_file(path)?;
        EmissionCoefficientTable::install(table)?;
        tracing::info!("Using coefficients from {:?}", path);
    }

    let Command::Run { mode, gpx, speedup, simulate, no_relay } = Cli::parse().command;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let source: Arc<dyn LocationSource> = match (gpx, simulate) {
        (Some(path), _) => Arc::new(GpxReplaySource::from_file(&path, speedup)?.with_clock(clock.clone())),
        (None, true) => Arc::new(
            SimulatedSource::new(Point::new(-118.2437, 34.0522), Duration::from_secs(1), 4.).with_clock(clock.clone()),
        ),
        (None, false) => Arc::new(NoLocationSource),
    };

    let history = HistoryStore::open(&config.history_path).await
        .with_context(|| format!("Failed to open history at {:?}", config.history_path))?;

    let (dashboard_tx, dashboard_rx) = mpsc::unbounded_channel::<DashboardEvent>();
    let dashboard = Dashboard::load(history.clone(), EmissionCoefficientTable::global()).await;
    let dashboard_task = tokio::spawn(run_dashboard(dashboard, dashboard_rx));

    let (tracker, mut location_rx) = LiveTracker::new(mode, source, history, clock);
    let apply_tx = dashboard_tx.clone();
    let mut tracker = tracker
        .with_user_id(config.user_id.clone())
        .on_apply(move |snapshot| {
            let _ = apply_tx.send(DashboardEvent::Applied(snapshot.clone()));
        });

    let mut relay: Option<Arc<RelayChannel>> = None;
    if !no_relay {
        match RelayChannel::connect(&config.endpoint).await {
            Ok(channel) => {
                let channel = Arc::new(channel.with_ack_timeout(config.ack_timeout));
                tracker = tracker.with_channel(channel.clone() as Arc<dyn SaveChannel>);
                relay = Some(channel);
            }
            Err(e) => tracing::warn!("Relay at {} unreachable ({e}), trips are saved locally only", config.endpoint),
        }
    }

    let mut notices = tracker.subscribe_notices();
    let notice_task = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => println!("{}", describe(&notice)),
                Err(broadcast::error::RecvError::Lagged(missed)) => tracing::debug!("Missed {missed} notices"),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tracker.start()?;

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            Some(update) = location_rx.recv() => {
                tracker.handle_location(update).await;
                if !tracker.state().is_active() {
                    break;
                }
            }
            _ = ticker.tick() => {
                tracker.tick();
                println!("{}", tracker.live_stats().to_json());
                if let Some(relay) = &relay {
                    if let Err(e) = relay.send_update(tracker.session().distance_meters()).await {
                        tracing::debug!("Live update failed: {e}");
                    }
                }
            }
            line = commands.next_line() => {
                let Some(line) = line? else {
                    tracker.stop(false).await;
                    break;
                };
                let mut words = line.split_whitespace();
                match (words.next(), words.next()) {
                    (Some("pause"), _) => { tracker.pause(); }
                    (Some("resume"), _) => {
                        if let Err(e) = tracker.resume() {
                            tracing::warn!("Cannot resume: {e}");
                        }
                    }
                    (Some("apply"), _) => {
                        if tracker.apply_now().is_none() {
                            println!("Nothing to apply while not running");
                        }
                    }
                    (Some("mode"), Some(name)) => match name.parse::<TransportMode>() {
                        Ok(mode) => tracker.set_mode(mode),
                        Err(e) => println!("{e}"),
                    },
                    (Some("tip"), Some(name)) => match name.parse::<SuggestionId>() {
                        Ok(id) => {
                            let _ = dashboard_tx.send(DashboardEvent::Accept(id));
                        }
                        Err(e) => println!("{e}"),
                    },
                    (Some("status"), _) => println!("{}", tracker.live_stats().to_json()),
                    (Some("cancel"), _) => {
                        tracker.stop(false).await;
                        break;
                    }
                    (Some("stop"), _) => {
                        if let Some(report) = tracker.stop(true).await {
                            if let Some(save) = report.save {
                                println!("Saving to relay...");
                                save.await?;
                            }
                        }
                        break;
                    }
                    (None, _) => {}
                    (Some(other), _) => println!("Unknown command {other:?}"),
                }
            }
        }
    }

    if let Some(relay) = relay {
        relay.close().await;
    }

    // Dropping the tracker closes the notice and dashboard channels, so both tasks drain and end.
    drop(tracker);
    drop(dashboard_tx);
    notice_task.await?;
    dashboard_task.await?;

    Ok(())
}

enum DashboardEvent {
    Applied(Snapshot),
    Accept(SuggestionId),
}

async fn run_dashboard(mut dashboard: Dashboard, mut events: mpsc::UnboundedReceiver<DashboardEvent>) {
    while let Some(event) = events.recv().await {
        let now = chrono::Utc::now();
        let result = match event {
            DashboardEvent::Applied(snapshot) => dashboard.apply_live(&snapshot, now).await.map(Some),
            DashboardEvent::Accept(id) => dashboard.accept_suggestion(id, now).await,
        };

        match result {
            Ok(Some(report)) => {
                println!(
                    "Weekly estimate: {:.2} kg CO2, cost {:.2}, {:.2} trees to offset",
                    report.total_kg_co2, report.total_cost, report.trees_saved
                );
                for suggestion in dashboard.suggestions() {
                    println!(
                        "  tip {}: {} (saves {:.2} kg, {:.2})",
                        suggestion.id, suggestion.title, suggestion.impact.kg_co2, suggestion.impact.money
                    );
                }
                for badge in dashboard.badges() {
                    println!("  badge: {}", badge.label());
                }
            }
            Ok(None) => println!("That tip is not on offer right now"),
            Err(e) => tracing::error!("Failed to update the weekly estimate: {e}"),
        }
    }
}

fn describe(notice: &Notice) -> String {
    match notice {
        Notice::LocationUnavailable(reason) => format!("Location unavailable: {reason}"),
        Notice::LocationError(reason) => format!("Location lost, trip stopped: {reason}"),
        Notice::Stopped { applied: true } => "Trip stopped and applied".into(),
        Notice::Stopped { applied: false } => "Trip stopped".into(),
        Notice::SavedToServer { id, degraded: false } => format!("Saved to server ({})", id.as_deref().unwrap_or("no id")),
        Notice::SavedToServer { id, degraded: true } => format!("Server accepted ({}) but has no durable store", id.as_deref().unwrap_or("no id")),
        Notice::ServerSaveFailed(reason) => format!("Server save failed: {reason}. Saved locally"),
        Notice::ServerTimeout => "Server did not answer. Saved locally only".into(),
        Notice::LiveApplied => "Live trip applied to the weekly estimate".into(),
        Notice::LocalPersistFailed(reason) => format!("Could not write local history: {reason}"),
    }
}
