use std::{fs::OpenOptions, path::PathBuf, sync::Arc};

use activity_tracker::{
    Driver, DriverConfig, GpxReplaySource, Pacing, forward_snapshots,
    gpx_util::{read_gpx_file, write_gpx_file},
};
use activity_tracker_lib::{
    ActivityRecord, ActivityTracker, AnomalyPolicy, ManualClock, Position, Snapshot,
    format::{format_distance, format_duration, format_elevation, format_pace, format_speed},
    geodesic::initial_bearing,
};
use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "activity-replay")]
#[command(about = "Replays a GPX recording through the activity tracker", long_about = None)]
struct Cli {
    /// GPX file with timed track points
    gpx_file: PathBuf,
    /// `key = value` configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// reject, flag or accept_all
    #[arg(long)]
    anomaly_policy: Option<AnomalyPolicy>,
    /// Report rejected samples as errors
    #[arg(long)]
    strict: bool,
    /// Body weight in kg, enables the calorie estimate
    #[arg(long)]
    weight: Option<f64>,
    /// Replay in real time, this many times faster
    #[arg(long)]
    speedup: Option<f64>,
    /// Write the recorded track to this GPX file
    #[arg(long)]
    export: Option<PathBuf>,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// Also log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut DriverConfig) {
        if let Some(policy) = self.anomaly_policy {
            config.tracker.anomaly_policy = policy;
        }
        if self.strict {
            config.tracker.strict_validation = true;
        }
        if self.weight.is_some() {
            config.tracker.body_weight_kg = self.weight;
        }
        if self.speedup.is_some() {
            config.replay_speedup = self.speedup;
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    points_replayed: usize,
    #[serde(flatten)]
    record: &'a ActivityRecord,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=trace,activity_tracker=trace,activity_tracker_lib=info", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    let mut config = match &cli.config {
        Some(path) => DriverConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => DriverConfig::default(),
    };
    cli.apply_overrides(&mut config);
    tracing::debug!("Configuration: {:?}", config);

    let points = read_gpx_file(&cli.gpx_file).with_context(|| format!("failed to read {}", cli.gpx_file.display()))?;
    let Some(first) = points.first() else {
        bail!("{} has no timed track points", cli.gpx_file.display());
    };

    // The tracker runs on recorded time, starting at the first point.
    let clock = ManualClock::new(first.timestamp);
    let mut tracker = ActivityTracker::new(config.tracker.clone(), Arc::new(clock.clone()));
    let dashboard = tokio::spawn(dashboard(forward_snapshots(&mut tracker, config.broadcast_capacity).subscribe()));

    let (source, replayed) = GpxReplaySource::new(points, Pacing::from_speedup(config.replay_speedup));
    let (driver, handle) = Driver::new(tracker, config.channel_capacity);
    let driver = tokio::spawn(driver.with_source(Box::new(source)).follow_sample_time(clock).run());

    let session_id = handle.start().await?;
    tracing::info!("Replaying {} as session {}", cli.gpx_file.display(), session_id);

    let points_replayed = replayed.await.context("replay ended before every point was queued")?;
    let record = handle.stop().await?;
    handle.shutdown().await?;

    // Dropping the tracker closes the snapshot channel and ends the dashboard.
    drop(driver.await?);
    dashboard.await?;

    if let Some(path) = &cli.export {
        write_gpx_file(&record, path).with_context(|| format!("failed to export {}", path.display()))?;
        tracing::info!("Exported track to {}", path.display());
    }

    if cli.json {
        let summary = Summary {
            points_replayed,
            record: &record,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&record, points_replayed);
    }

    Ok(())
}

async fn dashboard(mut snapshots: Receiver<Snapshot>) {
    let mut previous: Option<Position> = None;

    loop {
        let snapshot = match snapshots.recv().await {
            Ok(snapshot) => snapshot,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Dashboard fell behind, skipped {} snapshots", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let position = snapshot.sample.position;
        let heading = previous
            .filter(|previous| *previous != position)
            .map(|previous| format!("{:03.0}°", initial_bearing(previous, position)))
            .unwrap_or_else(|| "---".to_string());
        previous = Some(position);

        let metrics = &snapshot.metrics;
        tracing::info!(
            "{} | {} | {} | {} | heading {}{}",
            format_duration(metrics.elapsed_active()),
            format_distance(metrics.distance_m),
            format_pace(metrics.pace_min_per_km),
            format_speed(metrics.avg_speed_kmh),
            heading,
            snapshot.anomaly.map(|anomaly| format!(" | flagged: {anomaly}")).unwrap_or_default()
        );
    }
}

fn print_summary(record: &ActivityRecord, points_replayed: usize) {
    let metrics = &record.metrics;
    let when = |time: DateTime<Utc>| time.format("%d/%m/%Y %H:%M:%S (UTC)").to_string();

    println!("Session {}", record.session_id);
    println!("  started      {}", when(record.started_at));
    println!("  stopped      {}", when(record.stopped_at));
    println!("  samples      {} accepted of {} replayed", metrics.sample_count, points_replayed);
    println!("  duration     {}", format_duration(metrics.elapsed_active()));
    println!("  distance     {}", format_distance(metrics.distance_m));
    println!("  avg speed    {}", format_speed(metrics.avg_speed_kmh));
    println!("  max speed    {}", metrics.max_speed_kmh().map_or("-".to_string(), format_speed));
    println!("  pace         {} /km", format_pace(metrics.pace_min_per_km));
    println!("  elevation    +{} / -{}", format_elevation(metrics.elevation_gain_m), format_elevation(metrics.elevation_loss_m));
    if let Some(calories) = metrics.calories_kcal {
        println!("  calories     {:.0} kcal", calories);
    }
}
