use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;

use ride_telemetry::geocode::{NominatimGeocoder, OfflineGeocoder, ReverseGeocoder};
use ride_telemetry::sensors::SensorEvent;
use ride_telemetry::storage::{FileStore, RouteStore};
use ride_telemetry::{RideSessionController, RouteRecord, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "ride_replay")]
#[command(about = "Replay a recorded sensor log through the ride telemetry engine", long_about = None)]
struct Args {
    /// Path to a sensor log (.json or .json.gz)
    #[arg(long)]
    log: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event time (ms after the first event) at which recording starts
    #[arg(long, default_value = "0")]
    start_after_ms: i64,

    /// Calibrate the lean angle right after recording starts
    #[arg(long, default_value_t = false)]
    calibrate: bool,

    /// Resolve the start location over the network
    #[arg(long, default_value_t = false)]
    geocode: bool,

    /// Append the resulting route to the configured store
    #[arg(long, default_value_t = false)]
    save: bool,
}

#[derive(Deserialize)]
struct SensorLog {
    events: Vec<SensorEvent>,
}

fn load_log(path: &Path) -> anyhow::Result<SensorLog> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Feed events in log order; duration ticks follow whole seconds of event time
async fn replay<G: ReverseGeocoder>(
    events: &[SensorEvent],
    config: &TelemetryConfig,
    args: &Args,
    geocoder: &G,
) -> anyhow::Result<RouteRecord> {
    let Some(first) = events.first() else {
        anyhow::bail!("Log contains no events");
    };
    let origin_ms = first.timestamp_ms();
    let start_ms = origin_ms + args.start_after_ms.max(0);

    let mut controller = RideSessionController::new(config, origin_ms);
    let mut next_tick_ms = None;

    for event in events {
        let ts = event.timestamp_ms();
        if next_tick_ms.is_none() && ts >= start_ms {
            controller.start()?;
            if args.calibrate {
                controller.calibrate();
            }
            next_tick_ms = Some(start_ms + 1000);
        }
        if let Some(next) = next_tick_ms.as_mut() {
            while ts >= *next {
                controller.tick();
                *next += 1000;
            }
        }
        controller.on_sensor_event(event);
    }

    if !controller.is_recording() {
        anyhow::bail!("Log ends before recording start");
    }
    log::info!("{}", controller.readout().summary());
    Ok(controller.stop(geocoder).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = TelemetryConfig::load_or_default(args.config.as_deref())?;

    let log_file = load_log(&args.log)?;
    log::info!("Loaded {} events from {}", log_file.events.len(), args.log.display());

    let record = if args.geocode {
        let geocoder = NominatimGeocoder::new(&config.geocoder_url)?;
        replay(&log_file.events, &config, &args, &geocoder).await?
    } else {
        replay(&log_file.events, &config, &args, &OfflineGeocoder).await?
    };

    if args.save {
        let routes = RouteStore::new(FileStore::open(&config.store_dir)?);
        let id = routes.append(record.clone())?;
        log::info!("Saved route {} to {}", id, config.store_dir);
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
