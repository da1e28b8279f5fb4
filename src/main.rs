use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, sleep_until, Duration, Instant};

use ride_telemetry::geocode::{NominatimGeocoder, OfflineGeocoder, ReverseGeocoder};
use ride_telemetry::live_status::format_duration;
use ride_telemetry::sensors::{now_ms, SensorEvent, SimulatedRide};
use ride_telemetry::storage::{FileStore, RouteStore};
use ride_telemetry::types::RoutePoint;
use ride_telemetry::{spawn_tracker, RideSessionController, RouteRecord, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "ride_tracker")]
#[command(about = "Record a motorcycle ride: lean angle, speed, distance and route", long_about = None)]
struct Args {
    /// Recording length in seconds
    #[arg(value_name = "SECONDS", default_value = "60")]
    duration: u64,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Route store directory (overrides config)
    #[arg(long)]
    store_dir: Option<String>,

    /// Skip reverse geocoding
    #[arg(long)]
    offline: bool,

    /// Seconds the filter runs before recording starts
    #[arg(long, default_value = "2")]
    warmup: u64,

    /// Simulated ride start latitude
    #[arg(long, default_value = "50.0614")]
    start_lat: f64,

    /// Simulated ride start longitude
    #[arg(long, default_value = "19.9366")]
    start_lon: f64,

    /// Where to write the live readout JSON
    #[arg(long, default_value = "live_status.json")]
    status_file: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = TelemetryConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = args.store_dir.as_ref() {
        config.store_dir = dir.clone();
    }

    log::info!("Ride tracker starting");
    log::info!("  Duration: {} s", args.duration);
    log::info!("  Store dir: {}", config.store_dir);
    log::info!("  Geocoding: {}", if args.offline { "off" } else { config.geocoder_url.as_str() });

    let record = if args.offline {
        record_ride(&args, &config, OfflineGeocoder).await?
    } else {
        let geocoder = NominatimGeocoder::new(&config.geocoder_url)?;
        record_ride(&args, &config, geocoder).await?
    };

    let routes = RouteStore::new(FileStore::open(&config.store_dir)?);
    let id = routes.append(record.clone())?;

    println!("\n=== Ride Summary ===");
    println!("Route id: {}", id);
    println!("Start: {} ({})", record.start_location, record.start_date);
    println!("Distance: {:.2} km", record.distance_km);
    println!("Duration: {}", format_duration(record.duration_sec));
    println!("Avg speed: {:.1} km/h", record.avg_speed_kmh);
    println!("Max speed: {:.1} km/h", record.max_speed_kmh);
    println!(
        "Max lean: L {}° / R {}°",
        record.max_lean_left_deg.abs(),
        record.max_lean_right_deg
    );
    println!("Route points: {}", record.route_points.len());
    println!("Stored rides: {}", routes.list()?.len());

    Ok(())
}

async fn record_ride<G>(args: &Args, config: &TelemetryConfig, geocoder: G) -> Result<RouteRecord>
where
    G: ReverseGeocoder + Send + Sync + 'static,
{
    let (event_tx, event_rx) = mpsc::channel::<SensorEvent>(500);

    let subscribed_at = now_ms();
    let ride = SimulatedRide::new(subscribed_at, RoutePoint::new(args.start_lat, args.start_lon));
    let subscriptions = ride.subscribe_all(
        Duration::from_millis(config.sensors.motion_interval_ms),
        Duration::from_millis(config.sensors.location_interval_ms),
        config.sensors.location_distance_filter_m,
        event_tx,
    );
    log::info!("Subscribed {} sensor feeds", subscriptions.len());

    let controller = RideSessionController::new(config, subscribed_at);
    let (handle, task) = spawn_tracker(controller, geocoder, event_rx, subscriptions);

    sleep(Duration::from_secs(args.warmup)).await;
    handle.start().await?;
    handle.calibrate().await?;

    let deadline = sleep_until(Instant::now() + Duration::from_secs(args.duration));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline, ctrl_c);

    let mut status_ticker = interval(Duration::from_secs(2));
    status_ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = status_ticker.tick() => {
                let live = handle.readout();
                log::info!("{}", live.summary());
                if let Err(e) = live.save(&args.status_file) {
                    log::warn!("Failed to write {}: {}", args.status_file, e);
                }
            }
            _ = &mut ctrl_c => {
                log::info!("Interrupted, finishing ride");
                break;
            }
        }
    }

    let record = handle.stop().await?;
    drop(handle);
    task.await?;
    Ok(record)
}
