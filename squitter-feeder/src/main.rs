//! squitter-feeder: replay captured extended squitter frames through the
//! decode core.
//!
//! Supports:
//! - Decoding hex frame files (or stdin) into an aircraft table or JSON lines
//! - Showing and initializing the configuration file

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use squitter_core::capture::CaptureQueue;
use squitter_core::config::{self, AdmissionPolicy, Config};
use squitter_core::directory::AircraftDirectory;
use squitter_core::frame::RawMessage;
use squitter_core::AircraftRecord;

mod capture;

/// Capture ring size; the feeder drains it whenever it fills.
const QUEUE_SIZE: usize = 256;

#[derive(Parser)]
#[command(
    name = "squitter-feeder",
    version,
    about = "Replay ADS-B extended squitter captures through the decoder"
)]
struct Cli {
    /// Config file (defaults to ~/.squitter/config.yaml)
    #[arg(long, global = true, env = "SQUITTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode hex frames from a file and print the aircraft directory
    Decode {
        /// Path to file containing hex frames (one per line), or `-` for stdin
        file: PathBuf,

        /// Print one JSON record per aircraft instead of a table
        #[arg(long)]
        json: bool,

        /// Maximum number of tracked aircraft
        #[arg(long)]
        capacity: Option<usize>,

        /// Admission policy when full: reject_new or evict_oldest
        #[arg(long)]
        admission: Option<AdmissionPolicy>,

        /// Seconds without an update before an aircraft is dropped
        #[arg(long)]
        stale_timeout: Option<f64>,

        /// Receiver latitude, used for surface positions
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Receiver longitude, used for surface positions
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()) // use RUST_LOG to set max level
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::config_file);

    match cli.command {
        Commands::Decode {
            file,
            json,
            capacity,
            admission,
            stale_timeout,
            lat,
            lon,
        } => {
            let mut config = load_config(&config_path);
            if let Some(v) = capacity {
                config.directory.capacity = v;
            }
            if let Some(v) = admission {
                config.directory.admission = v;
            }
            if let Some(v) = stale_timeout {
                config.directory.stale_timeout = v;
            }
            if lat.is_some() {
                config.receiver.lat = lat;
            }
            if lon.is_some() {
                config.receiver.lon = lon;
            }
            cmd_decode(&file, &config, json)
        }
        Commands::Config { init } => cmd_config(&config_path, init),
    }
}

fn load_config(path: &Path) -> Config {
    config::load_config_from(path).unwrap_or_else(|e| {
        eprintln!("Error reading config {}: {e}", path.display());
        std::process::exit(1);
    })
}

fn cmd_decode(file: &Path, config: &Config, json: bool) {
    let frames = capture::FrameReader::new(file)
        .read_all()
        .unwrap_or_else(|e| {
            eprintln!("Error reading {}: {e}", file.display());
            std::process::exit(1);
        });
    info!(frames = frames.len(), file = %file.display(), "replaying capture");

    let mut directory = AircraftDirectory::from_config(config);
    let mut queue: CaptureQueue<QUEUE_SIZE> = CaptureQueue::new();
    let capacity = queue.capacity();
    let (mut producer, mut consumer) = queue.split();

    let mut invalid_hex = 0u64;
    let mut last_ts = 0.0;
    for batch in frames.chunks(capacity) {
        for (hex, ts) in batch {
            match RawMessage::from_hex(hex, *ts, 0.0) {
                Ok(raw) => {
                    producer.push(raw);
                }
                Err(e) => {
                    debug!(error = %e, "skipping line");
                    invalid_hex += 1;
                }
            }
            last_ts = *ts;
        }
        consumer.drain_into(&mut directory);
        directory.update(last_ts);
    }

    let records = directory.snapshot();
    if json {
        for ac in &records {
            match serde_json::to_string(ac) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("Error encoding {}: {e}", ac.icao_str()),
            }
        }
    } else {
        print_table(&records);
    }

    let stats = directory.stats();
    eprintln!();
    eprintln!(
        "Frames: {} read, {} accepted, {} malformed, {} parity errors, {} unknown type",
        frames.len(),
        stats.accepted,
        stats.malformed + invalid_hex,
        stats.parity_errors,
        stats.unknown_type
    );
    eprintln!(
        "Positions: {} fixes, {} pair mismatches, {} impossible latitudes",
        stats.position_fixes, stats.pair_mismatches, stats.invalid_positions
    );
    eprintln!(
        "Aircraft: {} tracked, {} created, {} swept, {} evicted, {} rejected (capacity {})",
        directory.num_aircraft(),
        stats.created,
        stats.swept,
        stats.evicted,
        stats.rejected_full,
        directory.capacity()
    );
    if producer.dropped() > 0 {
        eprintln!("Capture ring dropped {} frames", producer.dropped());
    }
}

fn print_table(records: &[AircraftRecord]) {
    if records.is_empty() {
        println!("No aircraft.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ICAO", "Callsign", "Squawk", "Alt (ft)", "Speed (kts)", "Hdg", "VRate", "Lat", "Lon",
        "Gnd", "Msgs",
    ]);

    for ac in records {
        table.add_row(vec![
            Cell::new(ac.icao_str()),
            Cell::new(ac.callsign.as_ref().map_or("-", |c| c.as_str())),
            Cell::new(ac.squawk.as_deref().unwrap_or("-")),
            Cell::new(ac.altitude_ft().map_or("-".into(), |a| a.to_string())),
            Cell::new(ac.speed_kts.map_or("-".into(), |s| format!("{s:.0}"))),
            Cell::new(ac.heading_deg.map_or("-".into(), |h| format!("{h:.1}"))),
            Cell::new(ac.vertical_rate_fpm.map_or("-".into(), |v| v.to_string())),
            Cell::new(position_cell(ac.position_valid, ac.lat)),
            Cell::new(position_cell(ac.position_valid, ac.lon)),
            Cell::new(if ac.airborne { "" } else { "yes" }),
            Cell::new(ac.message_count),
        ]);
    }

    println!("{table}");
}

fn position_cell(valid: bool, value: Option<f64>) -> String {
    match value {
        Some(v) if valid => format!("{v:.4}"),
        _ => "-".into(),
    }
}

fn cmd_config(path: &Path, init: bool) {
    if init {
        let config = Config::default();
        if let Err(e) = config::save_config_to(&config, path) {
            eprintln!("Error writing {}: {e}", path.display());
            std::process::exit(1);
        }
        eprintln!("Wrote {}", path.display());
        print!("{}", config::serialize_config(&config));
        return;
    }

    let config = load_config(path);
    eprintln!("# {}", path.display());
    print!("{}", config::serialize_config(&config));
}
