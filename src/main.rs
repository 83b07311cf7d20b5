use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use clap::{Parser, Subcommand};
use station_sim::catalog::Catalog;
use station_sim::config::SimulatorConfig;
use station_sim::locator::MediaLocator;
use station_sim::playlist::{total_duration, PlaylistItem};
use station_sim::rules::{CompiledRules, PlaybackMode};
use station_sim::time::MediaTime;
use station_sim::{Result, StationEngine};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stationsim", about = "Simulated radio station playlist generator")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a catalog and compile the rules of its stations
    Validate {
        /// Catalog JSON file
        catalog: PathBuf,
        /// Only check this station
        #[arg(short, long)]
        station: Option<String>,
    },
    /// Print the full broadcast of one day
    Day {
        catalog: PathBuf,
        station: String,
        /// Calendar day (YYYY-MM-DD)
        date: String,
        /// Playback mode: default, alternate, or an option name
        #[arg(short, long, default_value = "default")]
        mode: String,
    },
    /// Extract a window of broadcast, as a player would request it
    Window {
        catalog: PathBuf,
        station: String,
        /// Calendar day (YYYY-MM-DD)
        date: String,
        /// Start within the day (HH:MM[:SS] or seconds; may exceed a day)
        offset: String,
        /// Window length (HH:MM[:SS] or seconds)
        duration: String,
        #[arg(short, long, default_value = "default")]
        mode: String,
        /// Cut the last item to end exactly at the window's end
        #[arg(long)]
        trim_last: bool,
        /// Resolve media locations, treating the station as downloaded
        #[arg(long)]
        local: bool,
    },
    /// Show what is playing now and what comes next
    Now {
        catalog: PathBuf,
        station: String,
        /// Instant to tune in at (RFC 3339); defaults to the current time
        #[arg(long)]
        at: Option<String>,
        #[arg(short, long, default_value = "default")]
        mode: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(SimulatorConfig::default_path);
    let config = SimulatorConfig::load(&config_path);

    if let Err(e) = run(cli.command, cli.json, &config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, json: bool, config: &SimulatorConfig) -> Result<()> {
    match command {
        Commands::Validate { catalog, station } => {
            let catalog = Catalog::load(&catalog)?;
            let ids: Vec<String> = match station {
                Some(id) => vec![id],
                None => catalog.stations.iter().map(|s| s.id.clone()).collect(),
            };
            let mut failed = 0;
            for id in &ids {
                match CompiledRules::compile(&catalog, id, config) {
                    Ok(rules) => println!(
                        "{}: ok ({} fragments, {} options)",
                        id,
                        rules.fragments().len(),
                        rules.available_options().len()
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("{}: {}", id, e);
                    }
                }
            }
            if failed > 0 {
                eprintln!("{} of {} station(s) failed validation", failed, ids.len());
                std::process::exit(1);
            }
        }
        Commands::Day {
            catalog,
            station,
            date,
            mode,
        } => {
            let engine = open_engine(&catalog, &station, config)?;
            let day = parse_date(&date);
            let mode = PlaybackMode::from_str_loose(&mode);
            let items = engine.daily_playlist(day, &mode)?;
            if json {
                print_json(&*items)?;
            } else {
                println!(
                    "{} on {} ({}): {} item(s), {}",
                    station,
                    day,
                    mode,
                    items.len(),
                    total_duration(&items)
                );
                print_items(&items);
            }
        }
        Commands::Window {
            catalog,
            station,
            date,
            offset,
            duration,
            mode,
            trim_last,
            local,
        } => {
            let engine = open_engine(&catalog, &station, config)?;
            let day = parse_date(&date);
            let mode = PlaybackMode::from_str_loose(&mode);
            let offset = parse_span(&offset);
            let duration = parse_span(&duration);
            let items = engine.extract(day, offset, duration, &mode, trim_last)?;
            if json {
                let locator = MediaLocator::from_config(config);
                let availability = |_: &str| local;
                let located: Vec<_> = items
                    .iter()
                    .map(|item| locator.locate_item(&station, item, &availability))
                    .collect();
                print_json(&located)?;
            } else {
                println!(
                    "{} from {} {} for {}: {} item(s), {}",
                    station,
                    day,
                    offset,
                    duration,
                    items.len(),
                    total_duration(&items)
                );
                print_items(&items);
            }
        }
        Commands::Now {
            catalog,
            station,
            at,
            mode,
        } => {
            let engine = open_engine(&catalog, &station, config)?;
            let instant = match at {
                Some(s) => parse_instant(&s),
                None => Utc::now(),
            };
            let mode = PlaybackMode::from_str_loose(&mode);
            let (day, offset) = engine.day_and_offset(instant);
            let Some((now, next)) = engine.now_and_next(day, offset, &mode)? else {
                println!("{}: nothing scheduled", station);
                return Ok(());
            };
            if json {
                print_json(&serde_json::json!({ "now": now, "next": next }))?;
            } else {
                println!("{} at {} {}", station, day, offset);
                print!("Now:  ");
                print_items(std::slice::from_ref(&now));
                if let Some(next) = next {
                    print!("Next: ");
                    print_items(std::slice::from_ref(&next));
                }
            }
        }
    }
    Ok(())
}

fn open_engine(catalog: &Path, station: &str, config: &SimulatorConfig) -> Result<StationEngine> {
    let catalog = Catalog::load(catalog)?;
    StationEngine::new(&catalog, station, config)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_items(items: &[PlaylistItem]) {
    for item in items {
        let mixes = if item.mixes.is_empty() {
            String::new()
        } else {
            let ids: Vec<&str> = item.mixes.iter().map(|m| m.id.as_str()).collect();
            format!("  + {}", ids.join(", "))
        };
        println!(
            "{}  {:>12}  {:<14} {} ({}){}",
            item.start(),
            item.duration().to_string(),
            item.fragment,
            item.track.id,
            item.track.path,
            mixes
        );
        for marker in &item.markers {
            println!(
                "{:>26}  {} - {}",
                (item.start() + marker.offset).to_string(),
                marker.artist.as_deref().unwrap_or("?"),
                marker.title.as_deref().unwrap_or("?")
            );
        }
    }
}

fn parse_date(s: &str) -> NaiveDate {
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => {
            eprintln!("Error: invalid date '{}'. Use YYYY-MM-DD.", s);
            std::process::exit(1);
        }
    }
}

/// Parse "HH:MM", "HH:MM:SS" or plain seconds.
fn parse_span(s: &str) -> MediaTime {
    if let Ok(secs) = s.parse::<f64>() {
        if secs >= 0.0 {
            return MediaTime::from_secs_f64(secs);
        }
    }
    let time = NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"));
    match time {
        Ok(t) => MediaTime::from_secs(t.num_seconds_from_midnight() as i64),
        Err(_) => {
            eprintln!("Error: invalid time '{}'. Use HH:MM[:SS] or seconds.", s);
            std::process::exit(1);
        }
    }
}

fn parse_instant(s: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => t.with_timezone(&Utc),
        Err(_) => {
            eprintln!("Error: invalid instant '{}'. Use RFC 3339, e.g. 2025-05-03T12:00:00Z.", s);
            std::process::exit(1);
        }
    }
}
