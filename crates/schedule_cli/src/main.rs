use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use transit_schedule_core::{
    ConnectionQuery, ImportOptions, ImportProgress, ImportReport, NoOpProgress, ScheduleService,
    DEFAULT_BATCH_SIZE, DEFAULT_CONNECTION_LIMIT,
};
use transit_schedule_model::GtfsTime;

#[derive(Debug, Parser)]
#[command(name = "schedule")]
#[command(about = "Import transit schedule feeds and search connections")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a feed and print the resulting dataset versions
    Import {
        #[command(flatten)]
        feed: FeedArgs,
    },
    /// List the stops of the imported feed
    Stops {
        #[command(flatten)]
        feed: FeedArgs,
    },
    /// Find trips from one stop to another
    Connections {
        #[command(flatten)]
        feed: FeedArgs,

        #[arg(long = "from")]
        from: String,

        #[arg(long = "to")]
        to: String,

        /// Service date (YYYY-MM-DD or YYYYMMDD), defaults to today
        #[arg(short = 'd', long = "date")]
        date: Option<String>,

        /// Earliest departure (HH:MM or HH:MM:SS), defaults to now
        #[arg(short = 't', long = "time")]
        time: Option<String>,

        /// Maximum number of connections, at most 5
        #[arg(short = 'l', long = "limit", default_value_t = DEFAULT_CONNECTION_LIMIT)]
        limit: usize,
    },
    /// Show one trip with its stops
    Trip {
        #[command(flatten)]
        feed: FeedArgs,

        #[arg(long = "trip-id", alias = "trip_id")]
        trip_id: String,
    },
    /// Show every departure at a stop
    Departures {
        #[command(flatten)]
        feed: FeedArgs,

        #[arg(long = "stop-id", alias = "stop_id")]
        stop_id: String,
    },
}

#[derive(Debug, Args)]
struct FeedArgs {
    /// Feed archive (.zip) or unpacked feed directory
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    #[arg(short = 'u', long = "url")]
    url: Option<String>,

    #[arg(long = "uploader", default_value_t = 0)]
    uploader: i64,

    #[arg(long = "batch-size", alias = "batch_size", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Print JSON instead of text
    #[arg(long = "json")]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Import { feed } => {
            let (service, report) = load_feed(&feed)?;
            if feed.json {
                print_json(&ImportOutput {
                    report: &report,
                    versions: service.versions(),
                })?;
            } else {
                print_report(&report);
            }
        }
        Command::Stops { feed } => {
            let (service, _) = load_feed(&feed)?;
            let stops = service.active_stops();
            if feed.json {
                print_json(&stops)?;
            } else {
                for stop in stops {
                    println!(
                        "{:<16} {:<40} {:>10.6} {:>11.6}",
                        stop.stop_id, stop.stop_name, stop.stop_lat, stop.stop_lon
                    );
                }
            }
        }
        Command::Connections {
            feed,
            from,
            to,
            date,
            time,
            limit,
        } => {
            let now = Local::now();
            let date = match date.as_deref() {
                Some(value) => parse_date(value)?,
                None => now.date_naive(),
            };
            let time = match time.as_deref() {
                Some(value) => parse_time(value)?,
                None => GtfsTime::from_naive_time(now.time()),
            };

            let (service, _) = load_feed(&feed)?;
            let query = ConnectionQuery::new(from, to, date, time)
                .with_limit(limit.min(DEFAULT_CONNECTION_LIMIT));
            let connections = service.find_connections(&query);
            if feed.json {
                print_json(&connections)?;
            } else if connections.is_empty() {
                println!("no connections found");
            } else {
                for connection in connections {
                    println!(
                        "{} -> {}  {:<6} {}  {} -> {}",
                        clock(connection.departure_time),
                        clock(connection.arrival_time),
                        connection.route_short_name,
                        connection.trip_id,
                        connection.from_stop_name,
                        connection.to_stop_name
                    );
                }
            }
        }
        Command::Trip { feed, trip_id } => {
            let (service, _) = load_feed(&feed)?;
            let details = service.trip(&trip_id)?;
            if feed.json {
                print_json(&details)?;
            } else {
                println!(
                    "trip {} route {} service {}",
                    details.trip.trip_id, details.trip.route_id, details.trip.service_id
                );
                for stop in details.stops {
                    println!(
                        "{:>4}  {}  {}  {}",
                        stop.stop_sequence,
                        clock(stop.arrival_time),
                        clock(stop.departure_time),
                        stop.stop_name
                    );
                }
            }
        }
        Command::Departures { feed, stop_id } => {
            let (service, _) = load_feed(&feed)?;
            let departures = service.departures(&stop_id)?;
            if feed.json {
                print_json(&departures)?;
            } else {
                for departure in departures {
                    println!(
                        "{}  {:<6} {:<12} {}",
                        clock(departure.departure_time),
                        departure.route_short_name,
                        departure.trip_id,
                        departure.trip_headsign
                    );
                }
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportOutput<'a> {
    report: &'a ImportReport,
    versions: Vec<transit_schedule_model::DatasetVersion>,
}

fn load_feed(feed: &FeedArgs) -> anyhow::Result<(ScheduleService, ImportReport)> {
    let service =
        ScheduleService::new(ImportOptions::default().with_batch_size(feed.batch_size));
    let progress: Box<dyn ImportProgress> = if feed.json {
        Box::new(NoOpProgress)
    } else {
        Box::new(IndicatifProgress::new())
    };
    let started_at = Instant::now();

    let report = match (&feed.input, &feed.url) {
        (Some(_), Some(_)) => bail!("--input and --url cannot be provided at the same time"),
        (None, None) => bail!("one of --input or --url must be provided"),
        (Some(path), None) if path.is_dir() => service
            .import_directory(path, feed.uploader, progress.as_ref())
            .with_context(|| format!("import {}", path.display()))?,
        (Some(path), None) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
            service
                .import_dataset_with_progress(
                    &bytes,
                    &file_label(path),
                    feed.uploader,
                    progress.as_ref(),
                )
                .with_context(|| format!("import {}", path.display()))?
        }
        (None, Some(url)) => {
            if url.trim().is_empty() {
                bail!("--url must not be empty");
            }
            let bytes = download_url(url)?;
            service
                .import_dataset_with_progress(
                    &bytes,
                    &download_file_name(url),
                    feed.uploader,
                    progress.as_ref(),
                )
                .with_context(|| format!("import {}", url))?
        }
    };

    info!(
        version = %report.version.id,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "feed imported"
    );
    Ok((service, report))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn download_file_name(url: &str) -> String {
    let trimmed = url.split('?').next().unwrap_or(url);
    let candidate = trimmed
        .rsplit('/')
        .next()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("feed.zip");
    if candidate.to_ascii_lowercase().ends_with(".zip") {
        candidate.to_string()
    } else {
        format!("{}.zip", candidate)
    }
}

fn download_url(url: &str) -> anyhow::Result<Vec<u8>> {
    let client = Client::builder()
        .user_agent(format!("transit-schedule/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("download feed from {}", url))?
        .error_for_status()
        .with_context(|| format!("download feed from {}", url))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("read feed from {}", url))?;
    Ok(bytes.to_vec())
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("--date cannot be empty");
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .with_context(|| format!("invalid --date {}", value))
}

fn parse_time(value: &str) -> anyhow::Result<GtfsTime> {
    GtfsTime::parse(value).with_context(|| format!("invalid --time {}", value))
}

/// Wall-clock time, suffixed with `+Nd` when it falls on a later day.
fn clock(time: GtfsTime) -> String {
    let wall = time.wall_clock().format("%H:%M:%S");
    match time.day_offset() {
        0 => wall.to_string(),
        days => format!("{wall}+{days}d"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!(
        "imported {} as version {} ({} notices{})",
        report.version.filename,
        report.version.id,
        report.notices.len(),
        if report.suppressed_notices > 0 {
            format!(", {} suppressed", report.suppressed_notices)
        } else {
            String::new()
        }
    );
    for entity in &report.entities {
        println!(
            "  {:<20} loaded {:>8}  skipped {:>6}",
            entity.file, entity.loaded, entity.skipped
        );
    }
    for notice in report.notices.iter().take(20) {
        println!(
            "  [{:?}] {}:{} {}",
            notice.severity,
            notice.file.as_deref().unwrap_or("-"),
            notice.row.unwrap_or_default(),
            notice.message
        );
    }
}

struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message("Waiting to load files...");
        Self { bar }
    }
}

impl ImportProgress for IndicatifProgress {
    fn on_start_file_load(&self, file: &str) {
        self.bar.set_message(format!("Loading {}", file));
    }

    fn on_finish_file_load(&self, file: &str, loaded: usize, skipped: usize) {
        self.bar.inc(1);
        if self.bar.position() >= self.bar.length().unwrap_or(0) {
            self.bar.finish_with_message("Import finished");
        } else {
            self.bar
                .set_message(format!("{} loaded ({} rows, {} skipped)", file, loaded, skipped));
        }
    }

    fn set_total_files(&self, count: usize) {
        self.bar.set_length(count as u64);
    }
}
