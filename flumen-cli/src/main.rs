//! CLI for the flumen time-series storage engine.
//!
//! Provides commands for inspecting a dataset and managing its calendars,
//! entity windows, fields and series.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use flumen::{FlumenConfig, Frequency, TimeSeries, TimeSeriesStore};
use tracing_subscriber::EnvFilter;

/// flumen: flat-file time-series storage for market data.
#[derive(Parser)]
#[command(name = "flumen", version, about)]
struct Cli {
    /// JSON configuration file naming the dataset root and exchanges.
    #[arg(long, global = true, conflicts_with = "root")]
    config: Option<PathBuf>,

    /// Dataset root directory, used with the preset exchanges.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display calendars, entities, fields and disk usage of the dataset.
    Info,

    /// Manage calendars.
    #[command(subcommand)]
    Calendar(CalendarCommand),

    /// Show entity windows.
    Entity {
        /// Entity to show; all entities if omitted.
        entity: Option<String>,
    },

    /// Print the raw values of a field array.
    Field {
        /// Field file name (`{entity}.{field}.{FREQ}`).
        name: String,

        /// First position to print.
        #[arg(long, default_value = "0")]
        start: i64,

        /// Position to stop before; `-1` reads through the end.
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        end: i64,
    },

    /// Read a stored series.
    Read {
        #[command(flatten)]
        series: SeriesArgs,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Write a series given as comma-separated values.
    Write {
        #[command(flatten)]
        series: SeriesArgs,

        /// Values, one per generated timestamp (e.g. "1.5,2,2.5").
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        values: Vec<f32>,
    },
}

/// Calendar subcommands.
#[derive(Subcommand)]
enum CalendarCommand {
    /// Generate and store the calendar of a frequency.
    Create {
        /// Frequency (e.g. "D", "15T", "SSED").
        freq: String,
        /// First instant (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        start: String,
        /// Last instant (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        end: String,
    },

    /// Print the timestamps and positions of a calendar.
    Show {
        /// Frequency of the calendar.
        freq: String,
        /// Restrict to timestamps at or after this instant.
        #[arg(long)]
        start: Option<String>,
        /// Restrict to timestamps at or before this instant.
        #[arg(long)]
        end: Option<String>,
    },

    /// Append timestamps to a calendar up to a new end.
    Extend {
        /// Frequency of the calendar.
        freq: String,
        /// New last instant.
        #[arg(long)]
        end: String,
    },

    /// Delete a calendar.
    Drop {
        /// Frequency of the calendar.
        freq: String,
    },
}

/// Identifies one series and its window.
#[derive(Args)]
struct SeriesArgs {
    /// Entity identifier (e.g. "XSHG.600519").
    entity: String,
    /// Field identifier (e.g. "close").
    field: String,
    /// Frequency (e.g. "D", "SSED").
    freq: String,
    /// First instant (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    start: String,
    /// Last instant (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    end: String,
}

/// Output format for read results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with a data array.
    Json,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = open_store(cli.config.as_deref(), cli.root.as_deref())
        .and_then(|mut store| run(&mut store, cli.command));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Opens the dataset from `--config`, `--root`, or the current directory.
fn open_store(config: Option<&Path>, root: Option<&Path>) -> CliResult<TimeSeriesStore> {
    let config = match (config, root) {
        (Some(path), _) => FlumenConfig::load(path)?,
        (None, Some(root)) => FlumenConfig::new(root),
        (None, None) => FlumenConfig::new("."),
    };
    tracing::debug!(root = %config.root.display(), "opening dataset");
    Ok(TimeSeriesStore::from_config(&config)?)
}

fn run(store: &mut TimeSeriesStore, command: Commands) -> CliResult<()> {
    match command {
        Commands::Info => cmd_info(store),
        Commands::Calendar(command) => cmd_calendar(store, command),
        Commands::Entity { entity } => cmd_entity(store, entity.as_deref()),
        Commands::Field { name, start, end } => cmd_field(store, &name, start, end),
        Commands::Read { series, format } => cmd_read(store, &series, &format),
        Commands::Write { series, values } => cmd_write(store, &series, values),
    }
}

/// Implements `flumen info`.
fn cmd_info(store: &TimeSeriesStore) -> CliResult<()> {
    println!("Dataset: {}", store.root().display());
    println!();

    let calendars = store.calendars();
    let frequencies: Vec<_> = calendars.frequencies().cloned().collect();
    println!("Calendars: {}", frequencies.len());
    for freq in &frequencies {
        let index = calendars.calendar(freq)?;
        match (index.first(), index.last()) {
            (Some(first), Some(last)) => println!(
                "  {freq} ({}): {} timestamps, {} .. {}",
                freq.unit().description(),
                index.len(),
                first.to_rfc3339(),
                last.to_rfc3339()
            ),
            _ => println!("  {freq}: empty"),
        }
    }
    println!();

    println!("Entities: {}", store.entities().len());
    let fields = store.fields().fields()?;
    println!("Fields: {}", fields.len());
    for name in &fields {
        println!("  - {name} ({} values)", store.fields().len(name)?);
    }
    println!();

    let total_size = dir_size(store.root())?;
    println!("Total disk usage: {} ({total_size} bytes)", format_bytes(total_size));
    Ok(())
}

/// Implements `flumen calendar ...`.
fn cmd_calendar(store: &mut TimeSeriesStore, command: CalendarCommand) -> CliResult<()> {
    let calendars = store.calendars_mut();
    match command {
        CalendarCommand::Create { freq, start, end } => {
            let freq = Frequency::parse(&freq)?;
            calendars.create(&freq, parse_time(&start)?, parse_time(&end)?)?;
            println!("Created {freq}: {} timestamps", calendars.len(&freq)?);
        }
        CalendarCommand::Show { freq, start, end } => {
            let freq = Frequency::parse(&freq)?;
            let index = calendars.calendar(&freq)?;
            let start = match start {
                Some(s) => parse_time(&s)?,
                None => index.first().unwrap_or(DateTime::<Utc>::MIN_UTC),
            };
            let end = match end {
                Some(s) => parse_time(&s)?,
                None => index.last().unwrap_or(DateTime::<Utc>::MAX_UTC),
            };
            println!("position,timestamp");
            for (ts, position) in calendars.get(&freq, start, end)?.iter() {
                println!("{position},{}", ts.to_rfc3339());
            }
        }
        CalendarCommand::Extend { freq, end } => {
            let freq = Frequency::parse(&freq)?;
            let appended = calendars.extend_to(&freq, parse_time(&end)?)?;
            println!("Extended {freq}: {appended} timestamps appended");
        }
        CalendarCommand::Drop { freq } => {
            let freq = Frequency::parse(&freq)?;
            calendars.drop(&freq)?;
            println!("Dropped {freq}");
        }
    }
    Ok(())
}

/// Implements `flumen entity [entity]`.
fn cmd_entity(store: &TimeSeriesStore, entity: Option<&str>) -> CliResult<()> {
    let entities = store.entities();
    println!("entity,start,end");
    match entity {
        Some(name) => {
            let window = entities.find(name)?;
            println!("{name},{},{}", window.start.to_rfc3339(), window.end.to_rfc3339());
        }
        None => {
            for (name, window) in entities.entities() {
                println!("{name},{},{}", window.start.to_rfc3339(), window.end.to_rfc3339());
            }
        }
    }
    Ok(())
}

/// Implements `flumen field <name>`.
fn cmd_field(store: &TimeSeriesStore, name: &str, start: i64, end: i64) -> CliResult<()> {
    let values = store.fields().find(name, start, end)?;
    println!("# field={name}, values={}", values.len());
    for value in values {
        println!("{value}");
    }
    Ok(())
}

/// Implements `flumen read <entity> <field> <freq>`.
fn cmd_read(store: &TimeSeriesStore, args: &SeriesArgs, format: &OutputFormat) -> CliResult<()> {
    let freq = Frequency::parse(&args.freq)?;
    let data = store.read(
        &args.entity,
        &args.field,
        &freq,
        parse_time(&args.start)?,
        parse_time(&args.end)?,
    )?;

    match format {
        OutputFormat::Csv => {
            println!(
                "# entity={}, field={}, freq={freq}, points={}",
                args.entity,
                args.field,
                data.len()
            );
            println!("timestamp,value");
            for (ts, val) in &data {
                println!("{},{val}", ts.to_rfc3339());
            }
        }
        OutputFormat::Json => {
            let json_data: Vec<serde_json::Value> = data
                .iter()
                .map(|(ts, val)| {
                    serde_json::json!({
                        "timestamp": ts.to_rfc3339(),
                        "value": val,
                    })
                })
                .collect();

            let output = serde_json::json!({
                "entity": args.entity,
                "field": args.field,
                "freq": freq.raw(),
                "count": data.len(),
                "data": json_data,
            });

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `flumen write <entity> <field> <freq> --values ...`.
fn cmd_write(store: &mut TimeSeriesStore, args: &SeriesArgs, values: Vec<f32>) -> CliResult<()> {
    let freq = Frequency::parse(&args.freq)?;
    let series = TimeSeries::new(
        args.entity.as_str(),
        args.field.as_str(),
        freq,
        parse_time(&args.start)?,
        parse_time(&args.end)?,
        values,
    )?;
    store.write(&series)?;
    println!("Wrote {} values to {}", series.values.len(), series.field_name());
    Ok(())
}

/// Parses `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
fn parse_time(s: &str) -> CliResult<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid time '{s}': {e}. Use YYYY-MM-DD or RFC 3339.").into())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Recursively calculates directory size.
fn dir_size(path: &Path) -> CliResult<u64> {
    let mut total = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path)?;
            } else {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}
