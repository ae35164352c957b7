//! CLI for the lamina time-series storage engine.
//!
//! Provides commands for inspecting retention layouts, replaying samples
//! through a database, and benchmarking the write path.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use lamina::schema::DEFAULT_RETENTIONS;
use lamina::{
    AggregateFn, Collector, Database, DatabaseConfig, Interval, LayerOptions, MetricConfig, ModifyFn, Precision,
    ReadResult, StorageType, TimeUnit,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Number of points a replay read returns when no precision is given.
const DEFAULT_POINTS: u64 = 100;

/// lamina: in-memory multi-resolution round-robin time-series storage CLI.
#[derive(Parser)]
#[command(name = "lamina", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Show the layers a retention string produces and their memory cost.
    Layout {
        /// Retention string, e.g. "10s:1h, 1m:1d".
        retentions: String,

        /// Minimum time unit.
        #[arg(long, default_value = "second")]
        unit: UnitArg,

        /// Value codec (bit, float, double, int8..int64, uint8..uint64).
        #[arg(long)]
        value_storage: Option<StorageType>,

        /// Time codec.
        #[arg(long)]
        time_storage: Option<StorageType>,
    },

    /// Write `time,value` samples from a file into a metric and read them back.
    Replay {
        /// Samples file: one `time,value` pair per line, `#` starts a comment.
        file: PathBuf,

        /// Metric name.
        #[arg(long)]
        metric: String,

        /// Retention string, overriding the configured default.
        #[arg(long)]
        retentions: Option<String>,

        /// Period to read back (e.g. "start:end", "now-1h:now", "100:200").
        #[arg(long, default_value = "start:end")]
        period: String,

        /// Read precision as an interval (e.g. "15s").
        #[arg(long, conflicts_with = "points")]
        precision: Option<String>,

        /// Read roughly this many points instead of a fixed precision.
        #[arg(long)]
        points: Option<u64>,

        /// Aggregate applied inside each read bucket.
        #[arg(long, default_value = "last")]
        aggregate: AggregateFn,

        /// How a write merges with a live slot.
        #[arg(long, default_value = "last")]
        modify: ModifyFn,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// JSON file holding a database configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a write-path microbenchmark.
    Bench {
        /// Number of samples to write.
        #[arg(long, default_value = "1000000")]
        points: u64,

        /// Retention string of the benchmark metric.
        #[arg(long, default_value = DEFAULT_RETENTIONS)]
        retentions: String,
    },
}

/// Minimum time unit.
#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    /// One MTU per second.
    Second,
    /// One MTU per millisecond.
    Millisecond,
    /// One MTU per microsecond.
    Microsecond,
}

impl From<UnitArg> for TimeUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Second => TimeUnit::Second,
            UnitArg::Millisecond => TimeUnit::Millisecond,
            UnitArg::Microsecond => TimeUnit::Microsecond,
        }
    }
}

/// Output format for read results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with the full read result.
    Json,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Layout {
            retentions,
            unit,
            value_storage,
            time_storage,
        } => cmd_layout(&retentions, unit.into(), value_storage, time_storage),
        Commands::Replay {
            file,
            metric,
            retentions,
            period,
            precision,
            points,
            aggregate,
            modify,
            format,
            config,
        } => {
            let precision = match (precision, points) {
                (Some(interval), _) => Precision::Interval(interval),
                (None, Some(count)) => Precision::Count(count),
                (None, None) => Precision::Count(DEFAULT_POINTS),
            };
            let options = ReplayOptions {
                metric,
                retentions,
                period,
                precision,
                aggregate,
                modify,
                format,
                config,
            };
            cmd_replay(&file, &options)
        }
        Commands::Bench { points, retentions } => cmd_bench(points, &retentions),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `lamina layout <retentions>`.
fn cmd_layout(
    retentions: &str,
    unit: TimeUnit,
    value_storage: Option<StorageType>,
    time_storage: Option<StorageType>,
) -> CliResult<()> {
    let config = MetricConfig {
        name: "layout".to_string(),
        retentions: retentions.to_string(),
        value_storage,
        time_storage,
        time_unit: unit,
    };

    let mut db = Database::new();
    db.metric(&config)?;
    let layers = db.collector().layers(&config.name)?;

    println!("Retentions: {retentions}");
    println!("Time unit: {unit:?} ({} MTU/s)", unit.interval().mtu_per_second());
    println!();

    for (i, layer) in layers.iter().enumerate() {
        println!(
            "  Layer {i}: {}  interval={} period={} cells={}",
            layer.retention, layer.interval, layer.period, layer.cells
        );
        println!(
            "    Codecs: value={} time={}  ({})",
            layer.value_storage,
            layer.time_storage,
            format_bytes(layer.size)
        );
    }

    let total = db.size(&config.name)?;
    println!();
    println!("Total memory: {} ({total} bytes)", format_bytes(total));
    Ok(())
}

/// Arguments of `lamina replay` after the CLI has parsed them.
struct ReplayOptions {
    metric: String,
    retentions: Option<String>,
    period: String,
    precision: Precision,
    aggregate: AggregateFn,
    modify: ModifyFn,
    format: OutputFormat,
    config: Option<PathBuf>,
}

/// Implements `lamina replay <file> --metric NAME`.
fn cmd_replay(file: &Path, options: &ReplayOptions) -> CliResult<()> {
    let mut config = match &options.config {
        Some(path) => serde_json::from_str::<DatabaseConfig>(&std::fs::read_to_string(path)?)?,
        None => DatabaseConfig::default(),
    };
    if let Some(retentions) = &options.retentions {
        config.retentions.clone_from(retentions);
    }

    let mut db = Database::with_config(config)?;
    let samples = read_samples(file)?;
    tracing::info!(metric = %options.metric, samples = samples.len(), "replaying samples");

    for (time, value) in &samples {
        db.write(&options.metric, *value, Some(*time), options.modify)?;
    }

    let result = db.read(&options.metric, &options.period, &options.precision, options.aggregate)?;
    print_result(&options.metric, &result, &options.format)
}

/// Parses `time,value` lines, skipping blanks and `#` comments.
fn read_samples(path: &Path) -> CliResult<Vec<(i64, f64)>> {
    let text = std::fs::read_to_string(path)?;
    let mut samples = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (time, value) = line
            .split_once(',')
            .ok_or_else(|| format!("line {}: expected 'time,value', got '{line}'", number + 1))?;
        let time: i64 = time
            .trim()
            .parse()
            .map_err(|e| format!("line {}: bad time '{}': {e}", number + 1, time.trim()))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|e| format!("line {}: bad value '{}': {e}", number + 1, value.trim()))?;
        samples.push((time, value));
    }

    Ok(samples)
}

fn print_result(metric: &str, result: &ReadResult, format: &OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Csv => {
            println!(
                "# metric={metric}, relevant={}, start={}, end={}, points={}",
                result.relevant,
                result.start,
                result.end,
                result.len()
            );
            println!("time,value");
            for row in &result.rows {
                match row.value {
                    Some(value) => println!("{},{value}", row.time),
                    None => println!("{},", row.time),
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "metric": metric,
                "count": result.len(),
                "result": result,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `lamina bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(points: u64, retentions: &str) -> CliResult<()> {
    println!("lamina write-path benchmark");
    println!("  Points: {points}");
    println!("  Retentions: {retentions}");
    println!();

    let base_time = Interval::SECONDS.now();
    let mut collector = Collector::new();
    collector.init_with_time("bench", retentions, LayerOptions::default(), base_time)?;
    let layers = collector.layers("bench")?.len();

    println!("Writing {points} samples across {layers} layers...");

    let start = Instant::now();
    let mut ts = base_time;
    for i in 0..points {
        ts += 1;
        collector.write("bench", (i % 1_000) as f64, Some(ts), ModifyFn::Last)?;
    }
    let elapsed = start.elapsed();

    let ns_per_write = elapsed.as_nanos() as f64 / points.max(1) as f64;
    let writes_per_sec = points as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results:");
    println!("  Total writes: {points}");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_write:.1} ns/write ({:.1} ns/layer)", ns_per_write / layers as f64);
    println!("  Throughput: {writes_per_sec:.0} writes/sec");
    println!("  Memory: {}", format_bytes(collector.size("bench")?));

    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: usize) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
