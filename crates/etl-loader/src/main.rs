//! CLI entry point for the ETL loader.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use etl_loader::{
    BulkDestination, ConnectionConfig, EtlConfig, EtlConfigBuilder, FillOperation,
    MemoryDestination, Pipeline, PipelineResult, PostgresDestination,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Clean a CSV/Parquet file and bulk-load it into PostgreSQL",
    long_about = "Reads a CSV or Parquet file, removes duplicate rows, fills missing values,\n\
                  drops Z-score outliers and copies the result into a PostgreSQL table in\n\
                  fixed-size batches, creating the table if needed.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  PGPASSWORD    Database password when --password is not given (.env is read)\n\n\
                  EXAMPLES:\n  \
                  # Load a Parquet file\n  \
                  etl-loader --path yellow_tripdata.parquet --table yellow_taxi -u root -d ny_taxi\n\n  \
                  # Fill nulls and use smaller batches\n  \
                  etl-loader --path trips.csv --table trips --fill passenger_count=median \\\n      \
                  --fill store_and_fwd_flag=custom:N --chunk-size 5000\n\n  \
                  # Run the cleaning without a database\n  \
                  etl-loader --path trips.csv --table trips --dry-run"
)]
struct Args {
    /// Source CSV or Parquet file
    #[arg(long)]
    path: Option<PathBuf>,

    /// Destination table name
    #[arg(long)]
    table: Option<String>,

    /// Database host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Database port
    #[arg(short, long)]
    port: Option<u16>,

    /// Database user
    #[arg(short, long)]
    user: Option<String>,

    /// Database password (falls back to PGPASSWORD)
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Database name
    #[arg(short, long)]
    db: Option<String>,

    /// Rows per load batch
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Z-score above which a row is dropped
    #[arg(long)]
    threshold: Option<f64>,

    /// Columns screened for outliers (default: all numeric columns)
    #[arg(long, value_delimiter = ',')]
    outlier_cols: Option<Vec<String>>,

    /// Fill operation `cols=strategy[:value]`, e.g. `fare,tip=median` or
    /// `flag=custom:N`. Repeatable; applied in order.
    #[arg(long)]
    fill: Vec<String>,

    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep duplicate rows
    #[arg(long)]
    keep_duplicates: bool,

    /// Load into an in-memory destination instead of PostgreSQL
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON to stdout (disables logging)
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();

    let config = build_config(&args)?;
    let pipeline = build_pipeline(&args, config)?;

    let result = if args.dry_run {
        info!("Dry run: loading into memory");
        let mut destination = MemoryDestination::new();
        run(&pipeline, &mut destination)?
    } else {
        info!("Connecting to {}", pipeline.config().connection);
        let mut destination = PostgresDestination::connect(&pipeline.config().connection)
            .context("Failed to connect to PostgreSQL")?;
        let result = run(&pipeline, &mut destination);
        if let Err(e) = destination.close() {
            warn!("Failed to close the connection cleanly: {}", e);
        }
        result?
    };

    print_result(&result, args.json)?;

    if !result.success {
        return Err(anyhow!(
            "Load aborted: {}",
            result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    Ok(())
}

/// Merge the optional config file with command-line overrides.
fn build_config(args: &Args) -> Result<EtlConfig> {
    let file_config = args
        .config
        .as_ref()
        .map(|path| {
            EtlConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))
        })
        .transpose()?;

    if file_config.is_none() && (args.path.is_none() || args.table.is_none()) {
        return Err(anyhow!("--path and --table are required without --config"));
    }

    let base_connection = file_config
        .as_ref()
        .map(|c| c.connection.clone())
        .unwrap_or_default();
    let mut builder = match file_config {
        Some(config) => EtlConfigBuilder::from_config(config),
        None => EtlConfig::builder(),
    };

    if let Some(path) = &args.path {
        builder = builder.source_path(path);
    }
    if let Some(table) = &args.table {
        builder = builder.table_name(table);
    }
    if let Some(rows) = args.chunk_size {
        builder = builder.chunk_size(rows);
    }
    if let Some(threshold) = args.threshold {
        builder = builder.outlier_threshold(threshold);
    }
    if let Some(cols) = &args.outlier_cols {
        builder = builder.outlier_columns(cols.iter().cloned());
    }
    for raw in &args.fill {
        let op: FillOperation = raw
            .parse()
            .with_context(|| format!("Invalid --fill '{raw}'"))?;
        builder = builder.fill(op);
    }
    if args.keep_duplicates {
        builder = builder.remove_duplicates(false);
    }

    builder = builder.connection(connection_from_args(args, base_connection));

    Ok(builder.build()?)
}

fn connection_from_args(args: &Args, base: ConnectionConfig) -> ConnectionConfig {
    let mut conn = base;
    if let Some(host) = &args.host {
        conn.host = host.clone();
    }
    if let Some(port) = args.port {
        conn.port = port;
    }
    if let Some(user) = &args.user {
        conn.user = user.clone();
    }
    if let Some(db) = &args.db {
        conn.database = db.clone();
    }
    match &args.password {
        Some(password) => conn.password = password.clone(),
        None if conn.password.is_empty() => {
            if let Ok(password) = std::env::var("PGPASSWORD") {
                conn.password = password;
            }
        }
        None => {}
    }
    conn
}

fn build_pipeline(args: &Args, config: EtlConfig) -> Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

fn run(pipeline: &Pipeline, destination: &mut dyn BulkDestination) -> Result<PipelineResult> {
    pipeline.run_from_path(destination).map_err(|e| {
        error!("Pipeline failed: {}", e);
        anyhow!("Pipeline failed: {}", e)
    })
}

/// Print the run report.
///
/// Uses `println!` on purpose: the report is the program's output and must
/// not depend on the log level.
fn print_result(result: &PipelineResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!();
    println!("{}", "=".repeat(80));
    println!("{}", if result.success { "LOAD COMPLETE" } else { "LOAD ABORTED" });
    println!("{}", "=".repeat(80));
    println!("{}", result.summary());
    for step in &result.transform.processing_steps {
        println!("  - {}", step);
    }
    println!("{}", "=".repeat(80));
    Ok(())
}
