// ABOUTME: CLI entry point for highwater
// ABOUTME: Runs an extraction job from a TOML config and inspects its watermark

use anyhow::Context;
use clap::{Parser, Subcommand};
use highwater::{ExtractionCycle, ExtractionDaemon, JobConfig, RestClient, WatermarkStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "highwater")]
#[command(about = "Incremental row extraction with a persisted high-water mark", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// API key for the query service (falls back to HIGHWATER_API_KEY env)
    #[arg(long = "api-key", env = "HIGHWATER_API_KEY", global = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the job's query and print new rows as JSON lines
    Run {
        /// Path to the job config TOML
        #[arg(long)]
        config: PathBuf,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Show the job's stored watermark
    Watermark {
        #[arg(long)]
        config: PathBuf,
    },
    /// Check a job config and print the first row query it would run
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    // Rows go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { config, once } => run(&config, cli.api_key, once).await,
        Commands::Watermark { config } => show_watermark(&config, cli.api_key).await,
        Commands::Validate { config } => validate(&config),
    }
}

fn load(path: &Path) -> anyhow::Result<JobConfig> {
    JobConfig::load(path).with_context(|| format!("Invalid job config {}", path.display()))
}

fn connect(config: &JobConfig, api_key: Option<String>) -> anyhow::Result<Arc<RestClient>> {
    let api_key = api_key.or_else(|| config.engine.api_key.clone());
    let client = RestClient::new(&config.engine.url, api_key, config.engine_timeout())
        .context("Failed to create query service client")?;
    Ok(Arc::new(client))
}

fn build(
    config: &JobConfig,
    api_key: Option<String>,
) -> anyhow::Result<(Arc<RestClient>, WatermarkStore)> {
    let client = connect(config, api_key)?;
    let store = config.watermark_store(client.clone());
    Ok((client, store))
}

fn print_rows(rows: Vec<highwater::Row>) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        serde_json::to_writer(&mut out, &row).context("Failed to encode row")?;
        out.write_all(b"\n").context("Failed to write row")?;
    }
    out.flush().context("Failed to flush stdout")?;
    Ok(())
}

async fn run(path: &Path, api_key: Option<String>, once: bool) -> anyhow::Result<()> {
    let config = load(path)?;
    let rewriter = config.rewriter()?;
    let (client, store) = build(&config, api_key)?;

    if !rewriter.is_constrained() {
        tracing::warn!(
            "Job '{}' has no constraint column; every cycle returns the full query result",
            config.job.name
        );
    }
    tracing::info!(
        "Starting job '{}' against {} ({} watermark)",
        config.job.name,
        client.base_url(),
        if store.is_durable() { "durable" } else { "in-memory" }
    );

    let cycle = ExtractionCycle::new(client, rewriter, store);
    let mut daemon = ExtractionDaemon::new(cycle, config.daemon_config());

    if once {
        let (rows, stats) = daemon.run_once().await;
        tracing::info!(
            "Read {} rows in {}ms, watermark {:?}",
            stats.rows,
            stats.duration_ms,
            stats.watermark
        );
        return print_rows(rows);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx_clone.send(());
    });

    daemon.run(shutdown_rx, print_rows).await?;
    tracing::info!(
        "Job '{}' stopped after {} cycles at watermark {:?}",
        config.job.name,
        daemon.cycle().cycles(),
        daemon.cycle().current_watermark()
    );
    Ok(())
}

async fn show_watermark(path: &Path, api_key: Option<String>) -> anyhow::Result<()> {
    let config = load(path)?;
    let (_, mut store) = build(&config, api_key)?;

    if !store.is_durable() {
        println!("Job '{}' keeps its watermark in memory only", config.job.name);
        return Ok(());
    }

    store
        .retrieve()
        .await
        .context("Failed to read the stored watermark")?;
    match store.current().to_document() {
        Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
        None => println!("No watermark stored for job '{}'", config.job.name),
    }
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    let mut rewriter = config.rewriter()?;
    let plan = rewriter.build_row_plan(None);

    println!("✓ Job '{}' is valid", config.job.name);
    match config.constraint() {
        Some(constraint) => println!(
            "  Constraint column: {} (row limit: {})",
            constraint.column(),
            constraint
                .row_limit()
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
        None => println!("  No constraint column; rows are not tracked"),
    }
    println!("  First row query: {}", plan);
    Ok(())
}
