//! docdump
//!
//! Dumps a document store index to gzip-compressed JSON line files and
//! restores such files back into a store.
//!
//! # Usage
//!
//! ```bash
//! # Dump an index into files of one million records each
//! docdump export --hosts=http://host07:9200,http://host06:9200 \
//!     --index=tweets --out=dump --split=1000000
//!
//! # Restore them
//! docdump import --hosts=http://localhost:9200 --index=tweets \
//!     --files='dump.*.json.gz'
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

use docdump::cli::{CliInterface, Commands, ExportArgs, ImportArgs};
use docdump::connection::ConnectionManager;
use docdump::error::Result;
use docdump::export::ExportPipeline;
use docdump::import::{ImportPipeline, expand_pattern};
use docdump::progress::ProgressTracker;

/// Exit status of a run cut short by Ctrl+C
const EXIT_CANCELLED: i32 = 130;

/// How a run ended
enum Outcome {
    Completed,
    Cancelled,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(Outcome::Completed) => 0,
        Ok(Outcome::Cancelled) => EXIT_CANCELLED,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle informational subcommands or run a transfer
async fn run() -> Result<Outcome> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(Outcome::Completed);
    }

    let cancel_token = CancellationToken::new();
    let ctrl_c_handle = spawn_ctrl_c_listener(cancel_token.clone());

    let result = match &cli.args().command {
        Commands::Export(args) => run_export(&cli, args, cancel_token).await,
        Commands::Import(args) => run_import(&cli, args, cancel_token).await,
        _ => Ok(Outcome::Completed),
    };

    ctrl_c_handle.abort();
    result
}

/// Dump an index to files
async fn run_export(
    cli: &CliInterface,
    args: &ExportArgs,
    cancel_token: CancellationToken,
) -> Result<Outcome> {
    let options = cli.export_options(args)?;
    let manager = ConnectionManager::new(&args.hosts, cli.config().connection.clone())?;
    let store = manager.connect().await?;

    let tracker = ProgressTracker::new(None, cli.progress_bar_enabled());
    let summary = ExportPipeline::new(store, options, tracker)
        .with_cancellation(cancel_token)
        .execute()
        .await?;

    info!(
        "Dumped {} records in {}",
        summary.records,
        format_elapsed(summary.elapsed)
    );
    Ok(if summary.cancelled {
        Outcome::Cancelled
    } else {
        Outcome::Completed
    })
}

/// Restore files into an index
async fn run_import(
    cli: &CliInterface,
    args: &ImportArgs,
    cancel_token: CancellationToken,
) -> Result<Outcome> {
    // Resolve the inputs before touching the store
    let files = expand_pattern(&args.files)?;
    let manager = ConnectionManager::new(&args.hosts, cli.config().connection.clone())?;
    let store = manager.connect().await?;

    let tracker = ProgressTracker::new(None, cli.progress_bar_enabled());
    let summary = ImportPipeline::new(
        store,
        args.index.clone(),
        files,
        cli.config().transfer.flush_threshold_bytes,
        tracker,
    )
    .with_cancellation(cancel_token)
    .execute()
    .await?;

    info!(
        "{} records processed in {}",
        summary.records,
        format_elapsed(summary.elapsed)
    );
    Ok(if summary.cancelled {
        Outcome::Cancelled
    } else {
        Outcome::Completed
    })
}

/// Cancel `token` on the first Ctrl+C
fn spawn_ctrl_c_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("Interrupted, finishing current page...");
                token.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    })
}

/// Render a duration as e.g. `1m12.5s`
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{:.3}s", secs)
    } else {
        let minutes = (secs / 60.0).floor();
        format!("{}m{:.3}s", minutes as u64, secs - minutes * 60.0)
    }
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with the merged logging configuration
fn initialize_logging(cli: &CliInterface) {
    let level: Level = cli.config().logging.level.to_tracing_level();

    // Build subscriber with level filter
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    // Configure timestamps
    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
