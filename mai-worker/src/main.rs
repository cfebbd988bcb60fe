//! mai-worker - Document processing worker
//!
//! Drains the file-based job queue under the root folder and runs every job
//! through the OCR → NER → suggestion → citation pipeline.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mai_common::config::LoggingConfig;
use mai_worker::config::{WorkerConfig, WorkerToml};
use mai_worker::queue::JobQueue;
use mai_worker::Worker;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for mai-worker
#[derive(Parser, Debug)]
#[command(name = "mai-worker")]
#[command(about = "Document processing worker for the Memories AI Ingestor")]
#[command(version)]
struct Args {
    /// Root folder holding queue/ and uploads/
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/mai/worker.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Drain the queue until interrupted (default)
    Run,
    /// Run a single cycle and print its outcome
    Once,
    /// Print the state of a job by queue entry name
    Status { name: String },
    /// List jobs left in processing by an interrupted run
    Stuck,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts; problems are reported right after
    let loaded = WorkerToml::load(args.config.as_deref());
    let toml = loaded.as_ref().cloned().unwrap_or_default();
    init_tracing(&toml.logging);
    if let Err(e) = &loaded {
        warn!("{} (using compiled defaults)", e);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting mai-worker"
    );

    let config = WorkerConfig::resolve(args.root_folder, &toml);
    config
        .ensure_root_folder()
        .context("Failed to initialize root folder")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Once => {
            let worker = Worker::from_config(&config)?;
            let outcome = tokio::task::spawn_blocking(move || worker.step_once())
                .await
                .context("Worker cycle panicked")??;
            println!("{}", outcome);
            Ok(())
        }
        Command::Status { name } => {
            let queue = JobQueue::open(config.queue).context("Failed to open job queue")?;
            match queue.status(&name) {
                Some(state) => {
                    println!("{}: {}", name, state);
                    if let Some(record) = queue.read_record(&name)? {
                        if !record.is_success() {
                            println!("error: {}", record.error.unwrap_or_default());
                        }
                    }
                }
                None => println!("{}: not found", name),
            }
            Ok(())
        }
        Command::Stuck => {
            let queue = JobQueue::open(config.queue).context("Failed to open job queue")?;
            let stuck = queue.stuck()?;
            if stuck.is_empty() {
                println!("no stuck jobs");
            }
            for entry in stuck {
                println!("{}", entry.path.display());
            }
            Ok(())
        }
    }
}

async fn run(config: WorkerConfig) -> Result<()> {
    let worker = Arc::new(Worker::from_config(&config)?);
    let cancel_token = CancellationToken::new();

    let handle = tokio::spawn(Arc::clone(&worker).run(cancel_token.clone()));

    shutdown_signal().await;
    cancel_token.cancel();

    handle.await.context("Worker task failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the `[logging] level` config value. With a log file
/// configured, output is appended there instead of stdout.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file = logging.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Cannot open log file {}: {} (logging to stdout)", path.display(), e);
                None
            }
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match file {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init(),
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
