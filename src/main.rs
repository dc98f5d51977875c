use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subreddit_harvester::config::Config;
use subreddit_harvester::harvest::{HarvestOutcome, Harvester};

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Tracing needs the output directory, so configuration errors go to stderr
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Until the subscriber is installed, fatal errors go straight to stderr
    if let Err(e) = prepare_output(&config).and_then(init_tracing) {
        eprintln!("Fatal error: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

/// Create the output directory and open the per-run log file, if any.
fn prepare_output(config: &Config) -> Result<Option<File>> {
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    config
        .log_file
        .as_deref()
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))
        })
        .transpose()
}

async fn run(config: Config) -> Result<()> {
    info!(
        source = %config.source_name,
        start_year = config.start_year,
        mode = ?config.mode,
        expand_more = config.expand_more,
        output_dir = %config.output_dir.display(),
        "Starting subreddit-harvester"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing at the next request boundary");
        signal_cancel.cancel();
    });

    let harvester = Harvester::new(config, cancel);
    match harvester.run().await? {
        HarvestOutcome::NoPosts => {
            println!("No posts found. Exiting.");
        }
        HarvestOutcome::Archived(report) => {
            info!(
                posts = report.posts,
                posts_with_comments = report.posts_with_comments,
                stop_reason = %report.stop_reason,
                chunks = report.manifest.chunks.len(),
                "Harvest complete"
            );
            println!("Done! Data saved to {}", report.manifest_path.display());
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<File>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,subreddit_harvester=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    let json_layer = use_json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!use_json).then(|| fmt::layer().with_writer(std::io::stderr));

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
