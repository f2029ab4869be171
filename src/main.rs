mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use podalert_k8s::KubeCluster;
use podalert_logs::AlertBuilder;
use podalert_notify::{DiscordSink, NotificationSink, TracingSink};
use podalert_watch::{ChangeDetector, Watcher};

use crate::config::Config;

/// podalert - Watches the pods of a Kubernetes namespace and alerts on
/// phase changes and error logs
#[derive(Parser, Debug)]
#[command(name = "podalert")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./podalert.toml if present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Namespace to watch, overrides the config file
    #[arg(short, long)]
    namespace: Option<String>,

    /// Log alerts instead of sending them to Discord
    #[arg(long)]
    dry_run: bool,

    /// Output format for podalert's own logs
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format, args.verbose);

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(namespace) = args.namespace {
        config.k8s.namespace = namespace;
    }
    config.validate(args.dry_run)?;

    let cluster = KubeCluster::connect(&config.k8s.namespace, &config.client_options())
        .await
        .context("failed to connect to Kubernetes")?;

    let sink: Arc<dyn NotificationSink> = if args.dry_run {
        info!("Dry run, alerts are only logged");
        Arc::new(TracingSink)
    } else {
        let discord = DiscordSink::connect(&config.discord.webhook)
            .await
            .context("failed to initialize Discord webhook")?;
        Arc::new(discord)
    };

    let detector = Arc::new(ChangeDetector::new(config.alerts.important_phases.clone()));
    let policy = config.alerts.report_policy()?;
    if policy.is_empty() {
        warn!("alerts.report_levels is empty, log lines will never raise alerts");
    }
    let builder = AlertBuilder::new(policy);

    let watcher = Watcher::new(
        Arc::new(cluster),
        sink,
        detector,
        builder,
        config.watch_config(),
    );
    let stop = watcher.stop_token();

    info!(namespace = %config.k8s.namespace, "Starting podalert");
    let handle = tokio::spawn(async move { watcher.run().await });

    shutdown_signal().await;
    info!("Shutting down");
    stop.cancel();

    handle
        .await
        .context("watcher task failed")?
        .context("watcher stopped with an error")?;

    info!("Stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
