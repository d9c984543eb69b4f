use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pull_timeline::{
    backoff_durations, check_backoff_growth, failed_pull_message, pull_duration, BackoffPolicy,
    Error, EventSource, KubeEventSource, LifecycleEvent,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Report how long a pod's image pull took and how its retries backed off
#[derive(Debug, Parser)]
#[command(name = "pull-timeline")]
struct Cli {
    #[arg(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Pod whose events are examined
    #[arg(long)]
    pod: String,

    /// Read events from a JSON array of lifecycle events instead of the cluster
    #[arg(long)]
    events: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

fn init_tracing(level: LogLevel) {
    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .try_init();
}

async fn load(cli: &Cli) -> anyhow::Result<Vec<LifecycleEvent>> {
    match &cli.events {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read events file: {}", path.display()))?;
            let events: Vec<LifecycleEvent> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse events file: {}", path.display()))?;
            Ok(events)
        }
        None => {
            let source = KubeEventSource::try_default().await?;
            Ok(source.list(&cli.namespace).await?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let events = load(&cli).await?;
    debug!("loaded {} events", events.len());
    let pod = cli.pod.as_str();

    match pull_duration(&events, pod) {
        Ok(d) => println!("pull duration: {:.3}s", d.as_secs_f64()),
        Err(e @ Error::IncompleteTimeline { .. }) => println!("pull duration: unknown ({e})"),
        Err(e) => return Err(e.into()),
    }

    if let Ok(msg) = failed_pull_message(&events, pod) {
        println!("first failure: {msg}");
    }

    let backoffs = backoff_durations(&events, pod)?;
    if backoffs.is_empty() {
        println!("backoffs: none");
        return Ok(());
    }
    let listed: Vec<String> = backoffs
        .iter()
        .map(|d| format!("{:.1}s", d.as_secs_f64()))
        .collect();
    println!("backoffs: [{}]", listed.join(", "));

    match check_backoff_growth(&backoffs, &BackoffPolicy::default()) {
        Ok(()) => println!("growth: matches kubelet backoff"),
        Err(e) => {
            info!("backoff sequence deviates from the kubelet schedule");
            println!("growth: {e}");
        }
    }
    Ok(())
}
