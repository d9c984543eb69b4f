use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use cri_proxy::{ApiName, Behavior, Code, ControlClient, InjectionPlan, Injector, Status};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Install or clear injected faults on a running CRI proxy
#[derive(Debug, Parser)]
#[command(name = "criproxyctl")]
struct Cli {
    /// Control socket of the proxy
    #[arg(long, env = "CRI_PROXY_SOCKET", default_value = "/var/run/cri-proxy/control.sock")]
    socket: PathBuf,

    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print the installed plan as JSON
    Show,
    /// Remove every injected behavior
    Reset,
    /// Make every call to API fail
    Fail {
        api: ApiName,
        message: String,
        #[arg(long, default_value = "Unknown")]
        code: Code,
    },
    /// Delay every call to API before forwarding it
    Delay { api: ApiName, millis: u64 },
    /// Install a plan read from a JSON file
    Install { plan: PathBuf },
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = ControlClient::new(cli.socket.clone());
    match cli.cmd {
        Cmd::Show => {
            let plan = client.show().await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Cmd::Reset => client.reset().await?,
        Cmd::Fail { api, message, code } => {
            let plan = InjectionPlan::new().with(api, Behavior::Fail(Status::new(code, message)));
            client.install(plan).await?;
        }
        Cmd::Delay { api, millis } => {
            let plan = InjectionPlan::new().delay(api, Duration::from_millis(millis));
            client.install(plan).await?;
        }
        Cmd::Install { plan } => {
            let raw = std::fs::read_to_string(&plan)
                .with_context(|| format!("Failed to read plan file: {}", plan.display()))?;
            let parsed: InjectionPlan = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse plan file: {}", plan.display()))?;
            client.install(parsed).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let unavailable = e
                .downcast_ref::<cri_proxy::Error>()
                .is_some_and(cri_proxy::Error::is_unavailable);
            tracing::error!("criproxyctl failed: {e:#}");
            if unavailable {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
