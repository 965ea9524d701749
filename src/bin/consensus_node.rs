use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use consensus_testbed::network::{serve_status, Advertiser, AdvertiserConfig, HttpStatusFetcher, ProcessAdvertiser};
use consensus_testbed::node::{open_port, spawn_reader, NodeContext, NodeLifecycle, SerialSession};
use consensus_testbed::{NodeRole, ParameterUpdate, RuntimeConfig, Telemetry};

/// Time left to the telemetry printer after shutdown
const PRINTER_DRAIN: Duration = Duration::from_secs(1);

/// Runs one testbed node
///
/// Parameter updates are read as JSON, one per line, from stdin. Telemetry
/// is written as JSON lines to stdout. Logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "consensus-node", version)]
struct Args {
    /// Runtime configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the role from the configuration file
    #[arg(short, long, value_enum)]
    role: Option<RoleArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Ble,
    Wifi,
    Bridge,
}

impl From<RoleArg> for NodeRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Ble => NodeRole::Ble,
            RoleArg::Wifi => NodeRole::Wifi,
            RoleArg::Bridge => NodeRole::Bridge,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut runtime = match &args.config {
        Some(path) => RuntimeConfig::load(path).with_context(|| format!("load {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(role) = args.role {
        runtime.role = role.into();
    }
    info!(role = %runtime.role, version = consensus_testbed::VERSION, "starting node");

    let (telemetry, samples) = mpsc::channel(runtime.telemetry_capacity.max(1));
    let printer = tokio::spawn(print_telemetry(samples));

    let context = build_context(&runtime, telemetry)?;
    let mut lifecycle = NodeLifecycle::new(context);

    let server = if runtime.role.runs_local_engine() {
        let addr = runtime.status_bind_addr();
        let path = runtime.status_path.clone();
        let status = lifecycle.status_handle();
        let shutdown = lifecycle.cancel_token();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_status(addr, &path, status, shutdown).await {
                error!(error = %e, "status endpoint failed");
            }
        }))
    } else {
        None
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line.context("read parameter update")? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                let update = match ParameterUpdate::from_json(&line) {
                    Ok(update) => update,
                    Err(e) => {
                        warn!(error = %e, "malformed parameter update");
                        continue;
                    }
                };
                match lifecycle.apply(&update).await {
                    Ok(state) => info!(node = %update.node, ?state, "parameter update applied"),
                    Err(e) => error!(node = %update.node, error = %e, "parameter update failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    lifecycle.shutdown().await;
    if let Some(server) = server {
        if let Err(e) = server.await {
            warn!(error = %e, "status endpoint task panicked");
        }
    }
    // The serial reader keeps its sender until the port closes
    drop(lifecycle);
    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        warn!("telemetry output did not drain");
    }
    info!("node stopped");
    Ok(())
}

fn build_context(runtime: &RuntimeConfig, telemetry: mpsc::Sender<Telemetry>) -> Result<NodeContext> {
    let fetcher = Arc::new(HttpStatusFetcher::from_runtime(runtime)?);

    let advertiser: Option<Arc<dyn Advertiser>> = match runtime.role {
        NodeRole::Bridge => Some(Arc::new(ProcessAdvertiser::new(AdvertiserConfig::from_runtime(runtime)))),
        _ => None,
    };

    let serial = match runtime.role {
        NodeRole::Ble => {
            let (writer, reader) = open_port(runtime)?;
            spawn_reader(reader, telemetry.clone());
            Some(SerialSession::from_runtime(writer, runtime))
        }
        _ => None,
    };

    Ok(NodeContext {
        runtime: runtime.clone(),
        fetcher,
        // No radio scanner ships with the binary; radio neighbors of a
        // bridge stay disabled until one is provided
        scanner: None,
        advertiser,
        serial,
        telemetry,
    })
}

async fn print_telemetry(mut samples: mpsc::Receiver<Telemetry>) {
    let mut stdout = tokio::io::stdout();
    while let Some(sample) = samples.recv().await {
        let mut line = match serde_json::to_vec(&sample) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode telemetry");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            warn!(error = %e, "telemetry output closed");
            return;
        }
    }
}
