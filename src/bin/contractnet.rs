// bin/contractnet.rs - Contract Net Demo Runner

use actix::Addr;
use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use contract_net::actor::{worker, Announce, Coordinator, GetStatus, GetWorkerState, ListNegotiations, Worker};
use contract_net::bus::{LocalBus, SharedBus};
use contract_net::config::ContractNetConfig;
use contract_net::observability::{init_tracing, TracingConfig, TracingFormat};

/// Contract Net task allocation
#[derive(Parser, Debug)]
#[command(name = "contractnet")]
#[command(author = "SavageS")]
#[command(version)]
#[command(about = "Run a coordinator and machine workers negotiating jobs over a local bus", long_about = None)]
struct Args {
    /// Config file path (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (pretty, compact, json)
    #[arg(long, default_value = "pretty")]
    log_format: TracingFormat,

    /// Enable metrics server
    #[arg(long)]
    metrics: bool,

    /// Metrics listen address
    #[arg(long, default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Override the cost-to-seconds multiplier
    #[arg(long)]
    time_scale: Option<f64>,

    /// Override the bidding window in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,
}

#[actix_rt::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(TracingConfig::with_level(&args.log_level, args.log_format));

    #[cfg(feature = "prometheus")]
    let _metrics_handle = if args.metrics {
        let metrics_config = contract_net::observability::MetricsConfig {
            listen_addr: args.metrics_addr.parse()?,
        };
        match contract_net::observability::init_metrics(metrics_config) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to initialize metrics");
                None
            }
        }
    } else {
        None
    };
    #[cfg(not(feature = "prometheus"))]
    let _metrics_handle: Option<()> = {
        if args.metrics {
            warn!(addr = %args.metrics_addr, "Built without the prometheus feature; metrics server disabled");
        }
        None
    };

    let mut config = ContractNetConfig::load(args.config.as_deref())
        .context("loading configuration")?;
    if let Some(time_scale) = args.time_scale {
        config.time_scale = time_scale;
    }
    if let Some(window_ms) = args.window_ms {
        config.bidding_window_ms = window_ms;
    }
    config.validate()?;

    info!(
        machines = config.machines.len(),
        jobs = config.jobs.len(),
        window_ms = config.bidding_window_ms,
        time_scale = config.time_scale,
        "Starting Contract Net run"
    );

    let bus: SharedBus = Arc::new(LocalBus::new().spawn());

    let mut workers = Vec::with_capacity(config.machines.len());
    for machine in &config.machines {
        let policy = machine.policy.build(config.time_scale);
        let addr = worker::start(machine.worker_config(), policy, bus.clone())
            .with_context(|| format!("starting worker {}", machine.id))?;
        workers.push(addr);
    }

    let coordinator = Coordinator::launch(bus);

    tokio::select! {
        result = run(&config, &coordinator) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    summarize(&coordinator, &workers).await?;

    for addr in &workers {
        worker::stop(addr);
    }
    info!("Run finished");

    Ok(())
}

/// Announce every job in turn, then let awarded work finish
async fn run(config: &ContractNetConfig, coordinator: &Addr<Coordinator>) -> Result<()> {
    for task in config.tasks() {
        info!(task_id = %task.id, name = %task.name, "Issuing job");
        let negotiation_id = coordinator
            .send(Announce {
                task,
                window: config.bidding_window(),
            })
            .await??;

        tokio::time::sleep(config.bidding_window()).await;
        let status = coordinator
            .send(GetStatus {
                negotiation_id: negotiation_id.clone(),
            })
            .await?;
        info!(task_id = %negotiation_id, status = ?status, "Bidding closed");

        tokio::time::sleep(config.pause_between_jobs()).await;
    }

    info!(settle_ms = config.settle_ms, "Waiting for remaining jobs");
    tokio::time::sleep(config.settle()).await;
    Ok(())
}

async fn summarize(coordinator: &Addr<Coordinator>, workers: &[Addr<Worker>]) -> Result<()> {
    for negotiation in coordinator.send(ListNegotiations).await? {
        info!(
            task_id = %negotiation.task_id,
            name = %negotiation.task_name,
            status = %negotiation.status,
            winner = negotiation.winner_agent_id.as_deref().unwrap_or("-"),
            bidders = negotiation.bidders.len(),
            "Negotiation"
        );
    }

    let states = join_all(workers.iter().map(|w| w.send(GetWorkerState))).await;
    for state in states {
        let state = state?;
        info!(
            agent_id = %state.agent_id,
            bids_sent = state.bids_sent,
            tasks_completed = state.tasks_completed,
            executing = state.executing.as_deref().unwrap_or("-"),
            "Worker"
        );
    }
    Ok(())
}
