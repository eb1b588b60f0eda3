// observability/metrics.rs - Protocol Metrics

use metrics::{counter, gauge};
#[cfg(feature = "prometheus")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Configuration for metrics
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to expose metrics endpoint
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

/// Coordinator-side metrics
pub struct NegotiationMetrics;

impl NegotiationMetrics {
    pub const CFP_TOTAL: &'static str = "contractnet_cfp_total";
    pub const PROPOSALS_TOTAL: &'static str = "contractnet_proposals_total";
    pub const AWARDS_TOTAL: &'static str = "contractnet_awards_total";
    pub const EXPIRED_TOTAL: &'static str = "contractnet_expired_total";
    pub const COMPLETIONS_TOTAL: &'static str = "contractnet_completions_total";
    pub const OPEN: &'static str = "contractnet_negotiations_open";
}

/// Worker-side metrics
pub struct WorkerMetrics;

impl WorkerMetrics {
    pub const BIDS_TOTAL: &'static str = "contractnet_bids_total";
    pub const DECLINED_TOTAL: &'static str = "contractnet_declined_total";
    pub const TASKS_EXECUTED_TOTAL: &'static str = "contractnet_tasks_executed_total";
}

/// Bus boundary metrics
pub struct SchemaMetrics;

impl SchemaMetrics {
    pub const VIOLATIONS_TOTAL: &'static str = "contractnet_schema_violations_total";
}

/// Handle to the Prometheus metrics exporter
#[cfg(feature = "prometheus")]
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

#[cfg(feature = "prometheus")]
impl MetricsHandle {
    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the Prometheus recorder and serve `/metrics` and `/health`.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: MetricsConfig) -> Result<MetricsHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let metrics_handle = MetricsHandle {
        handle: handle.clone(),
    };

    let listen_addr = config.listen_addr;
    let shared_handle = std::sync::Arc::new(handle);

    tokio::spawn(async move {
        use axum::{http::StatusCode, routing::get, Router};

        let handle_for_route = shared_handle.clone();
        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let h = handle_for_route.clone();
                    async move { h.render() }
                }),
            )
            .route("/health", get(|| async { StatusCode::OK }));

        match tokio::net::TcpListener::bind(listen_addr).await {
            Ok(listener) => {
                tracing::info!(addr = %listen_addr, "Metrics HTTP server started");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, addr = %listen_addr, "Failed to bind metrics server");
            }
        }
    });

    describe_counter!(NegotiationMetrics::CFP_TOTAL, "Calls for proposals published");
    describe_counter!(
        NegotiationMetrics::PROPOSALS_TOTAL,
        "Proposals received, by outcome"
    );
    describe_counter!(NegotiationMetrics::AWARDS_TOTAL, "Negotiations awarded");
    describe_counter!(
        NegotiationMetrics::EXPIRED_TOTAL,
        "Negotiations expired without bids"
    );
    describe_counter!(
        NegotiationMetrics::COMPLETIONS_TOTAL,
        "Negotiations completed by their winner"
    );
    describe_gauge!(NegotiationMetrics::OPEN, "Negotiations accepting bids");
    describe_counter!(WorkerMetrics::BIDS_TOTAL, "Proposals sent by workers");
    describe_counter!(WorkerMetrics::DECLINED_TOTAL, "Calls for proposals declined");
    describe_counter!(
        WorkerMetrics::TASKS_EXECUTED_TOTAL,
        "Tasks executed by workers"
    );
    describe_counter!(
        SchemaMetrics::VIOLATIONS_TOTAL,
        "Bus payloads dropped at validation"
    );

    tracing::info!(addr = %config.listen_addr, "Metrics initialized");

    Ok(metrics_handle)
}

// Recording functions

/// Record a call for proposals going out
pub fn record_cfp_announced() {
    counter!(NegotiationMetrics::CFP_TOTAL).increment(1);
    gauge!(NegotiationMetrics::OPEN).increment(1.0);
}

/// Record a proposal and what happened to it (`accepted`, `replaced`, or a drop reason)
pub fn record_proposal(outcome: &'static str) {
    counter!(NegotiationMetrics::PROPOSALS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a bidding window closing with a winner
pub fn record_award() {
    counter!(NegotiationMetrics::AWARDS_TOTAL).increment(1);
    gauge!(NegotiationMetrics::OPEN).decrement(1.0);
}

/// Record a bidding window closing without bids
pub fn record_expired() {
    counter!(NegotiationMetrics::EXPIRED_TOTAL).increment(1);
    gauge!(NegotiationMetrics::OPEN).decrement(1.0);
}

pub fn record_completion() {
    counter!(NegotiationMetrics::COMPLETIONS_TOTAL).increment(1);
}

pub fn record_bid(agent_id: &str) {
    counter!(WorkerMetrics::BIDS_TOTAL, "agent_id" => agent_id.to_string()).increment(1);
}

pub fn record_declined(agent_id: &str) {
    counter!(WorkerMetrics::DECLINED_TOTAL, "agent_id" => agent_id.to_string()).increment(1);
}

pub fn record_task_executed(agent_id: &str) {
    counter!(
        WorkerMetrics::TASKS_EXECUTED_TOTAL,
        "agent_id" => agent_id.to_string()
    )
    .increment(1);
}

/// Record a payload dropped at the bus boundary
pub fn record_schema_violation(topic: &str) {
    counter!(SchemaMetrics::VIOLATIONS_TOTAL, "topic" => topic.to_string()).increment(1);
}
