// lib.rs - Contract Net Task Allocation
//
// Coordinator and worker agents negotiating task assignments over a
// topic-based publish/subscribe bus.

//! Decentralized task allocation with the Contract Net protocol.
//!
//! A [`Coordinator`](actor::Coordinator) announces a task on
//! `contractnet/cfp`, collects proposals until the bidding window closes,
//! awards the lowest-cost bidder and rejects the rest. A
//! [`Worker`](actor::Worker) evaluates each call with its
//! [`EvaluationPolicy`](actor::EvaluationPolicy), bids, executes awarded
//! tasks and reports completion on `contractnet/done`.
//!
//! Delivery is assumed at-least-once and unordered; every handler is
//! idempotent.

pub mod actor;
pub mod bus;
pub mod config;
pub mod observability;
pub mod protocol;

// Re-export commonly used types
pub use actor::{
    Announce, ContractNetError, Coordinator, EvaluationPolicy, GetNegotiation, GetStatus,
    GetWorkerState, ListNegotiations, PolicyConfig, StopWorker, Worker, WorkerConfig, WorkerState,
};

pub use bus::{Bus, BusMessage, LocalBus, LocalBusHandle, SharedBus, SubscriptionId};

pub use config::{ConfigError, ContractNetConfig, JobConfig, MachineConfig};

pub use protocol::{
    NegotiationSnapshot, NegotiationStatus, Proposal, ProtocolError, StatusReport, Task,
};

#[cfg(feature = "prometheus")]
pub use observability::{init_metrics, MetricsHandle};
pub use observability::{init_tracing, MetricsConfig, TracingConfig, TracingFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actor::{
        worker, AcceptAll, Announce, CapabilityTable, ContractNetError, Coordinator,
        EvaluationPolicy, GetNegotiation, GetStatus, GetWorkerState, ListNegotiations, StopWorker,
        Worker, WorkerConfig,
    };
    pub use crate::bus::{Bus, BusMessage, LocalBus, SharedBus};
    pub use crate::protocol::{NegotiationStatus, Proposal, StatusReport, Task};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
