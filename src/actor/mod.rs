// actor/mod.rs - Actor Module

//! Contract Net participants as Actix actors.
//!
//! - `Coordinator` - Announces tasks, collects proposals and awards the winner
//! - `Worker` - Evaluates calls for proposals, bids and executes awarded tasks
//! - `EvaluationPolicy` - Pluggable bidding strategy for workers
//!
//! Both sides talk only through a [`Bus`](crate::bus::Bus).
//!
//! # Example
//!
//! ```ignore
//! use contract_net::actor::*;
//! use contract_net::bus::LocalBus;
//!
//! let bus: SharedBus = Arc::new(LocalBus::new().spawn());
//! let worker = worker::start(WorkerConfig::new("machine_1"), Box::new(AcceptAll::fixed(2.0)), bus.clone())?;
//! let coordinator = Coordinator::launch(bus);
//!
//! let id = coordinator.send(Announce {
//!     task: Task::new("job_1", "A"),
//!     window: Duration::from_secs(3),
//! }).await??;
//! ```

mod coordinator;
mod messages;
mod policy;
pub mod worker;

pub use coordinator::Coordinator;
pub use messages::*;
pub use policy::{AcceptAll, Bid, CapabilityTable, CostEstimator, EvaluationPolicy, PolicyConfig};
pub use worker::{Worker, WorkerConfig};
