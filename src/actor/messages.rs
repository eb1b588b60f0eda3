// actor/messages.rs - Inter-actor message types

use actix::prelude::*;
use std::time::Duration;

use crate::protocol::{NegotiationSnapshot, ProtocolError, StatusReport, Task};

// =============================================================================
// Coordinator Messages
// =============================================================================

/// Put a task out for bidding. Resolves to the negotiation id.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<String, ContractNetError>")]
pub struct Announce {
    pub task: Task,
    pub window: Duration,
}

/// Query the status of a negotiation
#[derive(Message, Debug, Clone)]
#[rtype(result = "StatusReport")]
pub struct GetStatus {
    pub negotiation_id: String,
}

/// Read-only view of a negotiation, live or archived
#[derive(Message, Debug, Clone)]
#[rtype(result = "Option<NegotiationSnapshot>")]
pub struct GetNegotiation {
    pub negotiation_id: String,
}

/// All negotiations the coordinator knows about, sorted by task id
#[derive(Message, Debug, Clone)]
#[rtype(result = "Vec<NegotiationSnapshot>")]
pub struct ListNegotiations;

// =============================================================================
// Worker Messages
// =============================================================================

/// Unsubscribe from the bus and stop the worker
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct StopWorker;

/// Snapshot of a worker's local bookkeeping
#[derive(Message, Debug, Clone)]
#[rtype(result = "WorkerState")]
pub struct GetWorkerState;

#[derive(Debug, Clone, PartialEq, Eq, MessageResponse)]
pub struct WorkerState {
    pub agent_id: String,
    pub executing: Option<String>,
    pub queued: Vec<String>,
    /// Tasks bid on and not yet settled, sorted
    pub pending_bids: Vec<String>,
    pub bids_sent: u64,
    pub tasks_completed: u64,
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Errors surfaced synchronously to callers of `announce` and `start`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractNetError {
    #[error("Negotiation already in progress for task {0}")]
    DuplicateTask(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid agent id: {0}")]
    InvalidAgentId(String),

    #[error("Invalid evaluation policy: {0}")]
    InvalidPolicy(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Mailbox error: {0}")]
    Mailbox(String),
}

impl From<MailboxError> for ContractNetError {
    fn from(e: MailboxError) -> Self {
        ContractNetError::Mailbox(e.to_string())
    }
}
