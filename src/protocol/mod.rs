// protocol/mod.rs - Contract Net Protocol Core

//! Contract Net Protocol core, independent of any runtime.
//!
//! - [`NegotiationRecord`] - per-task state owned by the coordinator
//! - [`NegotiationStatus`] - the per-task state machine
//! - [`InboundMessage`] - validated, topic-discriminated bus payloads
//!
//! # Example
//!
//! ```
//! use contract_net::protocol::*;
//! use std::time::{Duration, Instant};
//!
//! let now = Instant::now();
//! let mut record = NegotiationRecord::new(Task::new("job_3", "C"), now + Duration::from_secs(1));
//! record.offer(Proposal::new("job_3", "b", 4.0), now);
//! record.offer(Proposal::new("job_3", "a", 4.0), now);
//!
//! match record.close().unwrap() {
//!     Closing::Awarded { winner, losers } => {
//!         assert_eq!(winner.agent_id, "a");
//!         assert_eq!(losers, vec!["b".to_string()]);
//!     }
//!     Closing::Expired => unreachable!(),
//! }
//! ```

mod negotiation;
mod schema;
mod state_machine;

pub use negotiation::{
    proposal_order, select_winner, Closing, CompletionOutcome, DropReason, NegotiationRecord,
    NegotiationSnapshot, OfferOutcome, Proposal, Task,
};
pub use schema::{
    accept_topic, award_payload, cfp_payload, completion_payload, proposal_payload, reject_topic,
    validate_agent_id, Award, CallForProposals, Completion, InboundMessage, ALL_TOPICS, CFP_TOPIC,
    DONE_TOPIC, PROPOSAL_TOPIC, TOPIC_ROOT,
};
pub use state_machine::{NegotiationStatus, ProtocolError, StatusReport};
