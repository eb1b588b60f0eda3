// protocol/negotiation.rs - Negotiation Records and Winner Selection

use super::state_machine::{NegotiationStatus, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

/// Immutable description of a unit of work put out for bidding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,

    /// Workload-specific parameters, passed through untouched
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Bid from one worker for one task. Lower cost wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub task_id: String,
    pub agent_id: String,
    pub cost: f64,

    /// Milliseconds since the Unix epoch
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

impl Proposal {
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>, cost: f64) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            cost,
            timestamp: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Order proposals so the preferred one sorts first: lowest cost, then
/// lexicographically smallest agent id.
pub fn proposal_order(a: &Proposal, b: &Proposal) -> Ordering {
    a.cost
        .total_cmp(&b.cost)
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

/// Pick the winning proposal. Independent of iteration order.
pub fn select_winner<'a, I>(proposals: I) -> Option<&'a Proposal>
where
    I: IntoIterator<Item = &'a Proposal>,
{
    proposals.into_iter().min_by(|a, b| proposal_order(a, b))
}

/// Why a proposal did not make it into a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    WrongTask,
    NotOpen(NegotiationStatus),
    PastDeadline,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::WrongTask => "wrong_task",
            DropReason::NotOpen(_) => "not_open",
            DropReason::PastDeadline => "past_deadline",
        }
    }
}

/// Result of offering a proposal to a record
#[derive(Debug, Clone, PartialEq)]
pub enum OfferOutcome {
    Inserted,
    /// Same agent bid again; last write wins
    Replaced { previous_cost: f64 },
    Dropped(DropReason),
}

/// Result of closing the bidding window
#[derive(Debug, Clone, PartialEq)]
pub enum Closing {
    Expired,
    Awarded {
        winner: Proposal,
        /// Every other bidder, sorted by agent id
        losers: Vec<String>,
    },
}

/// Result of a completion notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    NotAwarded(NegotiationStatus),
    WrongAgent,
}

/// Coordinator-side state for one task.
#[derive(Debug, Clone)]
pub struct NegotiationRecord {
    task: Task,
    status: NegotiationStatus,

    /// agent_id -> latest proposal from that agent
    proposals: HashMap<String, Proposal>,

    deadline: Instant,

    /// Set exactly once, when the record is awarded
    winner: Option<Proposal>,
}

impl NegotiationRecord {
    pub fn new(task: Task, deadline: Instant) -> Self {
        Self {
            task,
            status: NegotiationStatus::Open,
            proposals: HashMap::new(),
            deadline,
            winner: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn status(&self) -> NegotiationStatus {
        self.status
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn winner(&self) -> Option<&Proposal> {
        self.winner.as_ref()
    }

    pub fn winner_agent_id(&self) -> Option<&str> {
        self.winner.as_ref().map(|p| p.agent_id.as_str())
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    pub fn proposal(&self, agent_id: &str) -> Option<&Proposal> {
        self.proposals.get(agent_id)
    }

    /// Bidder ids in sorted order
    pub fn bidders(&self) -> Vec<String> {
        let mut bidders: Vec<String> = self.proposals.keys().cloned().collect();
        bidders.sort();
        bidders
    }

    pub fn is_past_deadline(&self, now: Instant) -> bool {
        now > self.deadline
    }

    /// Accept a proposal while the record is open and the deadline has not
    /// passed. Anything else is dropped without touching the record.
    pub fn offer(&mut self, proposal: Proposal, now: Instant) -> OfferOutcome {
        if proposal.task_id != self.task.id {
            return OfferOutcome::Dropped(DropReason::WrongTask);
        }
        if self.status != NegotiationStatus::Open {
            return OfferOutcome::Dropped(DropReason::NotOpen(self.status));
        }
        if self.is_past_deadline(now) {
            return OfferOutcome::Dropped(DropReason::PastDeadline);
        }

        match self.proposals.insert(proposal.agent_id.clone(), proposal) {
            Some(previous) => OfferOutcome::Replaced {
                previous_cost: previous.cost,
            },
            None => OfferOutcome::Inserted,
        }
    }

    /// Close bidding: award the best proposal or expire with no bids.
    ///
    /// Fails if the record is no longer open, so a second call cannot award
    /// twice.
    pub fn close(&mut self) -> Result<Closing, ProtocolError> {
        let winner = select_winner(self.proposals.values()).cloned();

        let Some(winner) = winner else {
            self.status
                .validate_transition(NegotiationStatus::ExpiredNoBids)?;
            self.status = NegotiationStatus::ExpiredNoBids;
            return Ok(Closing::Expired);
        };

        self.status.validate_transition(NegotiationStatus::Awarded)?;

        let losers: Vec<String> = self
            .bidders()
            .into_iter()
            .filter(|id| *id != winner.agent_id)
            .collect();

        self.status = NegotiationStatus::Awarded;
        self.winner = Some(winner.clone());

        Ok(Closing::Awarded { winner, losers })
    }

    /// Apply a completion notice from `agent_id`.
    pub fn complete(&mut self, agent_id: &str) -> CompletionOutcome {
        if self.status != NegotiationStatus::Awarded {
            return CompletionOutcome::NotAwarded(self.status);
        }
        if self.winner_agent_id() != Some(agent_id) {
            return CompletionOutcome::WrongAgent;
        }

        self.status = NegotiationStatus::Done;
        CompletionOutcome::Completed
    }

    pub fn snapshot(&self) -> NegotiationSnapshot {
        NegotiationSnapshot {
            task_id: self.task.id.clone(),
            task_name: self.task.name.clone(),
            status: self.status,
            winner_agent_id: self.winner.as_ref().map(|p| p.agent_id.clone()),
            winning_cost: self.winner.as_ref().map(|p| p.cost),
            bidders: self.bidders(),
        }
    }
}

/// Read-only view of a negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSnapshot {
    pub task_id: String,
    pub task_name: String,
    pub status: NegotiationStatus,
    pub winner_agent_id: Option<String>,
    pub winning_cost: Option<f64>,
    pub bidders: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn bid(task: &str, agent: &str, cost: f64) -> Proposal {
        Proposal::new(task, agent, cost)
    }

    #[test]
    fn test_late_bid_scenario() {
        // 3s window; m1 at 1s, m2 at 2s, m3 at 4s
        let t0 = Instant::now();
        let mut record =
            NegotiationRecord::new(Task::new("job_1", "A"), t0 + Duration::from_secs(3));

        assert_eq!(
            record.offer(bid("job_1", "m1", 5.0), t0 + Duration::from_secs(1)),
            OfferOutcome::Inserted
        );
        assert_eq!(
            record.offer(bid("job_1", "m2", 3.0), t0 + Duration::from_secs(2)),
            OfferOutcome::Inserted
        );
        assert_eq!(
            record.offer(bid("job_1", "m3", 3.0), t0 + Duration::from_secs(4)),
            OfferOutcome::Dropped(DropReason::PastDeadline)
        );

        let closing = record.close().unwrap();
        assert_eq!(
            closing,
            Closing::Awarded {
                winner: record.proposal("m2").cloned().unwrap(),
                losers: vec!["m1".to_string()],
            }
        );
        assert_eq!(record.status(), NegotiationStatus::Awarded);
        assert_eq!(record.winner_agent_id(), Some("m2"));
    }

    #[test]
    fn test_bid_at_deadline_is_accepted() {
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_millis(100);
        let mut record = NegotiationRecord::new(Task::new("job_1", "A"), deadline);

        assert_eq!(
            record.offer(bid("job_1", "m1", 1.0), deadline),
            OfferOutcome::Inserted
        );
    }

    #[test]
    fn test_no_bids_expires() {
        let mut record = NegotiationRecord::new(Task::new("job_2", "B"), Instant::now());

        assert_eq!(record.close().unwrap(), Closing::Expired);
        assert_eq!(record.status(), NegotiationStatus::ExpiredNoBids);
        assert_eq!(record.winner_agent_id(), None);
    }

    #[test]
    fn test_close_runs_once() {
        let t0 = Instant::now();
        let mut record = NegotiationRecord::new(Task::new("job_1", "A"), t0);
        record.offer(bid("job_1", "m1", 2.0), t0);

        assert!(record.close().is_ok());
        assert!(matches!(
            record.close(),
            Err(ProtocolError::InvalidTransition { from: "AWARDED", .. })
        ));
        assert_eq!(record.winner_agent_id(), Some("m1"));
    }

    #[test]
    fn test_tie_break_on_agent_id() {
        let t0 = Instant::now();
        let mut record = NegotiationRecord::new(Task::new("job_3", "C"), t0);
        record.offer(bid("job_3", "b", 4.0), t0);
        record.offer(bid("job_3", "a", 4.0), t0);

        match record.close().unwrap() {
            Closing::Awarded { winner, losers } => {
                assert_eq!(winner.agent_id, "a");
                assert_eq!(losers, vec!["b".to_string()]);
            }
            other => panic!("expected award, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_proposal_overwrites() {
        let t0 = Instant::now();
        let mut record = NegotiationRecord::new(Task::new("job_1", "A"), t0);

        assert_eq!(record.offer(bid("job_1", "m1", 5.0), t0), OfferOutcome::Inserted);
        assert_eq!(
            record.offer(bid("job_1", "m1", 5.0), t0),
            OfferOutcome::Replaced { previous_cost: 5.0 }
        );
        assert_eq!(record.proposal_count(), 1);
    }

    #[test]
    fn test_offer_after_close_is_dropped() {
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_secs(10);
        let mut record = NegotiationRecord::new(Task::new("job_1", "A"), deadline);
        record.offer(bid("job_1", "m1", 5.0), t0);
        record.close().unwrap();

        assert_eq!(
            record.offer(bid("job_1", "m2", 0.5), t0),
            OfferOutcome::Dropped(DropReason::NotOpen(NegotiationStatus::Awarded))
        );
        assert_eq!(record.winner_agent_id(), Some("m1"));
    }

    #[test]
    fn test_offer_for_other_task_is_dropped() {
        let t0 = Instant::now();
        let mut record = NegotiationRecord::new(Task::new("job_1", "A"), t0);

        assert_eq!(
            record.offer(bid("job_9", "m1", 1.0), t0),
            OfferOutcome::Dropped(DropReason::WrongTask)
        );
    }

    #[test]
    fn test_completion_guards() {
        let t0 = Instant::now();
        let mut record = NegotiationRecord::new(Task::new("job_1", "A"), t0);
        assert_eq!(
            record.complete("m1"),
            CompletionOutcome::NotAwarded(NegotiationStatus::Open)
        );

        record.offer(bid("job_1", "m1", 1.0), t0);
        record.offer(bid("job_1", "m2", 2.0), t0);
        record.close().unwrap();

        assert_eq!(record.complete("m2"), CompletionOutcome::WrongAgent);
        assert_eq!(record.status(), NegotiationStatus::Awarded);
        assert_eq!(record.complete("m1"), CompletionOutcome::Completed);
        assert_eq!(record.status(), NegotiationStatus::Done);
        assert_eq!(
            record.complete("m1"),
            CompletionOutcome::NotAwarded(NegotiationStatus::Done)
        );
        assert_eq!(record.winner_agent_id(), Some("m1"));
    }

    #[test]
    fn test_task_parameters_flatten() {
        let task = Task::new("job_1", "A").with_parameter("priority", 3);
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["id"], "job_1");
        assert_eq!(json["priority"], 3);

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    fn proposals_strategy() -> impl Strategy<Value = Vec<(String, u8)>> {
        prop::collection::vec(("[a-e]{1,2}", 0u8..6), 1..12)
    }

    proptest! {
        #[test]
        fn prop_winner_has_minimum_cost_and_smallest_id(entries in proposals_strategy()) {
            let t0 = Instant::now();
            let mut record = NegotiationRecord::new(Task::new("job", "X"), t0);
            for (agent, cost) in &entries {
                record.offer(bid("job", agent, f64::from(*cost)), t0);
            }

            let min_cost = record
                .bidders()
                .iter()
                .filter_map(|id| record.proposal(id))
                .map(|p| p.cost)
                .fold(f64::INFINITY, f64::min);
            let expected = record
                .bidders()
                .into_iter()
                .find(|id| record.proposal(id).map(|p| p.cost) == Some(min_cost));

            match record.close().unwrap() {
                Closing::Awarded { winner, losers } => {
                    prop_assert_eq!(Some(winner.agent_id.clone()), expected);
                    prop_assert_eq!(losers.len() + 1, record.proposal_count());
                    prop_assert!(!losers.contains(&winner.agent_id));
                }
                Closing::Expired => prop_assert!(false, "bids were offered"),
            }
        }

        #[test]
        fn prop_selection_ignores_arrival_order(entries in proposals_strategy()) {
            let forward: Vec<Proposal> = entries
                .iter()
                .map(|(agent, cost)| bid("job", agent, f64::from(*cost)))
                .collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let a = select_winner(&forward).map(|p| (p.agent_id.clone(), p.cost));
            let b = select_winner(&reversed).map(|p| (p.agent_id.clone(), p.cost));
            prop_assert_eq!(a, b);
        }
    }
}
