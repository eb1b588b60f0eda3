// actor/coordinator.rs - Contract Net Coordinator

use actix::prelude::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::actor::messages::*;
use crate::bus::{BusMessage, SharedBus, SubscriptionId};
use crate::observability::{
    record_award, record_cfp_announced, record_completion, record_expired, record_proposal,
    record_schema_violation,
};
use crate::protocol::{
    accept_topic, award_payload, cfp_payload, reject_topic, CallForProposals, Closing,
    Completion, CompletionOutcome, InboundMessage, NegotiationRecord, NegotiationSnapshot,
    OfferOutcome, Proposal, StatusReport, Task, CFP_TOPIC, DONE_TOPIC, PROPOSAL_TOPIC,
};

/// Supervisor side of the Contract Net: announces tasks, collects bids
/// until each deadline, awards the cheapest bid and waits for completion.
///
/// Every record is mutated only from this actor's mailbox, including the
/// deadline step, so each record has a single writer.
pub struct Coordinator {
    bus: SharedBus,

    /// Negotiations that are open or awarded
    records: HashMap<String, NegotiationRecord>,

    /// Final view of finished negotiations (done or expired). Grows with
    /// every distinct task id and is never pruned.
    archive: HashMap<String, NegotiationSnapshot>,

    subscriptions: Vec<SubscriptionId>,
}

impl Coordinator {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            bus,
            records: HashMap::new(),
            archive: HashMap::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Start the coordinator, subscribed before any message can be published.
    pub fn launch(bus: SharedBus) -> Addr<Self> {
        Coordinator::create(move |ctx| {
            let mut coordinator = Coordinator::new(bus);
            coordinator.subscribe(ctx.address().recipient());
            coordinator
        })
    }

    fn subscribe(&mut self, recipient: Recipient<BusMessage>) {
        for topic in [PROPOSAL_TOPIC, DONE_TOPIC] {
            self.subscriptions
                .push(self.bus.subscribe(topic, recipient.clone()));
        }
    }

    /// Create the record and publish the call for proposals.
    ///
    /// Scheduling the deadline step is left to the caller.
    pub fn open_negotiation(
        &mut self,
        task: Task,
        window: Duration,
        now: Instant,
    ) -> Result<String, ContractNetError> {
        if task.id.is_empty() {
            return Err(ContractNetError::InvalidTask("task id is empty".into()));
        }
        if self.records.contains_key(&task.id) {
            return Err(ContractNetError::DuplicateTask(task.id));
        }

        let task_id = task.id.clone();
        let cfp = CallForProposals::new(task.clone());

        self.archive.remove(&task_id);
        self.records
            .insert(task_id.clone(), NegotiationRecord::new(task, now + window));

        self.bus.publish(CFP_TOPIC, cfp_payload(&cfp));
        record_cfp_announced();
        info!(task_id = %task_id, name = %cfp.job.name, window_ms = window.as_millis() as u64, "Call for proposals published");

        Ok(task_id)
    }

    pub fn on_proposal(&mut self, proposal: Proposal, now: Instant) {
        let Some(record) = self.records.get_mut(&proposal.task_id) else {
            record_proposal("unknown_task");
            debug!(task_id = %proposal.task_id, agent_id = %proposal.agent_id, "Proposal for unknown task dropped");
            return;
        };

        let task_id = proposal.task_id.clone();
        let agent_id = proposal.agent_id.clone();
        let cost = proposal.cost;

        match record.offer(proposal, now) {
            OfferOutcome::Inserted => {
                record_proposal("accepted");
                debug!(task_id = %task_id, agent_id = %agent_id, cost, "Proposal recorded");
            }
            OfferOutcome::Replaced { previous_cost } => {
                record_proposal("replaced");
                debug!(task_id = %task_id, agent_id = %agent_id, cost, previous_cost, "Proposal replaced");
            }
            OfferOutcome::Dropped(reason) => {
                record_proposal(reason.as_str());
                info!(task_id = %task_id, agent_id = %agent_id, cost, reason = reason.as_str(), "Proposal dropped");
            }
        }
    }

    /// Deadline step: award or expire. A record that is no longer open is
    /// left alone.
    pub fn close_bidding(&mut self, task_id: &str) {
        let Some(record) = self.records.get_mut(task_id) else {
            return;
        };

        let closing = match record.close() {
            Ok(closing) => closing,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Deadline step skipped");
                return;
            }
        };

        match closing {
            Closing::Expired => {
                record_expired();
                info!(task_id = %task_id, "No proposals before deadline");
                self.archive_record(task_id);
            }
            Closing::Awarded { winner, losers } => {
                record_award();
                info!(
                    task_id = %task_id,
                    winner = %winner.agent_id,
                    cost = winner.cost,
                    rejected = losers.len(),
                    "Proposal accepted"
                );

                self.bus
                    .publish(&accept_topic(&winner.agent_id), award_payload(task_id));
                for loser in &losers {
                    self.bus.publish(&reject_topic(loser), award_payload(task_id));
                }
            }
        }
    }

    pub fn on_completion(&mut self, completion: Completion) {
        let Some(record) = self.records.get_mut(&completion.task_id) else {
            debug!(task_id = %completion.task_id, agent_id = %completion.agent_id, "Completion for unknown or finished task dropped");
            return;
        };

        match record.complete(&completion.agent_id) {
            CompletionOutcome::Completed => {
                record_completion();
                info!(task_id = %completion.task_id, agent_id = %completion.agent_id, "Task completed");
                self.archive_record(&completion.task_id);
            }
            CompletionOutcome::WrongAgent => {
                warn!(
                    task_id = %completion.task_id,
                    agent_id = %completion.agent_id,
                    winner = ?record.winner_agent_id(),
                    "Completion from non-winner dropped"
                );
            }
            CompletionOutcome::NotAwarded(status) => {
                debug!(task_id = %completion.task_id, status = %status, "Completion before award dropped");
            }
        }
    }

    fn archive_record(&mut self, task_id: &str) {
        if let Some(record) = self.records.remove(task_id) {
            self.archive.insert(task_id.to_string(), record.snapshot());
        }
    }

    pub fn status(&self, negotiation_id: &str) -> StatusReport {
        let status = self
            .records
            .get(negotiation_id)
            .map(|r| r.status())
            .or_else(|| self.archive.get(negotiation_id).map(|s| s.status));
        StatusReport::from(status)
    }

    pub fn negotiation(&self, negotiation_id: &str) -> Option<NegotiationSnapshot> {
        self.records
            .get(negotiation_id)
            .map(|r| r.snapshot())
            .or_else(|| self.archive.get(negotiation_id).cloned())
    }

    fn handle_bus_message(&mut self, msg: BusMessage) {
        let parsed = match InboundMessage::parse(&msg.topic, &msg.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                record_schema_violation(&msg.topic);
                warn!(topic = %msg.topic, error = %e, "Malformed message dropped");
                return;
            }
        };

        match parsed {
            InboundMessage::Proposal(proposal) => self.on_proposal(proposal, Instant::now()),
            InboundMessage::Done(completion) => self.on_completion(completion),
            other => debug!(kind = other.kind(), "Ignoring message not addressed to coordinator"),
        }
    }
}

impl Actor for Coordinator {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Coordinator started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        let stranded = self.records.len();
        if stranded > 0 {
            warn!(stranded, "Coordinator stopped with unfinished negotiations");
        } else {
            info!("Coordinator stopped");
        }
    }
}

// =============================================================================
// Message Handlers
// =============================================================================

impl Handler<Announce> for Coordinator {
    type Result = Result<String, ContractNetError>;

    fn handle(&mut self, msg: Announce, ctx: &mut Self::Context) -> Self::Result {
        let task_id = self.open_negotiation(msg.task, msg.window, Instant::now())?;

        let deadline_task = task_id.clone();
        ctx.run_later(msg.window, move |actor, _ctx| {
            actor.close_bidding(&deadline_task);
        });

        Ok(task_id)
    }
}

impl Handler<BusMessage> for Coordinator {
    type Result = ();

    fn handle(&mut self, msg: BusMessage, _ctx: &mut Self::Context) {
        self.handle_bus_message(msg);
    }
}

impl Handler<GetStatus> for Coordinator {
    type Result = StatusReport;

    fn handle(&mut self, msg: GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        self.status(&msg.negotiation_id)
    }
}

impl Handler<GetNegotiation> for Coordinator {
    type Result = Option<NegotiationSnapshot>;

    fn handle(&mut self, msg: GetNegotiation, _ctx: &mut Self::Context) -> Self::Result {
        self.negotiation(&msg.negotiation_id)
    }
}

impl Handler<ListNegotiations> for Coordinator {
    type Result = Vec<NegotiationSnapshot>;

    fn handle(&mut self, _msg: ListNegotiations, _ctx: &mut Self::Context) -> Self::Result {
        let mut all: Vec<NegotiationSnapshot> = self
            .records
            .values()
            .map(|r| r.snapshot())
            .chain(self.archive.values().cloned())
            .collect();
        all.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        all
    }
}
