// actor/worker.rs - Contract Net Worker

use actix::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::actor::messages::*;
use crate::actor::policy::{Bid, EvaluationPolicy};
use crate::bus::{BusMessage, SharedBus, SubscriptionId};
use crate::observability::{
    record_bid, record_declined, record_schema_violation, record_task_executed,
};
use crate::protocol::{
    accept_topic, completion_payload, proposal_payload, reject_topic, validate_agent_id,
    CallForProposals, Completion, InboundMessage, Proposal, Task, CFP_TOPIC, DONE_TOPIC,
    PROPOSAL_TOPIC,
};

/// Default lifetime of a bid that was neither accepted nor rejected
pub const DEFAULT_BID_TTL: Duration = Duration::from_secs(300);

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Globally unique id; also the last level of the accept/reject topics
    pub agent_id: String,

    /// Keep bidding while a task executes
    pub bid_while_busy: bool,

    /// Unanswered bids older than this are forgotten. Late proposals are
    /// dropped by the coordinator without a reply, so nothing else clears them.
    pub bid_ttl: Duration,
}

impl WorkerConfig {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            bid_while_busy: false,
            bid_ttl: DEFAULT_BID_TTL,
        }
    }

    pub fn bid_while_busy(mut self, enabled: bool) -> Self {
        self.bid_while_busy = enabled;
        self
    }

    pub fn bid_ttl(mut self, ttl: Duration) -> Self {
        self.bid_ttl = ttl;
        self
    }
}

/// Bid this worker has made and not yet settled
#[derive(Debug, Clone)]
struct PendingBid {
    task: Task,
    bid: Bid,

    /// Timestamp of the call for proposals answered; a task id announced
    /// again carries a new one
    announced_at: i64,
    placed: Instant,
}

/// Bidder side of the Contract Net.
///
/// Executes at most one task at a time. Awards that arrive while busy are
/// queued and run in arrival order.
pub struct Worker {
    config: WorkerConfig,
    policy: Box<dyn EvaluationPolicy>,
    bus: SharedBus,

    /// task_id -> our outstanding bid
    bids: HashMap<String, PendingBid>,

    executing: Option<String>,
    backlog: VecDeque<String>,

    subscriptions: Vec<SubscriptionId>,

    bids_sent: u64,
    tasks_completed: u64,
}

/// Validate the configuration and start a worker on `bus`.
///
/// The worker is subscribed before this returns, so it sees every call for
/// proposals published afterwards.
pub fn start(
    config: WorkerConfig,
    policy: Box<dyn EvaluationPolicy>,
    bus: SharedBus,
) -> Result<Addr<Worker>, ContractNetError> {
    validate_agent_id(&config.agent_id)
        .map_err(|_| ContractNetError::InvalidAgentId(config.agent_id.clone()))?;
    policy.validate().map_err(ContractNetError::InvalidPolicy)?;

    Ok(Worker::create(move |ctx| {
        let mut worker = Worker {
            config,
            policy,
            bus,
            bids: HashMap::new(),
            executing: None,
            backlog: VecDeque::new(),
            subscriptions: Vec::new(),
            bids_sent: 0,
            tasks_completed: 0,
        };
        worker.subscribe(ctx.address().recipient());
        worker
    }))
}

/// Ask a worker to unsubscribe and stop
pub fn stop(worker: &Addr<Worker>) {
    worker.do_send(StopWorker);
}

impl Worker {
    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    fn subscribe(&mut self, recipient: Recipient<BusMessage>) {
        let topics = [
            CFP_TOPIC.to_string(),
            accept_topic(&self.config.agent_id),
            reject_topic(&self.config.agent_id),
        ];
        for topic in &topics {
            self.subscriptions
                .push(self.bus.subscribe(topic, recipient.clone()));
        }
    }

    fn is_busy(&self) -> bool {
        self.executing.is_some()
    }

    /// Executing or queued
    fn is_committed(&self, task_id: &str) -> bool {
        self.executing.as_deref() == Some(task_id) || self.backlog.iter().any(|t| t == task_id)
    }

    fn prune_stale_bids(&mut self, now: Instant) {
        let ttl = self.config.bid_ttl;
        let executing = &self.executing;
        let backlog = &self.backlog;
        let before = self.bids.len();

        self.bids.retain(|task_id, pending| {
            executing.as_deref() == Some(task_id.as_str())
                || backlog.contains(task_id)
                || now.duration_since(pending.placed) < ttl
        });

        let pruned = before - self.bids.len();
        if pruned > 0 {
            debug!(agent_id = %self.config.agent_id, pruned, "Forgot unanswered bids");
        }
    }

    fn on_cfp(&mut self, cfp: CallForProposals) {
        let CallForProposals { job: task, timestamp } = cfp;
        self.prune_stale_bids(Instant::now());

        if self.is_committed(&task.id) {
            debug!(agent_id = %self.config.agent_id, task_id = %task.id, "Already awarded; call for proposals ignored");
            return;
        }
        if let Some(pending) = self.bids.get(&task.id) {
            if pending.announced_at == timestamp {
                debug!(agent_id = %self.config.agent_id, task_id = %task.id, "Already bid; duplicate call for proposals ignored");
                return;
            }
            debug!(agent_id = %self.config.agent_id, task_id = %task.id, "Task announced again; earlier bid dropped");
            self.bids.remove(&task.id);
        }
        if self.is_busy() && !self.config.bid_while_busy {
            debug!(agent_id = %self.config.agent_id, task_id = %task.id, "Busy; ignoring call for proposals");
            return;
        }

        let Some(bid) = self.policy.evaluate(&task) else {
            record_declined(&self.config.agent_id);
            debug!(agent_id = %self.config.agent_id, task_id = %task.id, name = %task.name, "Declined");
            return;
        };

        let proposal = Proposal::new(task.id.clone(), self.config.agent_id.clone(), bid.cost);
        self.bus.publish(PROPOSAL_TOPIC, proposal_payload(&proposal));
        self.bids_sent += 1;
        record_bid(&self.config.agent_id);
        info!(agent_id = %self.config.agent_id, task_id = %task.id, cost = bid.cost, "Proposal sent");

        self.bids.insert(
            task.id.clone(),
            PendingBid {
                task,
                bid,
                announced_at: timestamp,
                placed: Instant::now(),
            },
        );
    }

    fn on_accept(&mut self, task_id: String, ctx: &mut Context<Self>) {
        if self.is_committed(&task_id) {
            debug!(agent_id = %self.config.agent_id, task_id = %task_id, "Duplicate accept ignored");
            return;
        }
        if !self.bids.contains_key(&task_id) {
            warn!(agent_id = %self.config.agent_id, task_id = %task_id, "Accept for a task we did not bid on ignored");
            return;
        }

        info!(agent_id = %self.config.agent_id, task_id = %task_id, "Proposal accepted");
        self.backlog.push_back(task_id);
        if !self.is_busy() {
            self.start_next(ctx);
        }
    }

    fn on_reject(&mut self, task_id: &str) {
        if self.is_committed(task_id) {
            warn!(agent_id = %self.config.agent_id, task_id = %task_id, "Reject for an awarded task ignored");
            return;
        }
        if self.bids.remove(task_id).is_some() {
            debug!(agent_id = %self.config.agent_id, task_id = %task_id, "Proposal rejected");
        }
    }

    fn start_next(&mut self, ctx: &mut Context<Self>) {
        while let Some(task_id) = self.backlog.pop_front() {
            let Some(pending) = self.bids.get(&task_id) else {
                continue;
            };

            let execution = pending.bid.execution;
            info!(
                agent_id = %self.config.agent_id,
                task_id = %task_id,
                name = %pending.task.name,
                execution_ms = execution.as_millis() as u64,
                "Executing task"
            );

            self.executing = Some(task_id.clone());
            ctx.run_later(execution, move |worker, ctx| {
                worker.finish(task_id, ctx);
            });
            return;
        }
    }

    fn finish(&mut self, task_id: String, ctx: &mut Context<Self>) {
        self.bids.remove(&task_id);
        self.executing = None;
        self.tasks_completed += 1;
        record_task_executed(&self.config.agent_id);

        let completion = Completion {
            task_id,
            agent_id: self.config.agent_id.clone(),
        };
        self.bus.publish(DONE_TOPIC, completion_payload(&completion));
        info!(agent_id = %completion.agent_id, task_id = %completion.task_id, "Task completed");

        self.start_next(ctx);
    }

    fn state(&self) -> WorkerState {
        let mut pending_bids: Vec<String> = self.bids.keys().cloned().collect();
        pending_bids.sort();
        WorkerState {
            agent_id: self.config.agent_id.clone(),
            executing: self.executing.clone(),
            queued: self.backlog.iter().cloned().collect(),
            pending_bids,
            bids_sent: self.bids_sent,
            tasks_completed: self.tasks_completed,
        }
    }
}

impl Actor for Worker {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(agent_id = %self.config.agent_id, policy = ?self.policy, "Worker started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        if let Some(task_id) = &self.executing {
            warn!(agent_id = %self.config.agent_id, task_id = %task_id, "Worker stopped mid-task");
        }
        info!(agent_id = %self.config.agent_id, completed = self.tasks_completed, "Worker stopped");
    }
}

// =============================================================================
// Message Handlers
// =============================================================================

impl Handler<BusMessage> for Worker {
    type Result = ();

    fn handle(&mut self, msg: BusMessage, ctx: &mut Self::Context) {
        let parsed = match InboundMessage::parse(&msg.topic, &msg.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                record_schema_violation(&msg.topic);
                warn!(agent_id = %self.config.agent_id, topic = %msg.topic, error = %e, "Malformed message dropped");
                return;
            }
        };

        match parsed {
            InboundMessage::CallForProposals(cfp) => self.on_cfp(cfp),
            InboundMessage::Accept { agent_id, award } if agent_id == self.config.agent_id => {
                self.on_accept(award.task_id, ctx)
            }
            InboundMessage::Reject { agent_id, award } if agent_id == self.config.agent_id => {
                self.on_reject(&award.task_id)
            }
            other => debug!(agent_id = %self.config.agent_id, kind = other.kind(), "Message not for this worker ignored"),
        }
    }
}

impl Handler<StopWorker> for Worker {
    type Result = ();

    fn handle(&mut self, _msg: StopWorker, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl Handler<GetWorkerState> for Worker {
    type Result = WorkerState;

    fn handle(&mut self, _msg: GetWorkerState, _ctx: &mut Self::Context) -> Self::Result {
        self.state()
    }
}
