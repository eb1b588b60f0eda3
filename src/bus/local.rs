// bus/local.rs - In-process Bus Broker

use actix::prelude::*;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::{topic_matches, Bus, BusMessage, SubscriptionId};

/// Publish a payload to every matching subscription
#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub topic: String,
    pub payload: Value,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub id: SubscriptionId,
    pub pattern: String,
    pub handler: Recipient<BusMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub id: SubscriptionId,
}

/// Broker statistics
#[derive(Message)]
#[rtype(result = "BusStats")]
pub struct GetBusStats;

#[derive(Debug, Clone, Default, MessageResponse)]
pub struct BusStats {
    pub subscriptions: usize,
    pub published: u64,
    pub delivered: u64,
}

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: Recipient<BusMessage>,
}

/// Broker actor fanning out publishes to subscribers on this node.
///
/// `duplicates` re-delivers every message that many extra times, which
/// exercises the at-least-once handling of the protocol actors.
#[derive(Default)]
pub struct LocalBus {
    subscriptions: Vec<Subscription>,
    duplicates: usize,
    published: u64,
    delivered: u64,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicates(mut self, duplicates: usize) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// Start the broker and return a handle usable as a [`Bus`]
    pub fn spawn(self) -> LocalBusHandle {
        LocalBusHandle {
            addr: self.start(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Actor for LocalBus {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        debug!(duplicates = self.duplicates, "Local bus started");
    }
}

impl Handler<Publish> for LocalBus {
    type Result = ();

    fn handle(&mut self, msg: Publish, _ctx: &mut Self::Context) {
        self.published += 1;

        self.subscriptions.retain(|sub| sub.handler.connected());

        for sub in self
            .subscriptions
            .iter()
            .filter(|sub| topic_matches(&sub.pattern, &msg.topic))
        {
            for _ in 0..=self.duplicates {
                sub.handler.do_send(BusMessage {
                    topic: msg.topic.clone(),
                    payload: msg.payload.clone(),
                });
                self.delivered += 1;
            }
            trace!(topic = %msg.topic, subscription = sub.id.0, "Delivered");
        }
    }
}

impl Handler<Subscribe> for LocalBus {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Self::Context) {
        debug!(pattern = %msg.pattern, subscription = msg.id.0, "Subscribed");
        self.subscriptions.push(Subscription {
            id: msg.id,
            pattern: msg.pattern,
            handler: msg.handler,
        });
    }
}

impl Handler<Unsubscribe> for LocalBus {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Self::Context) {
        self.subscriptions.retain(|sub| sub.id != msg.id);
    }
}

impl Handler<GetBusStats> for LocalBus {
    type Result = BusStats;

    fn handle(&mut self, _msg: GetBusStats, _ctx: &mut Self::Context) -> Self::Result {
        BusStats {
            subscriptions: self.subscriptions.len(),
            published: self.published,
            delivered: self.delivered,
        }
    }
}

/// Cloneable [`Bus`] implementation backed by a [`LocalBus`] actor
#[derive(Clone)]
pub struct LocalBusHandle {
    addr: Addr<LocalBus>,
    next_id: Arc<AtomicU64>,
}

impl LocalBusHandle {
    pub async fn stats(&self) -> Result<BusStats, MailboxError> {
        self.addr.send(GetBusStats).await
    }
}

impl Bus for LocalBusHandle {
    fn publish(&self, topic: &str, payload: Value) {
        self.addr.do_send(Publish {
            topic: topic.to_string(),
            payload,
        });
    }

    fn subscribe(&self, pattern: &str, handler: Recipient<BusMessage>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.addr.do_send(Subscribe {
            id,
            pattern: pattern.to_string(),
            handler,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.addr.do_send(Unsubscribe { id });
    }
}
