// bus/mod.rs - Publish/Subscribe Bus Interface

//! The bus is the only channel between agents.
//!
//! Agents receive a [`SharedBus`] at construction and never talk to each
//! other directly. Delivery is asynchronous, unordered and may duplicate
//! messages; the protocol actors are written to tolerate all three.
//!
//! [`LocalBus`] is an in-process broker implementing the interface with
//! MQTT-style topic patterns.

mod local;

pub use local::{LocalBus, LocalBusHandle};

use actix::prelude::*;
use serde_json::Value;
use std::sync::Arc;

/// Payload delivered to a subscriber
#[derive(Message, Clone, Debug, PartialEq)]
#[rtype(result = "()")]
pub struct BusMessage {
    pub topic: String,
    pub payload: Value,
}

/// Identifies one subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Publish/subscribe channel keyed by topic strings
pub trait Bus: Send + Sync {
    /// Fire-and-forget publish
    fn publish(&self, topic: &str, payload: Value);

    /// Register `handler` for every topic matching `pattern`
    fn subscribe(&self, pattern: &str, handler: Recipient<BusMessage>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

pub type SharedBus = Arc<dyn Bus>;

/// Match a topic against an MQTT-style pattern.
///
/// `+` matches exactly one level, a trailing `#` matches the remaining
/// levels (including none).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return pattern_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
