// protocol/schema.rs - Wire Topics and Payload Validation

//! Topics and payload shapes exchanged on the bus.
//!
//! | Direction | Topic | Payload |
//! |---|---|---|
//! | coordinator -> workers | `contractnet/cfp` | `{"job": {"id", "name", ..}, "timestamp"}` |
//! | worker -> coordinator | `contractnet/proposal` | `{"task_id", "agent_id", "cost", "timestamp"}` |
//! | coordinator -> winner | `contractnet/accept/<agent_id>` | `{"task_id"}` |
//! | coordinator -> loser | `contractnet/reject/<agent_id>` | `{"task_id"}` |
//! | winner -> coordinator | `contractnet/done` | `{"task_id", "agent_id"}` |
//!
//! The topic is the discriminant: [`InboundMessage::parse`] validates a
//! payload against the shape its topic implies before protocol logic sees it.

use super::negotiation::{now_millis, Proposal, Task};
use super::state_machine::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const TOPIC_ROOT: &str = "contractnet";
pub const CFP_TOPIC: &str = "contractnet/cfp";
pub const PROPOSAL_TOPIC: &str = "contractnet/proposal";
pub const DONE_TOPIC: &str = "contractnet/done";
pub const ALL_TOPICS: &str = "contractnet/#";

const ACCEPT_LEVEL: &str = "accept";
const REJECT_LEVEL: &str = "reject";

pub fn accept_topic(agent_id: &str) -> String {
    format!("{}/{}/{}", TOPIC_ROOT, ACCEPT_LEVEL, agent_id)
}

pub fn reject_topic(agent_id: &str) -> String {
    format!("{}/{}/{}", TOPIC_ROOT, REJECT_LEVEL, agent_id)
}

/// Agent ids become topic levels, so they must be a single, wildcard-free level.
pub fn validate_agent_id(agent_id: &str) -> Result<(), ProtocolError> {
    if agent_id.is_empty() || agent_id.contains(['/', '+', '#']) {
        return Err(ProtocolError::InvalidAgentId(agent_id.to_string()));
    }
    Ok(())
}

/// Call for proposals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallForProposals {
    pub job: Task,

    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

impl CallForProposals {
    pub fn new(job: Task) -> Self {
        Self {
            job,
            timestamp: now_millis(),
        }
    }
}

/// Accept or reject notice; the recipient is carried by the topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    pub task_id: String,
}

/// Completion notice from the winner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub task_id: String,
    pub agent_id: String,
}

/// A validated inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    CallForProposals(CallForProposals),
    Proposal(Proposal),
    Accept { agent_id: String, award: Award },
    Reject { agent_id: String, award: Award },
    Done(Completion),
}

impl InboundMessage {
    pub fn parse(topic: &str, payload: &Value) -> Result<Self, ProtocolError> {
        if !payload.is_object() {
            return Err(ProtocolError::NotAnObject {
                topic: topic.to_string(),
            });
        }

        match topic {
            CFP_TOPIC => {
                let cfp: CallForProposals = decode(topic, payload)?;
                require_non_empty(topic, "job.id", &cfp.job.id)?;
                Ok(InboundMessage::CallForProposals(cfp))
            }
            PROPOSAL_TOPIC => {
                let proposal: Proposal = decode(topic, payload)?;
                require_non_empty(topic, "task_id", &proposal.task_id)?;
                require_agent_id(topic, &proposal.agent_id)?;
                if !proposal.cost.is_finite() {
                    return Err(ProtocolError::InvalidField {
                        topic: topic.to_string(),
                        field: "cost",
                        reason: "must be a finite number".into(),
                    });
                }
                Ok(InboundMessage::Proposal(proposal))
            }
            DONE_TOPIC => {
                let completion: Completion = decode(topic, payload)?;
                require_non_empty(topic, "task_id", &completion.task_id)?;
                require_agent_id(topic, &completion.agent_id)?;
                Ok(InboundMessage::Done(completion))
            }
            _ => Self::parse_addressed(topic, payload),
        }
    }

    fn parse_addressed(topic: &str, payload: &Value) -> Result<Self, ProtocolError> {
        let levels: Vec<&str> = topic.split('/').collect();
        let [TOPIC_ROOT, kind, agent_id] = levels.as_slice() else {
            return Err(ProtocolError::UnknownTopic(topic.to_string()));
        };
        if *kind != ACCEPT_LEVEL && *kind != REJECT_LEVEL {
            return Err(ProtocolError::UnknownTopic(topic.to_string()));
        }
        validate_agent_id(agent_id)?;

        let award: Award = decode(topic, payload)?;
        require_non_empty(topic, "task_id", &award.task_id)?;

        let agent_id = agent_id.to_string();
        if *kind == ACCEPT_LEVEL {
            Ok(InboundMessage::Accept { agent_id, award })
        } else {
            Ok(InboundMessage::Reject { agent_id, award })
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::CallForProposals(_) => "cfp",
            InboundMessage::Proposal(_) => "proposal",
            InboundMessage::Accept { .. } => "accept",
            InboundMessage::Reject { .. } => "reject",
            InboundMessage::Done(_) => "done",
        }
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &Value) -> Result<T, ProtocolError> {
    T::deserialize(payload).map_err(|e| ProtocolError::Malformed {
        topic: topic.to_string(),
        reason: e.to_string(),
    })
}

fn require_non_empty(topic: &str, field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidField {
            topic: topic.to_string(),
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

fn require_agent_id(topic: &str, agent_id: &str) -> Result<(), ProtocolError> {
    validate_agent_id(agent_id).map_err(|_| ProtocolError::InvalidField {
        topic: topic.to_string(),
        field: "agent_id",
        reason: format!("{:?} is not a valid agent id", agent_id),
    })
}

// Outbound payloads

pub fn cfp_payload(cfp: &CallForProposals) -> Value {
    let mut job = cfp.job.parameters.clone();
    job.insert("id".into(), Value::String(cfp.job.id.clone()));
    job.insert("name".into(), Value::String(cfp.job.name.clone()));
    json!({ "job": job, "timestamp": cfp.timestamp })
}

pub fn proposal_payload(proposal: &Proposal) -> Value {
    json!({
        "task_id": proposal.task_id,
        "agent_id": proposal.agent_id,
        "cost": proposal.cost,
        "timestamp": proposal.timestamp,
    })
}

pub fn award_payload(task_id: &str) -> Value {
    json!({ "task_id": task_id })
}

pub fn completion_payload(completion: &Completion) -> Value {
    json!({
        "task_id": completion.task_id,
        "agent_id": completion.agent_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builders() {
        assert_eq!(accept_topic("m1"), "contractnet/accept/m1");
        assert_eq!(reject_topic("m2"), "contractnet/reject/m2");
    }

    #[test]
    fn test_agent_id_validation() {
        assert!(validate_agent_id("machine_1").is_ok());
        assert!(validate_agent_id("").is_err());
        assert!(validate_agent_id("a/b").is_err());
        assert!(validate_agent_id("a+").is_err());
        assert!(validate_agent_id("#").is_err());
    }

    #[test]
    fn test_parse_cfp_keeps_parameters() {
        let task = Task::new("job_1", "A").with_parameter("size", 12);
        let payload = cfp_payload(&CallForProposals::new(task.clone()));

        match InboundMessage::parse(CFP_TOPIC, &payload).unwrap() {
            InboundMessage::CallForProposals(cfp) => assert_eq!(cfp.job, task),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cfp_requires_job_id() {
        let payload = json!({ "job": { "name": "A" } });
        assert!(matches!(
            InboundMessage::parse(CFP_TOPIC, &payload),
            Err(ProtocolError::Malformed { .. })
        ));

        let payload = json!({ "job": { "id": "", "name": "A" } });
        assert!(matches!(
            InboundMessage::parse(CFP_TOPIC, &payload),
            Err(ProtocolError::InvalidField { field: "job.id", .. })
        ));
    }

    #[test]
    fn test_parse_proposal() {
        let payload = json!({ "task_id": "job_1", "agent_id": "m1", "cost": 5 });

        match InboundMessage::parse(PROPOSAL_TOPIC, &payload).unwrap() {
            InboundMessage::Proposal(p) => {
                assert_eq!(p.task_id, "job_1");
                assert_eq!(p.agent_id, "m1");
                assert_eq!(p.cost, 5.0);
                assert!(p.timestamp > 0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_proposal_rejects_bad_fields() {
        let missing_cost = json!({ "task_id": "job_1", "agent_id": "m1" });
        assert!(InboundMessage::parse(PROPOSAL_TOPIC, &missing_cost).is_err());

        let text_cost = json!({ "task_id": "job_1", "agent_id": "m1", "cost": "cheap" });
        assert!(InboundMessage::parse(PROPOSAL_TOPIC, &text_cost).is_err());

        let routed_id = json!({ "task_id": "job_1", "agent_id": "m1/x", "cost": 1 });
        assert!(matches!(
            InboundMessage::parse(PROPOSAL_TOPIC, &routed_id),
            Err(ProtocolError::InvalidField { field: "agent_id", .. })
        ));
    }

    #[test]
    fn test_parse_accept_and_reject() {
        let payload = award_payload("job_1");

        assert_eq!(
            InboundMessage::parse(&accept_topic("m1"), &payload).unwrap(),
            InboundMessage::Accept {
                agent_id: "m1".into(),
                award: Award { task_id: "job_1".into() },
            }
        );
        assert_eq!(
            InboundMessage::parse(&reject_topic("m2"), &payload).unwrap().kind(),
            "reject"
        );
    }

    #[test]
    fn test_parse_done() {
        let payload = completion_payload(&Completion {
            task_id: "job_1".into(),
            agent_id: "m2".into(),
        });
        assert_eq!(
            InboundMessage::parse(DONE_TOPIC, &payload).unwrap().kind(),
            "done"
        );
    }

    #[test]
    fn test_unknown_and_non_object() {
        assert!(matches!(
            InboundMessage::parse("contractnet/other", &json!({})),
            Err(ProtocolError::UnknownTopic(_))
        ));
        assert!(matches!(
            InboundMessage::parse("contractnet/accept/m1/extra", &award_payload("j")),
            Err(ProtocolError::UnknownTopic(_))
        ));
        assert!(matches!(
            InboundMessage::parse(PROPOSAL_TOPIC, &json!([1, 2])),
            Err(ProtocolError::NotAnObject { .. })
        ));
    }
}
