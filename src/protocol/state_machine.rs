// protocol/state_machine.rs - Negotiation Status and Protocol Errors

use actix::MessageResponse;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid negotiation transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Payload on {topic} is not a JSON object")]
    NotAnObject { topic: String },

    #[error("Malformed payload on {topic}: {reason}")]
    Malformed { topic: String, reason: String },

    #[error("Invalid field {field} on {topic}: {reason}")]
    InvalidField {
        topic: String,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid agent id {0:?}")]
    InvalidAgentId(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Lifecycle of a single negotiation, as seen by the coordinator.
///
/// ```text
/// OPEN --[deadline, >=1 proposal]--> AWARDED --[completion from winner]--> DONE
/// OPEN --[deadline, 0 proposals]---> EXPIRED_NO_BIDS
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationStatus {
    Open,
    Awarded,
    ExpiredNoBids,
    Done,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Open => "OPEN",
            NegotiationStatus::Awarded => "AWARDED",
            NegotiationStatus::ExpiredNoBids => "EXPIRED_NO_BIDS",
            NegotiationStatus::Done => "DONE",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationStatus::Done | NegotiationStatus::ExpiredNoBids)
    }

    /// Validate a single forward step of the state machine.
    pub fn validate_transition(self, to: NegotiationStatus) -> Result<(), ProtocolError> {
        use NegotiationStatus::*;

        match (self, to) {
            (Open, Awarded) | (Open, ExpiredNoBids) | (Awarded, Done) => Ok(()),
            (from, to) => Err(ProtocolError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a status query; `Unknown` when no record exists for the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, MessageResponse)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusReport {
    Open,
    Awarded,
    ExpiredNoBids,
    Done,
    Unknown,
}

impl StatusReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReport::Open => "OPEN",
            StatusReport::Awarded => "AWARDED",
            StatusReport::ExpiredNoBids => "EXPIRED_NO_BIDS",
            StatusReport::Done => "DONE",
            StatusReport::Unknown => "UNKNOWN",
        }
    }
}

impl From<Option<NegotiationStatus>> for StatusReport {
    fn from(status: Option<NegotiationStatus>) -> Self {
        match status {
            Some(NegotiationStatus::Open) => StatusReport::Open,
            Some(NegotiationStatus::Awarded) => StatusReport::Awarded,
            Some(NegotiationStatus::ExpiredNoBids) => StatusReport::ExpiredNoBids,
            Some(NegotiationStatus::Done) => StatusReport::Done,
            None => StatusReport::Unknown,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NegotiationStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Open.validate_transition(Awarded).is_ok());
        assert!(Open.validate_transition(ExpiredNoBids).is_ok());
        assert!(Awarded.validate_transition(Done).is_ok());
    }

    #[test]
    fn test_no_back_transitions() {
        let all = [Open, Awarded, ExpiredNoBids, Done];
        for from in [Awarded, ExpiredNoBids, Done] {
            assert!(from.validate_transition(Open).is_err());
        }
        for to in all {
            assert!(Done.validate_transition(to).is_err());
            assert!(ExpiredNoBids.validate_transition(to).is_err());
        }
        assert!(Open.validate_transition(Done).is_err());
    }

    #[test]
    fn test_transition_error_names_states() {
        let err = Done.validate_transition(Awarded).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid negotiation transition from DONE to AWARDED"
        );
    }

    #[test]
    fn test_status_report_from_option() {
        assert_eq!(StatusReport::from(None), StatusReport::Unknown);
        assert_eq!(StatusReport::from(Some(Awarded)), StatusReport::Awarded);
        assert_eq!(
            serde_json::to_string(&StatusReport::ExpiredNoBids).unwrap(),
            "\"EXPIRED_NO_BIDS\""
        );
    }
}
