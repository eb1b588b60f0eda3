// actor/policy.rs - Worker Evaluation Policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::time::Duration;

use crate::protocol::Task;

/// A worker's answer to a call for proposals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bid {
    /// Advertised cost; lower wins
    pub cost: f64,

    /// How long execution takes if awarded
    pub execution: Duration,
}

/// Decides whether and what a worker bids.
///
/// Returning `None` declines; the worker then stays silent.
pub trait EvaluationPolicy: Send + Debug + 'static {
    fn evaluate(&mut self, task: &Task) -> Option<Bid>;

    /// Checked once when the worker starts
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Cost model for [`AcceptAll`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostEstimator {
    Fixed { cost: f64 },
    Uniform { min: f64, max: f64 },
}

impl CostEstimator {
    fn validate(&self) -> Result<(), String> {
        match *self {
            CostEstimator::Fixed { cost } => check_amount("cost", cost),
            CostEstimator::Uniform { min, max } => {
                check_amount("min", min)?;
                check_amount("max", max)?;
                if min > max {
                    return Err(format!("min {} exceeds max {}", min, max));
                }
                Ok(())
            }
        }
    }

    fn estimate(&self) -> f64 {
        match *self {
            CostEstimator::Fixed { cost } => cost,
            CostEstimator::Uniform { min, max } => rand::rng().random_range(min..=max),
        }
    }
}

/// Bids on every task with an estimated cost. Execution takes
/// `cost * time_scale` seconds.
#[derive(Debug, Clone)]
pub struct AcceptAll {
    pub estimator: CostEstimator,
    pub time_scale: f64,
}

impl AcceptAll {
    pub fn fixed(cost: f64) -> Self {
        Self {
            estimator: CostEstimator::Fixed { cost },
            time_scale: 1.0,
        }
    }

    pub fn uniform(min: f64, max: f64) -> Self {
        Self {
            estimator: CostEstimator::Uniform { min, max },
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }
}

impl EvaluationPolicy for AcceptAll {
    fn evaluate(&mut self, _task: &Task) -> Option<Bid> {
        let cost = self.estimator.estimate();
        Some(Bid {
            cost,
            execution: scaled(cost, self.time_scale),
        })
    }

    fn validate(&self) -> Result<(), String> {
        self.estimator.validate()?;
        check_amount("time_scale", self.time_scale)
    }
}

/// Bids only on known job names; the cost is the job's processing time in
/// seconds.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    pub capabilities: HashMap<String, f64>,
    pub time_scale: f64,
}

impl CapabilityTable {
    pub fn new<I, K>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            capabilities: capabilities
                .into_iter()
                .map(|(name, secs)| (name.into(), secs))
                .collect(),
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }
}

impl EvaluationPolicy for CapabilityTable {
    fn evaluate(&mut self, task: &Task) -> Option<Bid> {
        let seconds = *self.capabilities.get(&task.name)?;
        Some(Bid {
            cost: seconds,
            execution: scaled(seconds, self.time_scale),
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.capabilities.is_empty() {
            return Err("capability table is empty".into());
        }
        for (name, seconds) in &self.capabilities {
            check_amount(name, *seconds)?;
        }
        check_amount("time_scale", self.time_scale)
    }
}

/// Serializable policy description used by configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    AcceptAll { estimator: CostEstimator },
    Capabilities { capabilities: BTreeMap<String, f64> },
}

impl PolicyConfig {
    pub fn build(&self, time_scale: f64) -> Box<dyn EvaluationPolicy> {
        match self {
            PolicyConfig::AcceptAll { estimator } => Box::new(AcceptAll {
                estimator: estimator.clone(),
                time_scale,
            }),
            PolicyConfig::Capabilities { capabilities } => Box::new(
                CapabilityTable::new(capabilities.iter().map(|(k, v)| (k.clone(), *v)))
                    .with_time_scale(time_scale),
            ),
        }
    }
}

fn check_amount(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a finite, non-negative number (got {})", name, value));
    }
    Ok(())
}

fn scaled(seconds: f64, time_scale: f64) -> Duration {
    Duration::try_from_secs_f64(seconds * time_scale).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_cost() {
        let mut policy = AcceptAll::fixed(3.0).with_time_scale(0.5);
        let bid = policy.evaluate(&Task::new("job_1", "anything")).unwrap();

        assert_eq!(bid.cost, 3.0);
        assert_eq!(bid.execution, Duration::from_millis(1500));
    }

    #[test]
    fn test_uniform_cost_in_range() {
        let mut policy = AcceptAll::uniform(2.0, 4.0);
        for _ in 0..50 {
            let bid = policy.evaluate(&Task::new("job_1", "A")).unwrap();
            assert!((2.0..=4.0).contains(&bid.cost));
        }
    }

    #[test]
    fn test_capability_table_declines_unknown_jobs() {
        let mut policy = CapabilityTable::new([("A", 2.0), ("B", 5.0)]);

        assert_eq!(policy.evaluate(&Task::new("j1", "B")).map(|b| b.cost), Some(5.0));
        assert!(policy.evaluate(&Task::new("j2", "C")).is_none());
    }

    #[test]
    fn test_validation() {
        assert!(AcceptAll::fixed(1.0).validate().is_ok());
        assert!(AcceptAll::fixed(f64::NAN).validate().is_err());
        assert!(AcceptAll::fixed(-1.0).validate().is_err());
        assert!(AcceptAll::uniform(5.0, 1.0).validate().is_err());
        assert!(AcceptAll::fixed(1.0).with_time_scale(-0.1).validate().is_err());
        assert!(CapabilityTable::new(Vec::<(String, f64)>::new()).validate().is_err());
        assert!(CapabilityTable::new([("A", f64::INFINITY)]).validate().is_err());
    }

    #[test]
    fn test_policy_config_from_json() {
        let config: PolicyConfig = serde_json::from_str(
            r#"{ "type": "capabilities", "capabilities": { "A": 2, "C": 4 } }"#,
        )
        .unwrap();
        let mut policy = config.build(0.001);

        let bid = policy.evaluate(&Task::new("j", "C")).unwrap();
        assert_eq!(bid.cost, 4.0);
        assert_eq!(bid.execution, Duration::from_millis(4));

        let config: PolicyConfig = serde_json::from_str(
            r#"{ "type": "accept_all", "estimator": { "kind": "uniform", "min": 1, "max": 2 } }"#,
        )
        .unwrap();
        assert!(config.build(1.0).validate().is_ok());
    }
}
