// config.rs - Run Configuration

//! Settings for a Contract Net run.
//!
//! Values are layered: built-in defaults, then an optional file (TOML, JSON or
//! YAML, picked by extension), then `CONTRACTNET__*` environment variables.
//!
//! ```toml
//! bidding_window_ms = 3000
//! time_scale = 0.1
//!
//! [[machines]]
//! id = "machine_1"
//! policy = { type = "capabilities", capabilities = { A = 2, B = 5 } }
//!
//! [[jobs]]
//! name = "A"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::actor::worker::DEFAULT_BID_TTL;
use crate::actor::{PolicyConfig, WorkerConfig};
use crate::protocol::{validate_agent_id, Task};

/// Environment variable prefix, e.g. `CONTRACTNET__TIME_SCALE=0.1`
pub const ENV_PREFIX: &str = "CONTRACTNET";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A worker to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub id: String,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub bid_while_busy: bool,

    /// How long an unanswered bid is remembered
    #[serde(default = "default_bid_ttl_ms")]
    pub bid_ttl_ms: u64,
}

fn default_bid_ttl_ms() -> u64 {
    DEFAULT_BID_TTL.as_millis() as u64
}

impl MachineConfig {
    pub fn capabilities<I, K>(id: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            id: id.into(),
            policy: PolicyConfig::Capabilities {
                capabilities: capabilities
                    .into_iter()
                    .map(|(name, secs)| (name.into(), secs))
                    .collect::<BTreeMap<_, _>>(),
            },
            bid_while_busy: false,
            bid_ttl_ms: default_bid_ttl_ms(),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(self.id.clone())
            .bid_while_busy(self.bid_while_busy)
            .bid_ttl(Duration::from_millis(self.bid_ttl_ms))
    }
}

/// A task to announce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractNetConfig {
    /// How long the coordinator collects proposals per task
    pub bidding_window_ms: u64,

    /// Pause after a bidding window closes before the next announcement
    pub pause_between_jobs_ms: u64,

    /// Time left for awarded tasks to finish once every job is announced
    pub settle_ms: u64,

    /// Multiplier from advertised cost (seconds) to real execution time
    pub time_scale: f64,

    pub machines: Vec<MachineConfig>,
    pub jobs: Vec<JobConfig>,
}

impl Default for ContractNetConfig {
    fn default() -> Self {
        Self {
            bidding_window_ms: 3000,
            pause_between_jobs_ms: 2000,
            settle_ms: 10_000,
            time_scale: 1.0,
            machines: vec![
                MachineConfig::capabilities("machine_1", [("A", 2.0), ("B", 5.0)]),
                MachineConfig::capabilities("machine_2", [("A", 3.0), ("C", 4.0)]),
                MachineConfig::capabilities("machine_3", [("B", 4.0), ("C", 6.0)]),
            ],
            jobs: ["A", "B", "C", "A", "B"].into_iter().map(JobConfig::new).collect(),
        }
    }
}

impl ContractNetConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded: ContractNetConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bidding_window_ms == 0 {
            return Err(ConfigError::Invalid("bidding_window_ms must be positive".into()));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "time_scale must be a finite, non-negative number (got {})",
                self.time_scale
            )));
        }

        let mut seen = HashSet::new();
        for machine in &self.machines {
            validate_agent_id(&machine.id)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if machine.bid_ttl_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "machine {}: bid_ttl_ms must be positive",
                    machine.id
                )));
            }
            if !seen.insert(machine.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate machine id {}", machine.id)));
            }
            machine
                .policy
                .build(self.time_scale)
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("machine {}: {}", machine.id, e)))?;
        }

        if let Some(job) = self.jobs.iter().find(|j| j.name.is_empty()) {
            return Err(ConfigError::Invalid(format!("job with empty name: {:?}", job)));
        }
        Ok(())
    }

    pub fn bidding_window(&self) -> Duration {
        Duration::from_millis(self.bidding_window_ms)
    }

    pub fn pause_between_jobs(&self) -> Duration {
        Duration::from_millis(self.pause_between_jobs_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Jobs as tasks with ids `job_1`, `job_2`, ...
    pub fn tasks(&self) -> Vec<Task> {
        self.jobs
            .iter()
            .enumerate()
            .map(|(i, job)| Task {
                id: format!("job_{}", i + 1),
                name: job.name.clone(),
                parameters: job.parameters.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ContractNetConfig::default();

        assert_eq!(config.bidding_window(), Duration::from_secs(3));
        assert_eq!(config.machines.len(), 3);
        assert!(config.validate().is_ok());

        let tasks = config.tasks();
        assert_eq!(tasks.len(), 5);
        assert_eq!(tasks[0].id, "job_1");
        assert_eq!(tasks[2].name, "C");
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
bidding_window_ms = 250
time_scale = 0.01

[[machines]]
id = "press"
policy = {{ type = "capabilities", capabilities = {{ stamp = 2, fold = 3 }} }}

[[machines]]
id = "lathe"
bid_while_busy = true
bid_ttl_ms = 1500
policy = {{ type = "accept_all", estimator = {{ kind = "fixed", cost = 1.5 }} }}

[[jobs]]
name = "stamp"
parameters = {{ sheets = 4 }}
"#
        )
        .unwrap();

        let config = ContractNetConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.bidding_window_ms, 250);
        assert_eq!(config.pause_between_jobs_ms, 2000);
        assert_eq!(config.time_scale, 0.01);
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.machines[0].id, "press");
        assert!(!config.machines[0].bid_while_busy);
        assert!(config.machines[1].bid_while_busy);
        assert_eq!(config.machines[0].bid_ttl_ms, 300_000);
        assert_eq!(
            config.machines[1].worker_config().bid_ttl,
            Duration::from_millis(1500)
        );
        assert_eq!(
            config.machines[1].policy,
            PolicyConfig::AcceptAll {
                estimator: crate::actor::CostEstimator::Fixed { cost: 1.5 }
            }
        );

        let tasks = config.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "stamp");
        assert_eq!(tasks[0].parameters["sheets"], 4);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "machines": [
                {{ "id": "m", "policy": {{ "type": "capabilities", "capabilities": {{ "a": 1 }} }} }},
                {{ "id": "m", "policy": {{ "type": "capabilities", "capabilities": {{ "b": 1 }} }} }}
            ] }}"#
        )
        .unwrap();

        let err = ContractNetConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = ContractNetConfig::default();
        config.time_scale = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ContractNetConfig::default();
        config.machines[0].id = "machine/1".into();
        assert!(config.validate().is_err());

        let mut config = ContractNetConfig::default();
        config.machines[0] = MachineConfig::capabilities("machine_1", [("A", -1.0)]);
        assert!(config.validate().is_err());

        let mut config = ContractNetConfig::default();
        config.bidding_window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ContractNetConfig::default();
        config.machines[1].bid_ttl_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ContractNetConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
