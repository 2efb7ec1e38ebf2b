#![allow(dead_code)]

use std::collections::BTreeMap;

use streamdag::config::{
    ConfigFile, DagSection, DecisionConfig, DefaultSection, RawConfigFile, TaskConfig,
};
use streamdag::errors::Result;
use streamdag::types::{OverlapBehaviour, TaskKind, TriggerPolicy};

/// Builder for `ConfigFile` going through the same validation as a TOML file.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                dag: DagSection::default(),
                default: DefaultSection {
                    retries: 0,
                    retry_delay: "10ms".to_string(),
                    execution_timeout: None,
                },
                task: BTreeMap::new(),
                decision: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_decision(mut self, name: &str, decision: DecisionConfig) -> Self {
        self.config.decision.insert(name.to_string(), decision);
        self
    }

    /// Static decision following `follow`.
    pub fn with_static_decision(self, name: &str, follow: &[&str]) -> Self {
        self.with_decision(
            name,
            DecisionConfig::Static {
                follow: follow.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    pub fn with_default_retries(mut self, retries: u32, retry_delay: &str) -> Self {
        self.config.default.retries = retries;
        self.config.default.retry_delay = retry_delay.to_string();
        self
    }

    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.config.dag.schedule = schedule.to_string();
        self
    }

    pub fn with_overlap(mut self, overlap: OverlapBehaviour, max_queued_runs: usize) -> Self {
        self.config.dag.overlap = overlap;
        self.config.dag.max_queued_runs = max_queued_runs;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn shell(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Shell,
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn branch(decision: &str) -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Branch,
                decision: Some(decision.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn empty() -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Empty,
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.task.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: &str) -> Self {
        self.task.retry_delay = Some(delay.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.execution_timeout = Some(timeout.to_string());
        self
    }

    pub fn trigger_rule(mut self, policy: TriggerPolicy) -> Self {
        self.task.trigger_rule = policy;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
