use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::capability::Capability;
use crate::error::{EnsembleError, Result};

/// Immutable configuration for the whole engine.
///
/// Constructed once and threaded through the scheduler and consensus engine;
/// there is no process-wide mutable configuration. Per-submission overrides
/// go through [`TaskOptions`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub scheduler: SchedulerConfig,
    pub decomposer: DecomposerConfig,
    pub consensus: ConsensusConfig,
    pub pool: PoolConfig,
}

impl EnsembleConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content = fs::read_to_string(path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| EnsembleError::Config(e.to_string()))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.scheduler.max_concurrent_tasks == 0 {
            errors.push("scheduler.max_concurrent_tasks must be greater than 0");
        }
        if self.scheduler.subtask_deadline_secs == 0 {
            errors.push("scheduler.subtask_deadline_secs must be greater than 0");
        }
        if self.scheduler.task_timeout_secs == 0 {
            errors.push("scheduler.task_timeout_secs must be greater than 0");
        }

        if self.decomposer.max_subtasks == 0 {
            errors.push("decomposer.max_subtasks must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.consensus.threshold) {
            errors.push("consensus.threshold must be between 0.0 and 1.0");
        }
        if self.consensus.margin < 0.0 || self.consensus.margin > self.consensus.threshold {
            errors.push("consensus.margin must be between 0.0 and consensus.threshold");
        }
        if self.consensus.evaluation_deadline_secs == 0 {
            errors.push("consensus.evaluation_deadline_secs must be greater than 0");
        }

        if self.pool.max_concurrent_executions == 0 {
            errors.push("pool.max_concurrent_executions must be greater than 0");
        }
        if self.pool.max_agent_load == 0 {
            errors.push("pool.max_agent_load must be greater than 0");
        }
        if self.pool.success_history_window == 0 {
            errors.push("pool.success_history_window must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EnsembleError::Config(errors.join("; ")))
        }
    }
}

/// Scheduler and retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tasks allowed in flight; submissions beyond this block.
    pub max_concurrent_tasks: usize,
    /// Retries per sub-task beyond the first attempt.
    pub max_retries: u32,
    /// Per-attempt execution deadline.
    pub subtask_deadline_secs: u64,
    /// Overall per-task timeout.
    pub task_timeout_secs: u64,
    /// Capabilities whose outputs are routed through consensus before being
    /// accepted.
    pub quality_sensitive: Vec<Capability>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            max_retries: 2,
            subtask_deadline_secs: 60,
            task_timeout_secs: 300,
            quality_sensitive: vec![Capability::Review],
        }
    }
}

/// Task decomposition limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    /// Ceiling on sub-tasks per decomposition.
    pub max_subtasks: usize,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self { max_subtasks: 10 }
    }
}

/// Consensus thresholds and revision bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Weighted score at or above which an artifact is accepted.
    pub threshold: f64,
    /// Width of the Revise band below the threshold.
    pub margin: f64,
    /// Revision rounds before a Revise escalates to Reject.
    pub max_revision_rounds: u32,
    /// Deadline for collecting evaluator responses.
    pub evaluation_deadline_secs: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            margin: 0.1,
            max_revision_rounds: 2,
            evaluation_deadline_secs: 30,
        }
    }
}

impl ConsensusConfig {
    pub fn evaluation_deadline(&self) -> Duration {
        Duration::from_secs(self.evaluation_deadline_secs)
    }
}

/// Agent pool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Concurrent executions across the whole pool.
    pub max_concurrent_executions: usize,
    /// Concurrency limit per agent instance.
    pub max_agent_load: u32,
    /// Rolling success-rate window per agent.
    pub success_history_window: usize,
    /// Delay between selection retries while all instances are saturated.
    pub selection_retry_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 8,
            max_agent_load: 4,
            success_history_window: 50,
            selection_retry_delay_ms: 25,
        }
    }
}

/// Per-submission overrides for the recognized option keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    pub max_subtasks: Option<usize>,
    pub consensus_threshold: Option<f64>,
    pub max_retries: Option<u32>,
    pub task_timeout_seconds: Option<u64>,
}

impl TaskOptions {
    pub fn with_max_subtasks(mut self, value: usize) -> Self {
        self.max_subtasks = Some(value);
        self
    }

    pub fn with_consensus_threshold(mut self, value: f64) -> Self {
        self.consensus_threshold = Some(value);
        self
    }

    pub fn with_max_retries(mut self, value: u32) -> Self {
        self.max_retries = Some(value);
        self
    }

    pub fn with_task_timeout_seconds(mut self, value: u64) -> Self {
        self.task_timeout_seconds = Some(value);
        self
    }

    /// Merge with engine defaults into the effective per-task settings.
    pub fn resolve(&self, config: &EnsembleConfig) -> Result<ResolvedOptions> {
        if let Some(threshold) = self.consensus_threshold
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(EnsembleError::Config(format!(
                "consensus_threshold {} out of [0, 1]",
                threshold
            )));
        }
        if self.max_subtasks == Some(0) {
            return Err(EnsembleError::Config("max_subtasks must be > 0".into()));
        }

        Ok(ResolvedOptions {
            max_subtasks: self.max_subtasks.unwrap_or(config.decomposer.max_subtasks),
            consensus_threshold: self
                .consensus_threshold
                .unwrap_or(config.consensus.threshold),
            max_retries: self.max_retries.unwrap_or(config.scheduler.max_retries),
            task_timeout: Duration::from_secs(
                self.task_timeout_seconds
                    .unwrap_or(config.scheduler.task_timeout_secs),
            ),
        })
    }
}

/// Effective per-task settings after merging [`TaskOptions`] with defaults.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedOptions {
    pub max_subtasks: usize,
    pub consensus_threshold: f64,
    pub max_retries: u32,
    pub task_timeout: Duration,
}
