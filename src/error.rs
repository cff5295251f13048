use thiserror::Error;

use crate::agent::AgentId;
use crate::capability::Capability;
use crate::task::TaskId;

/// Cause classification for a failed agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCause {
    InvalidInput,
    Timeout,
    Unsupported,
    Cancelled,
    Internal,
}

impl ExecutionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Timeout => "timeout",
            Self::Unsupported => "unsupported",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Unknown capability {capability} required by sub-task '{subtask}'")]
    UnknownCapability {
        subtask: String,
        capability: Capability,
    },

    #[error("Cyclic dependency in decomposition: {0}")]
    CyclicDependency(String),

    #[error("Execution failed ({}): {reason}", .cause.as_str())]
    Execution {
        reason: String,
        cause: ExecutionCause,
    },

    #[error("No evaluator responded before the evaluation deadline")]
    InsufficientEvaluators,

    #[error("Task timed out after {0}s")]
    TaskTimeout(u64),

    #[error("Consensus rejected the artifact (score {score:.2})")]
    ConsensusRejected { score: f64 },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("No agent available for capability {0}")]
    AgentUnavailable(Capability),

    #[error("Agent already registered: {0}")]
    AgentAlreadyRegistered(AgentId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EnsembleError {
    pub fn execution(reason: impl Into<String>, cause: ExecutionCause) -> Self {
        Self::Execution {
            reason: reason.into(),
            cause,
        }
    }

    /// Stable machine-readable code surfaced in task snapshots.
    ///
    /// Callers querying a failed task see this code plus the last execution
    /// error payload, never a bare backtrace.
    pub fn kind_code(&self) -> &'static str {
        match self {
            Self::InvalidTask(_) => "invalid_task",
            Self::UnknownCapability { .. } => "unknown_capability",
            Self::CyclicDependency(_) => "cyclic_dependency",
            Self::Execution { .. } => "execution_error",
            Self::InsufficientEvaluators => "insufficient_evaluators",
            Self::TaskTimeout(_) => "task_timeout",
            Self::ConsensusRejected { .. } => "consensus_rejected",
            Self::TaskNotFound(_) => "task_not_found",
            Self::AgentUnavailable(_) => "agent_unavailable",
            Self::AgentAlreadyRegistered(_) => "agent_already_registered",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Toml(_) => "toml_error",
        }
    }

    /// Whether the scheduler may retry the sub-task that produced this error.
    ///
    /// Cancellation is never retried; everything else at the execution level
    /// consumes one attempt from the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Execution {
                cause: ExecutionCause::InvalidInput
                    | ExecutionCause::Timeout
                    | ExecutionCause::Unsupported
                    | ExecutionCause::Internal,
                ..
            } | Self::AgentUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EnsembleError>;
