//! Built-in debugging agent.

use async_trait::async_trait;
use serde_json::json;

use super::core::{AgentCore, AgentId, AgentRole, SpecializedAgent};
use crate::capability::Capability;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::task::{ExecutionResult, SubTask};

/// Error classes the debugger distinguishes, with its confidence in
/// diagnosing each class from a description alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    Runtime,
    Logic,
    Performance,
    Integration,
    Data,
    Unknown,
}

impl ErrorKind {
    fn classify(text: &str) -> Self {
        let contains_any = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

        if contains_any(&["crash", "exception", "null", "segfault", "panic"]) {
            Self::Runtime
        } else if contains_any(&["wrong", "incorrect", "unexpected", "bug"]) {
            Self::Logic
        } else if contains_any(&["slow", "performance", "timeout", "memory leak"]) {
            Self::Performance
        } else if contains_any(&["connection", "api", "service", "network"]) {
            Self::Integration
        } else if contains_any(&["data", "database", "query", "corrupt"]) {
            Self::Data
        } else {
            Self::Unknown
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Runtime => "runtime_error",
            Self::Logic => "logic_error",
            Self::Performance => "performance_issue",
            Self::Integration => "integration_issue",
            Self::Data => "data_issue",
            Self::Unknown => "unknown_error",
        }
    }

    fn approach(&self) -> &'static str {
        match self {
            Self::Runtime | Self::Integration | Self::Unknown => "systematic",
            Self::Logic => "hypothesis_testing",
            Self::Performance => "log_analysis",
            Self::Data => "binary_search",
        }
    }

    fn confidence(&self) -> f64 {
        match self {
            Self::Runtime => 0.9,
            Self::Logic => 0.75,
            Self::Performance => 0.7,
            Self::Integration => 0.8,
            Self::Data => 0.8,
            Self::Unknown => 0.5,
        }
    }

    fn hypotheses(&self) -> Vec<&'static str> {
        match self {
            Self::Runtime => vec![
                "uninitialized or null value dereferenced",
                "failure path missing a guard",
            ],
            Self::Logic => vec![
                "boundary condition off by one",
                "branch condition inverted",
            ],
            Self::Performance => vec![
                "work repeated inside a hot loop",
                "synchronous wait on the critical path",
            ],
            Self::Integration => vec![
                "contract mismatch between services",
                "missing retry on transient failure",
            ],
            Self::Data => vec![
                "schema drift between writer and reader",
                "partial write left inconsistent state",
            ],
            Self::Unknown => vec!["insufficient information; reproduce first"],
        }
    }
}

pub struct DebuggerAgent {
    core: AgentCore,
}

impl DebuggerAgent {
    pub fn new(index: usize) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Debugger, index),
        }
    }
}

#[async_trait]
impl SpecializedAgent for DebuggerAgent {
    fn id(&self) -> &AgentId {
        &self.core.id
    }

    fn role(&self) -> AgentRole {
        self.core.role
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        if !matches!(subtask.capability, Capability::Debugging | Capability::Coding) {
            return Err(EnsembleError::execution(
                format!("debugger cannot execute {} sub-tasks", subtask.capability),
                ExecutionCause::Unsupported,
            ));
        }
        if subtask.description.trim().is_empty() {
            return Err(EnsembleError::execution(
                "empty sub-task description",
                ExecutionCause::InvalidInput,
            ));
        }

        let text = subtask.description.to_lowercase();
        let kind = ErrorKind::classify(&text);

        let payload = json!({
            "error_type": kind.as_str(),
            "approach": kind.approach(),
            "hypotheses": kind.hypotheses(),
            "fix": {
                "summary": format!("address {} via {}", kind.as_str(), kind.approach()),
                "requires_regression_test": true,
            },
        });

        Ok(ExecutionResult::new(
            subtask.id,
            self.core.id.clone(),
            payload,
            kind.confidence(),
        ))
    }
}
