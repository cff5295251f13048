//! Core data model: tasks, sub-tasks, and execution results.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::AgentId;
use crate::capability::Capability;

/// Unique identifier for a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubTaskId(Uuid);

impl SubTaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubTaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared category of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Planning,
    Coding,
    Review,
    Debug,
    Test,
    Composite,
}

impl TaskCategory {
    /// The capability a single-capability category maps to.
    /// Composite tasks span several capabilities and have no single mapping.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Planning => Some(Capability::Planning),
            Self::Coding => Some(Capability::Coding),
            Self::Review => Some(Capability::Review),
            Self::Debug => Some(Capability::Debugging),
            Self::Test => Some(Capability::Testing),
            Self::Composite => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Coding => "coding",
            Self::Review => "review",
            Self::Debug => "debug",
            Self::Test => "test",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status shared by tasks and sub-tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Decomposed,
    Running,
    AwaitingConsensus,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A submitted task. Owned exclusively by the scheduler for its lifetime.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub category: TaskCategory,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal failure information, if the task failed.
    pub failure: Option<FailureInfo>,
    /// Mean quality score over completed leaf sub-tasks.
    pub final_score: Option<f64>,
}

impl Task {
    pub fn new(description: impl Into<String>, category: TaskCategory) -> Self {
        Self {
            id: TaskId::new(),
            description: description.into(),
            category,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            failure: None,
            final_score: None,
        }
    }
}

/// Why a task reached the Failed state.
///
/// Exposed verbatim through `get_task_status`; carries a stable kind code and
/// the last execution error payload where one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl FailureInfo {
    pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.into(),
            last_error: None,
        }
    }

    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Atomic unit of work derived from a task by decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: SubTaskId,
    pub parent: TaskId,
    pub description: String,
    pub capability: Capability,
    /// Sub-tasks that must complete before this one may run.
    #[serde(default)]
    pub depends_on: Vec<SubTaskId>,
    /// Opaque structured input for the executing agent.
    #[serde(default)]
    pub input: Value,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<AgentId>,
    #[serde(default)]
    pub attempts: u32,
    /// Complexity estimate in [0, 1]; a scheduling hint, not a constraint.
    #[serde(default)]
    pub complexity: f64,
    /// Optional sub-tasks absorb retry exhaustion instead of failing the task.
    #[serde(default)]
    pub optional: bool,
    /// Per-attempt execution deadline.
    #[serde(with = "duration_secs")]
    pub deadline: Duration,
    /// Consensus revision rounds already consumed.
    #[serde(default)]
    pub revision_round: u32,
}

impl SubTask {
    pub fn new(parent: TaskId, description: impl Into<String>, capability: Capability) -> Self {
        Self {
            id: SubTaskId::new(),
            parent,
            description: description.into(),
            capability,
            depends_on: Vec::new(),
            input: Value::Null,
            status: TaskStatus::Pending,
            assigned_agent: None,
            attempts: 0,
            complexity: 0.0,
            optional: false,
            deadline: Duration::from_secs(60),
            revision_round: 0,
        }
    }

    pub fn with_dependencies(mut self, depends_on: Vec<SubTaskId>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity.clamp(0.0, 1.0);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Output of one agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub subtask_id: SubTaskId,
    pub agent_id: AgentId,
    /// Opaque structured output: generated code, findings, test cases.
    pub payload: Value,
    /// Quality/confidence estimate in [0, 1].
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn new(subtask_id: SubTaskId, agent_id: AgentId, payload: Value, score: f64) -> Self {
        Self {
            subtask_id,
            agent_id,
            payload,
            score: score.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Findings or recommendations embedded in the payload, if any.
    pub fn findings(&self) -> Vec<String> {
        self.payload
            .get("recommendations")
            .or_else(|| self.payload.get("findings"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Read-only view of a task returned by `get_task_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub description: String,
    pub category: TaskCategory,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    pub subtasks: Vec<SubTaskSnapshot>,
}

/// Read-only view of a sub-task inside a `TaskSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskSnapshot {
    pub id: SubTaskId,
    pub description: String,
    pub capability: Capability,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_capability_mapping() {
        assert_eq!(TaskCategory::Debug.capability(), Some(Capability::Debugging));
        assert_eq!(TaskCategory::Composite.capability(), None);
    }

    #[test]
    fn test_status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::AwaitingConsensus.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_execution_result_clamps_score() {
        let sub = SubTask::new(TaskId::new(), "x", Capability::Coding);
        let result = ExecutionResult::new(sub.id, AgentId::from("coder-0"), Value::Null, 1.7);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_findings_extraction() {
        let sub = SubTask::new(TaskId::new(), "x", Capability::Review);
        let payload = serde_json::json!({
            "recommendations": ["add input validation", "reduce nesting"],
        });
        let result = ExecutionResult::new(sub.id, AgentId::from("reviewer-0"), payload, 0.8);
        assert_eq!(result.findings().len(), 2);
    }

    #[test]
    fn test_subtask_roundtrip() {
        let sub = SubTask::new(TaskId::new(), "implement parser", Capability::Coding)
            .with_complexity(0.5)
            .with_deadline(Duration::from_secs(30));
        let json = serde_json::to_string(&sub).unwrap();
        let back: SubTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.capability, Capability::Coding);
        assert_eq!(back.deadline, Duration::from_secs(30));
    }
}
