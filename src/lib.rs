//! Orchestration and consensus engine for a fixed ensemble of specialized
//! task-executing agents.
//!
//! A submitted task is decomposed into a DAG of sub-tasks, scheduled in
//! waves onto capability-matched agents, and quality-sensitive results are
//! merged through weighted consensus into a single accepted outcome.
//!
//! Transport, persistence, and real generative backends live outside this
//! crate; the boundary is [`Scheduler::submit_task`] /
//! [`Scheduler::get_task_status`] / [`Scheduler::cancel_task`] on one side
//! and the [`agent::SpecializedAgent`] trait plus [`metrics::MetricsSink`]
//! on the other.

pub mod agent;
pub mod capability;
pub mod config;
pub mod consensus;
pub mod decomposer;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod task;

pub use agent::{
    AgentDescriptor, AgentId, AgentPool, AgentRole, AgentStatusSnapshot, CoderAgent,
    DebuggerAgent, PlannerAgent, ReviewerAgent, SpecializedAgent, TesterAgent,
};
pub use capability::{Capability, CapabilityRegistry};
pub use config::{EnsembleConfig, TaskOptions};
pub use consensus::{
    ConsensusDecision, ConsensusEngine, ConsensusRequest, ConsensusResult, Evaluation,
};
pub use decomposer::TaskDecomposer;
pub use error::{EnsembleError, ExecutionCause, Result};
pub use metrics::{ChannelSink, EventOutcome, MetricsSink, TaskEvent, TracingSink};
pub use scheduler::{EnsembleStatus, Scheduler};
pub use task::{
    ExecutionResult, FailureInfo, SubTask, SubTaskId, Task, TaskCategory, TaskId, TaskSnapshot,
    TaskStatus,
};
