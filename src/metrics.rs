//! Metrics egress boundary.
//!
//! The engine emits one event per finished sub-task attempt and per
//! consensus verdict. Emission is fire-and-forget: a sink must not be able
//! to block scheduler progress, so the trait is synchronous and the provided
//! channel sink drops events rather than backing up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::agent::AgentId;
use crate::task::{SubTaskId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Completed,
    Failed,
    ConsensusAccept,
    ConsensusRevise,
    ConsensusReject,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::ConsensusAccept => "consensus_accept",
            Self::ConsensusRevise => "consensus_revise",
            Self::ConsensusReject => "consensus_reject",
        }
    }
}

/// One structured metrics event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub subtask_id: SubTaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub duration: Duration,
    pub outcome: EventOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Sink collaborator receiving engine events.
///
/// Implementations must return quickly and never block; heavy work belongs
/// on the far side of a channel.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: TaskEvent);
}

/// Default sink: structured tracing events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, event: TaskEvent) {
        info!(
            task = %event.task_id,
            subtask = %event.subtask_id,
            agent = event.agent_id.as_ref().map(|a| a.as_str()).unwrap_or("-"),
            duration_ms = event.duration.as_millis() as u64,
            outcome = event.outcome.as_str(),
            score = event.score.unwrap_or(-1.0),
            "metrics event"
        );
    }
}

/// Sink forwarding events over an unbounded channel.
///
/// Send failures (receiver dropped) are ignored: metrics loss is preferable
/// to scheduler stall.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl MetricsSink for ChannelSink {
    fn record(&self, event: TaskEvent) {
        let _ = self.sender.send(event);
    }
}
