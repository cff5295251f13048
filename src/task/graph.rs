//! Sub-task dependency graph (DAG) for scheduling.
//!
//! Tracks dependency edges, readiness, and terminal state for every sub-task
//! of one task. The scheduler resolves the graph into execution waves.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::agent::AgentId;
use crate::error::{EnsembleError, Result};
use crate::task::types::{ExecutionResult, SubTask, SubTaskId, TaskStatus};

/// A node in the sub-task DAG.
#[derive(Debug, Clone)]
pub struct SubTaskNode {
    pub subtask: SubTask,
    /// Sub-tasks that depend on this one.
    pub dependents: HashSet<SubTaskId>,
    /// Accepted execution result, once completed.
    pub result: Option<ExecutionResult>,
}

impl SubTaskNode {
    fn new(subtask: SubTask) -> Self {
        Self {
            subtask,
            dependents: HashSet::new(),
            result: None,
        }
    }

    pub fn has_unmet_dependencies(&self, completed: &HashSet<SubTaskId>) -> bool {
        !self.subtask.depends_on.iter().all(|d| completed.contains(d))
    }
}

/// Directed acyclic graph over one task's sub-tasks.
#[derive(Debug, Default)]
pub struct SubTaskGraph {
    nodes: HashMap<SubTaskId, SubTaskNode>,
    completed: HashSet<SubTaskId>,
    failed: HashSet<SubTaskId>,
}

impl SubTaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a decomposition, validating every dependency edge.
    ///
    /// Fails with `CyclicDependency` if the declared edges do not form a DAG,
    /// or if an edge references an unknown sub-task.
    pub fn from_subtasks(subtasks: Vec<SubTask>) -> Result<Self> {
        let mut graph = Self::new();
        for subtask in &subtasks {
            graph
                .nodes
                .insert(subtask.id, SubTaskNode::new(subtask.clone()));
        }
        for subtask in &subtasks {
            for dep in subtask.depends_on.clone() {
                graph.add_edge(dep, subtask.id)?;
            }
        }
        Ok(graph)
    }

    /// Add a dependency edge `prerequisite -> dependent`, rejecting cycles.
    pub fn add_edge(&mut self, prerequisite: SubTaskId, dependent: SubTaskId) -> Result<()> {
        if !self.nodes.contains_key(&prerequisite) {
            return Err(EnsembleError::CyclicDependency(format!(
                "dependency on unknown sub-task {}",
                prerequisite
            )));
        }
        if !self.nodes.contains_key(&dependent) {
            return Err(EnsembleError::CyclicDependency(format!(
                "unknown dependent sub-task {}",
                dependent
            )));
        }
        if prerequisite == dependent || self.would_create_cycle(prerequisite, dependent) {
            return Err(EnsembleError::CyclicDependency(format!(
                "{} -> {}",
                prerequisite, dependent
            )));
        }

        if let Some(node) = self.nodes.get_mut(&prerequisite) {
            node.dependents.insert(dependent);
        }
        if let Some(node) = self.nodes.get_mut(&dependent)
            && !node.subtask.depends_on.contains(&prerequisite)
        {
            node.subtask.depends_on.push(prerequisite);
        }
        Ok(())
    }

    /// BFS from `dependent` along dependents edges; reaching `prerequisite`
    /// means the new edge would close a cycle.
    fn would_create_cycle(&self, prerequisite: SubTaskId, dependent: SubTaskId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([dependent]);

        while let Some(current) = queue.pop_front() {
            if current == prerequisite {
                return true;
            }
            if visited.insert(current)
                && let Some(node) = self.nodes.get(&current)
            {
                queue.extend(node.dependents.iter().copied());
            }
        }
        false
    }

    pub fn get(&self, id: &SubTaskId) -> Option<&SubTaskNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &SubTaskId) -> Option<&mut SubTaskNode> {
        self.nodes.get_mut(id)
    }

    /// Sub-tasks whose dependencies are all completed and that have not
    /// started yet, in deterministic id order.
    pub fn ready_subtasks(&self) -> Vec<SubTask> {
        let mut ready: Vec<&SubTaskNode> = self
            .nodes
            .values()
            .filter(|node| {
                node.subtask.status == TaskStatus::Pending
                    && !node.has_unmet_dependencies(&self.completed)
            })
            .collect();
        ready.sort_by_key(|node| node.subtask.id);
        ready.into_iter().map(|node| node.subtask.clone()).collect()
    }

    pub fn mark_running(&mut self, id: &SubTaskId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.subtask.status = TaskStatus::Running;
        }
    }

    /// Record which agent instance picked up the sub-task.
    pub fn assign(&mut self, id: &SubTaskId, agent: AgentId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.subtask.assigned_agent = Some(agent);
        }
    }

    pub fn mark_awaiting_consensus(&mut self, id: &SubTaskId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.subtask.status = TaskStatus::AwaitingConsensus;
        }
    }

    /// Record an accepted result and unblock dependents.
    pub fn complete(&mut self, id: &SubTaskId, result: ExecutionResult) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.subtask.status = TaskStatus::Completed;
            node.result = Some(result);
            self.completed.insert(*id);
        }
    }

    /// Record a terminal failure. An optional sub-task still satisfies its
    /// dependents; a required one leaves them permanently blocked.
    pub fn fail(&mut self, id: &SubTaskId, error: ExecutionResult) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.subtask.status = TaskStatus::Failed;
            let optional = node.subtask.optional;
            node.result = Some(error);
            self.failed.insert(*id);
            if optional {
                self.completed.insert(*id);
            }
        }
    }

    /// Reset a sub-task for another attempt.
    pub fn reset_for_retry(&mut self, id: &SubTaskId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.subtask.status = TaskStatus::Pending;
            node.subtask.assigned_agent = None;
        }
    }

    pub fn record_attempt(&mut self, id: &SubTaskId) -> u32 {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.subtask.attempts += 1;
                node.subtask.attempts
            }
            None => 0,
        }
    }

    /// All sub-tasks are terminal (optional failures count as satisfied).
    pub fn is_complete(&self) -> bool {
        self.nodes
            .values()
            .all(|node| node.subtask.status.is_terminal())
    }

    /// A required sub-task failed.
    pub fn has_required_failure(&self) -> bool {
        self.failed.iter().any(|id| {
            self.nodes
                .get(id)
                .is_some_and(|node| !node.subtask.optional)
        })
    }

    /// Whether any non-terminal sub-task can still become ready.
    ///
    /// False when pending work remains but every pending sub-task depends on
    /// a failed required sub-task.
    pub fn can_progress(&self) -> bool {
        !self.ready_subtasks().is_empty()
            || self.nodes.values().any(|node| {
                matches!(
                    node.subtask.status,
                    TaskStatus::Running | TaskStatus::AwaitingConsensus
                )
            })
    }

    /// Resolve the graph into execution waves: each wave is a set of
    /// sub-tasks whose dependencies are satisfied by earlier waves.
    pub fn waves(&self) -> Vec<Vec<SubTaskId>> {
        let mut waves = Vec::new();
        let mut remaining: HashSet<SubTaskId> = self.nodes.keys().copied().collect();
        let mut satisfied = self.completed.clone();

        while !remaining.is_empty() {
            let mut wave: Vec<SubTaskId> = remaining
                .iter()
                .copied()
                .filter(|id| {
                    self.nodes
                        .get(id)
                        .is_some_and(|node| !node.has_unmet_dependencies(&satisfied))
                })
                .collect();

            if wave.is_empty() {
                break;
            }
            wave.sort();

            for id in &wave {
                remaining.remove(id);
                satisfied.insert(*id);
            }
            waves.push(wave);
        }

        waves
    }

    /// Accepted results of completed leaf sub-tasks, in deterministic order.
    pub fn completed_results(&self) -> Vec<&ExecutionResult> {
        let mut ids: Vec<&SubTaskId> = self.completed.iter().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.subtask.status == TaskStatus::Completed)
            .filter_map(|node| node.result.as_ref())
            .collect()
    }

    /// Error payload of the most recently failed sub-task, if any.
    pub fn last_error(&self) -> Option<String> {
        let mut ids: Vec<&SubTaskId> = self.failed.iter().collect();
        ids.sort();
        ids.into_iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .filter_map(|node| node.result.as_ref())
            .filter_map(|result| result.error.clone())
            .next()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SubTaskNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
