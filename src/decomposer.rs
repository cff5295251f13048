//! Task decomposition: one submitted task into a DAG of sub-tasks.
//!
//! Decomposition is a planning-capability concern: the same keyword
//! heuristics the planner agent applies to a description drive how many
//! sub-tasks a task needs and how they depend on each other. The output is
//! validated here (capability availability and acyclicity) before the
//! scheduler sees it, so a bad decomposition fails the task with no partial
//! execution.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::agent::planner::{ComplexityLevel, PlannerAgent};
use crate::capability::{Capability, CapabilityRegistry};
use crate::config::DecomposerConfig;
use crate::error::{EnsembleError, Result};
use crate::task::{SubTask, SubTaskGraph, Task, TaskCategory};

/// Review aspects recognized in task descriptions. A review task naming
/// several aspects decomposes into one sub-task per aspect.
const REVIEW_ASPECTS: &[(&str, &[&str])] = &[
    ("security", &["security", "vulnerability", "auth"]),
    ("performance", &["performance", "latency", "throughput"]),
    ("maintainability", &["maintainability", "readability", "structure"]),
    ("documentation", &["documentation", "docs"]),
    ("code_quality", &["quality", "correctness", "style"]),
];

pub struct TaskDecomposer {
    config: DecomposerConfig,
    subtask_deadline: Duration,
}

impl TaskDecomposer {
    pub fn new(config: DecomposerConfig, subtask_deadline: Duration) -> Self {
        Self {
            config,
            subtask_deadline,
        }
    }

    /// Decompose a task into 1..=max_subtasks sub-tasks with declared
    /// dependencies.
    ///
    /// Fails with `InvalidTask` for an empty description, `UnknownCapability`
    /// when a produced sub-task needs a capability no registered role
    /// provides, and `CyclicDependency` when the declared edges do not form
    /// a DAG.
    pub fn decompose(
        &self,
        task: &Task,
        registry: &CapabilityRegistry,
        max_subtasks: usize,
    ) -> Result<Vec<SubTask>> {
        if task.description.trim().is_empty() {
            return Err(EnsembleError::InvalidTask(
                "task description must not be empty".into(),
            ));
        }

        let ceiling = max_subtasks.min(self.config.max_subtasks).max(1);
        let subtasks = match task.category {
            TaskCategory::Composite => self.decompose_composite(task, ceiling),
            TaskCategory::Review => self.decompose_review(task, ceiling),
            category => {
                let capability = category
                    .capability()
                    .unwrap_or(Capability::Planning);
                vec![self.leaf(task, &task.description, capability, "execute", Vec::new())]
            }
        };

        for subtask in &subtasks {
            if !registry.is_available(subtask.capability) {
                return Err(EnsembleError::UnknownCapability {
                    subtask: subtask.description.clone(),
                    capability: subtask.capability,
                });
            }
        }

        // The graph build is the acyclicity proof; the graph itself is
        // rebuilt by the scheduler from the returned set.
        SubTaskGraph::from_subtasks(subtasks.clone())?;

        debug!(
            task = %task.id,
            category = %task.category,
            count = subtasks.len(),
            "Task decomposed"
        );
        Ok(subtasks)
    }

    fn leaf(
        &self,
        task: &Task,
        description: &str,
        capability: Capability,
        phase: &str,
        depends_on: Vec<crate::task::SubTaskId>,
    ) -> SubTask {
        let complexity = PlannerAgent::assess_complexity(description).score();
        SubTask::new(task.id, description, capability)
            .with_dependencies(depends_on)
            .with_complexity(complexity)
            .with_deadline(self.subtask_deadline)
            .with_input(json!({
                "task": task.description,
                "category": task.category.as_str(),
                "phase": phase,
            }))
    }

    /// One review sub-task per aspect named in the description; a
    /// description naming none gets a single general review.
    fn decompose_review(&self, task: &Task, ceiling: usize) -> Vec<SubTask> {
        let text = task.description.to_lowercase();
        let aspects: Vec<&str> = REVIEW_ASPECTS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(aspect, _)| *aspect)
            .take(ceiling)
            .collect();

        if aspects.is_empty() {
            return vec![self.leaf(task, &task.description, Capability::Review, "review", Vec::new())];
        }

        aspects
            .into_iter()
            .map(|aspect| {
                self.leaf(
                    task,
                    &format!("review {} of: {}", aspect, task.description),
                    Capability::Review,
                    aspect,
                    Vec::new(),
                )
            })
            .collect()
    }

    /// Plan, then parallel implementation lanes, then review, then test.
    ///
    /// Lane count scales with complexity and is clamped so the whole
    /// pipeline fits under the ceiling; with a very tight ceiling the tail
    /// phases are dropped before the lanes are.
    fn decompose_composite(&self, task: &Task, ceiling: usize) -> Vec<SubTask> {
        let level = PlannerAgent::assess_complexity(&task.description);
        let wanted_lanes = match level {
            ComplexityLevel::Simple | ComplexityLevel::Moderate => 1,
            ComplexityLevel::Complex => 2,
            ComplexityLevel::VeryComplex => 3,
        };

        let include_test = ceiling >= 4;
        let include_review = ceiling >= 3;
        let overhead = 1 + usize::from(include_review) + usize::from(include_test);
        let lanes = wanted_lanes.min(ceiling.saturating_sub(overhead).max(1));

        let plan = self.leaf(
            task,
            &format!("plan: {}", task.description),
            Capability::Planning,
            "plan",
            Vec::new(),
        );
        let plan_id = plan.id;
        let mut subtasks = vec![plan];

        let mut lane_ids = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let description = if lanes == 1 {
                format!("implement: {}", task.description)
            } else {
                format!("implement part {}/{}: {}", lane + 1, lanes, task.description)
            };
            let subtask = self.leaf(task, &description, Capability::Coding, "implement", vec![plan_id]);
            lane_ids.push(subtask.id);
            subtasks.push(subtask);
        }

        let mut last_phase = lane_ids.clone();
        if include_review {
            let review = self.leaf(
                task,
                &format!("review implementation of: {}", task.description),
                Capability::Review,
                "review",
                last_phase.clone(),
            );
            last_phase = vec![review.id];
            subtasks.push(review);
        }
        if include_test {
            let test = self.leaf(
                task,
                &format!("test: {}", task.description),
                Capability::Testing,
                "test",
                last_phase,
            );
            subtasks.push(test);
        }

        subtasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRole;

    fn decomposer() -> TaskDecomposer {
        TaskDecomposer::new(DecomposerConfig::default(), Duration::from_secs(60))
    }

    fn standard_registry() -> CapabilityRegistry {
        CapabilityRegistry::standard()
    }

    #[test]
    fn test_empty_description_rejected() {
        let task = Task::new("   ", TaskCategory::Coding);
        let err = decomposer()
            .decompose(&task, &standard_registry(), 10)
            .unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidTask(_)));
    }

    #[test]
    fn test_single_capability_category_yields_one_subtask() {
        let task = Task::new("fix a null-pointer bug", TaskCategory::Debug);
        let subtasks = decomposer()
            .decompose(&task, &standard_registry(), 10)
            .unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].capability, Capability::Debugging);
        assert!(subtasks[0].depends_on.is_empty());
    }

    #[test]
    fn test_review_task_splits_by_aspect() {
        let task = Task::new(
            "review the security, performance and quality of the auth module",
            TaskCategory::Review,
        );
        let subtasks = decomposer()
            .decompose(&task, &standard_registry(), 10)
            .unwrap();
        assert_eq!(subtasks.len(), 3);
        assert!(subtasks.iter().all(|s| s.capability == Capability::Review));
    }

    #[test]
    fn test_composite_pipeline_dependencies() {
        let task = Task::new("design and build the ingestion system", TaskCategory::Composite);
        let subtasks = decomposer()
            .decompose(&task, &standard_registry(), 10)
            .unwrap();

        // complex => plan + 2 lanes + review + test
        assert_eq!(subtasks.len(), 5);
        let plan = &subtasks[0];
        assert_eq!(plan.capability, Capability::Planning);

        let lanes: Vec<_> = subtasks
            .iter()
            .filter(|s| s.capability == Capability::Coding)
            .collect();
        assert_eq!(lanes.len(), 2);
        assert!(lanes.iter().all(|s| s.depends_on == vec![plan.id]));

        let review = subtasks
            .iter()
            .find(|s| s.capability == Capability::Review)
            .unwrap();
        assert_eq!(review.depends_on.len(), 2);

        let test = subtasks
            .iter()
            .find(|s| s.capability == Capability::Testing)
            .unwrap();
        assert_eq!(test.depends_on, vec![review.id]);
    }

    #[test]
    fn test_ceiling_clamps_pipeline() {
        let task = Task::new("rewrite the storage engine for scale", TaskCategory::Composite);
        let subtasks = decomposer()
            .decompose(&task, &standard_registry(), 3)
            .unwrap();
        assert!(subtasks.len() <= 3);
        // Plan and at least one lane always survive.
        assert_eq!(subtasks[0].capability, Capability::Planning);
        assert!(subtasks.iter().any(|s| s.capability == Capability::Coding));
    }

    #[test]
    fn test_missing_capability_rejected() {
        let mut registry = CapabilityRegistry::new();
        registry.register_role(AgentRole::Reviewer);

        let task = Task::new("fix the crash", TaskCategory::Debug);
        let err = decomposer().decompose(&task, &registry, 10).unwrap_err();
        assert!(matches!(
            err,
            EnsembleError::UnknownCapability {
                capability: Capability::Debugging,
                ..
            }
        ));
    }

    #[test]
    fn test_complexity_hint_propagates() {
        let task = Task::new("redesign the cache for performance", TaskCategory::Coding);
        let subtasks = decomposer()
            .decompose(&task, &standard_registry(), 10)
            .unwrap();
        assert_eq!(subtasks[0].complexity, 1.0);
    }
}
