//! End-to-end scheduler tests: submission, wave execution, retries,
//! consensus routing, cancellation, and backpressure.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use agent_ensemble::agent::{AgentId, AgentPool, AgentRole, SpecializedAgent};
use agent_ensemble::capability::Capability;
use agent_ensemble::config::{EnsembleConfig, PoolConfig, TaskOptions};
use agent_ensemble::error::{EnsembleError, ExecutionCause, Result};
use agent_ensemble::metrics::{ChannelSink, EventOutcome, TaskEvent};
use agent_ensemble::scheduler::Scheduler;
use agent_ensemble::task::{ExecutionResult, SubTask, TaskCategory, TaskId, TaskStatus};

/// Agent producing a fixed score for anything it supports.
struct FixedAgent {
    id: AgentId,
    role: AgentRole,
    capabilities: BTreeSet<Capability>,
    score: f64,
}

impl FixedAgent {
    fn new(id: &str, role: AgentRole, capabilities: &[Capability], score: f64) -> Arc<Self> {
        Arc::new(Self {
            id: AgentId::from(id),
            role,
            capabilities: capabilities.iter().copied().collect(),
            score,
        })
    }
}

#[async_trait]
impl SpecializedAgent for FixedAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        self.capabilities.clone()
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        Ok(ExecutionResult::new(
            subtask.id,
            self.id.clone(),
            serde_json::json!({ "produced_by": self.id.as_str() }),
            self.score,
        ))
    }
}

/// Evaluation-only reviewer: scores artifacts, refuses to produce.
struct EvaluatorAgent {
    id: AgentId,
    score: f64,
}

impl EvaluatorAgent {
    fn new(id: &str, score: f64) -> Arc<Self> {
        Arc::new(Self {
            id: AgentId::from(id),
            score,
        })
    }
}

#[async_trait]
impl SpecializedAgent for EvaluatorAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn role(&self) -> AgentRole {
        AgentRole::Reviewer
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        if subtask.input.get("artifact").is_none() {
            return Err(EnsembleError::execution(
                "evaluation-only reviewer cannot produce artifacts",
                ExecutionCause::Unsupported,
            ));
        }
        Ok(ExecutionResult::new(
            subtask.id,
            self.id.clone(),
            serde_json::json!({ "recommendations": ["tighten error handling"] }),
            self.score,
        ))
    }
}

/// Agent sleeping past every deadline.
struct SlowAgent {
    id: AgentId,
    role: AgentRole,
    delay: Duration,
}

#[async_trait]
impl SpecializedAgent for SlowAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        tokio::time::sleep(self.delay).await;
        Ok(ExecutionResult::new(
            subtask.id,
            self.id.clone(),
            Value::Null,
            0.9,
        ))
    }
}

/// Agent that never returns; cancellation has to reap it.
struct HangingAgent {
    id: AgentId,
    role: AgentRole,
}

#[async_trait]
impl SpecializedAgent for HangingAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    async fn execute(&self, _subtask: &SubTask) -> Result<ExecutionResult> {
        std::future::pending::<()>().await;
        unreachable!("pending future resolved");
    }
}

fn pool_of(agents: Vec<Arc<dyn SpecializedAgent>>) -> Arc<AgentPool> {
    let pool = Arc::new(AgentPool::new(PoolConfig::default()));
    for agent in agents {
        pool.register(agent).unwrap();
    }
    pool
}

async fn wait_terminal(
    scheduler: &Arc<Scheduler>,
    task_id: &TaskId,
) -> agent_ensemble::task::TaskSnapshot {
    wait_terminal_within(scheduler, task_id, Duration::from_secs(10)).await
}

/// Variant for paused-clock tests, where virtual time outruns the default
/// polling budget.
async fn wait_terminal_within(
    scheduler: &Arc<Scheduler>,
    task_id: &TaskId,
    budget: Duration,
) -> agent_ensemble::task::TaskSnapshot {
    tokio::time::timeout(budget, async {
        loop {
            if let Some(snapshot) = scheduler.get_task_status(task_id)
                && snapshot.status.is_terminal()
            {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not reach a terminal state in time")
}

fn drain_events(receiver: &mut tokio::sync::mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

mod single_agent_flow {
    use super::*;

    #[tokio::test]
    async fn debug_task_completes_without_consensus() {
        // Scenario: one debugger, one sub-task, score 0.9, no consensus
        // routing for debug-capability output.
        let pool = pool_of(vec![FixedAgent::new(
            "debugger-0",
            AgentRole::Debugger,
            &[Capability::Debugging],
            0.9,
        )]);
        let (sink, mut events) = ChannelSink::new();
        let scheduler =
            Scheduler::with_metrics_sink(EnsembleConfig::default(), pool, Arc::new(sink)).unwrap();

        let task_id = scheduler
            .submit_task(
                "fix a null-pointer bug",
                TaskCategory::Debug,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.final_score, Some(0.9));
        assert_eq!(snapshot.subtasks.len(), 1);
        assert_eq!(snapshot.subtasks[0].attempts, 1);
        assert_eq!(
            snapshot.subtasks[0].assigned_agent,
            Some(AgentId::from("debugger-0"))
        );

        let events = drain_events(&mut events);
        let completed: Vec<_> = events
            .iter()
            .filter(|e| e.outcome == EventOutcome::Completed)
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].score, Some(0.9));
        assert!(
            !events
                .iter()
                .any(|e| e.outcome == EventOutcome::ConsensusAccept),
            "debug output must not be routed through consensus"
        );
    }

    #[tokio::test]
    async fn empty_description_is_rejected_at_submission() {
        let scheduler = Scheduler::with_standard_ensemble(EnsembleConfig::default()).unwrap();
        let err = scheduler
            .submit_task("   ", TaskCategory::Coding, TaskOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidTask(_)));
    }
}

mod consensus_routing {
    use super::*;

    fn review_pool(evaluator_scores: (f64, f64)) -> Arc<AgentPool> {
        pool_of(vec![
            FixedAgent::new("author-0", AgentRole::Coder, &[Capability::Review], 0.5),
            EvaluatorAgent::new("reviewer-0", evaluator_scores.0),
            EvaluatorAgent::new("reviewer-1", evaluator_scores.1),
        ])
    }

    #[tokio::test]
    async fn accepted_consensus_completes_the_task() {
        // Scenario: evaluators score {0.6, 0.9} at equal weight 1.0;
        // weighted 0.75 >= 0.7 accepts.
        let scheduler =
            Scheduler::new(EnsembleConfig::default(), review_pool((0.6, 0.9))).unwrap();

        let task_id = scheduler
            .submit_task(
                "review the parser module",
                TaskCategory::Review,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        let final_score = snapshot.final_score.unwrap();
        assert!(
            (final_score - 0.75).abs() < 1e-9,
            "weighted consensus score expected 0.75, got {}",
            final_score
        );
    }

    #[tokio::test]
    async fn rejected_consensus_fails_the_task() {
        // Scenario: evaluators score {0.4, 0.5}; weighted 0.45 is below
        // threshold - margin, and no alternate producer succeeds.
        let (sink, mut events) = ChannelSink::new();
        let scheduler = Scheduler::with_metrics_sink(
            EnsembleConfig::default(),
            review_pool((0.4, 0.5)),
            Arc::new(sink),
        )
        .unwrap();

        let task_id = scheduler
            .submit_task(
                "review the parser module",
                TaskCategory::Review,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Failed);
        let failure = snapshot.failure.unwrap();
        assert_eq!(failure.kind, "consensus_rejected");

        let events = drain_events(&mut events);
        assert!(
            events
                .iter()
                .any(|e| e.outcome == EventOutcome::ConsensusReject),
            "a reject verdict must be emitted to the metrics sink"
        );
    }

    #[tokio::test]
    async fn adversarial_revise_band_terminates_within_budget() {
        // Evaluators pinned just inside the revise band: every round asks
        // for a revision. The loop must burn its budget and reject rather
        // than spin.
        let (sink, mut events) = ChannelSink::new();
        let scheduler = Scheduler::with_metrics_sink(
            EnsembleConfig::default(),
            review_pool((0.65, 0.65)),
            Arc::new(sink),
        )
        .unwrap();

        let task_id = scheduler
            .submit_task(
                "review the parser module",
                TaskCategory::Review,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.failure.unwrap().kind, "consensus_rejected");

        let events = drain_events(&mut events);
        let revises = events
            .iter()
            .filter(|e| e.outcome == EventOutcome::ConsensusRevise)
            .count();
        assert_eq!(
            revises, 2,
            "exactly max_revision_rounds revision rounds must run"
        );
    }

    #[tokio::test]
    async fn higher_threshold_option_rejects_borderline_artifact() {
        // Same {0.6, 0.9} evaluators, but the per-task threshold of 0.9
        // puts 0.75 under threshold - margin: reject.
        let scheduler =
            Scheduler::new(EnsembleConfig::default(), review_pool((0.6, 0.9))).unwrap();

        let task_id = scheduler
            .submit_task(
                "review the parser module",
                TaskCategory::Review,
                TaskOptions::default().with_consensus_threshold(0.9),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.failure.unwrap().kind, "consensus_rejected");
    }
}

mod retries_and_deadlines {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_exhausts_retries_and_fails_the_task() {
        // Scenario: every attempt exceeds the per-sub-task deadline; with
        // max_retries = 2 the third failure is terminal and three attempts
        // are recorded.
        let pool = Arc::new(AgentPool::new(PoolConfig::default()));
        for index in 0..2 {
            pool.register(Arc::new(SlowAgent {
                id: AgentId::instance(AgentRole::Debugger, index),
                role: AgentRole::Debugger,
                delay: Duration::from_secs(240),
            }))
            .unwrap();
        }
        let scheduler = Scheduler::new(EnsembleConfig::default(), pool).unwrap();

        let task_id = scheduler
            .submit_task(
                "fix the crash in the importer",
                TaskCategory::Debug,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot =
            wait_terminal_within(&scheduler, &task_id, Duration::from_secs(3600)).await;
        assert_eq!(snapshot.status, TaskStatus::Failed);
        let failure = snapshot.failure.unwrap();
        assert_eq!(failure.kind, "execution_error");
        assert!(failure.last_error.unwrap().contains("deadline"));
        assert_eq!(snapshot.subtasks[0].attempts, 3);
    }

    #[tokio::test]
    async fn retry_moves_to_a_different_agent() {
        // First-choice agent always fails; the retry must land on the
        // other instance and succeed.
        struct FailingAgent {
            id: AgentId,
        }

        #[async_trait]
        impl SpecializedAgent for FailingAgent {
            fn id(&self) -> &AgentId {
                &self.id
            }

            fn role(&self) -> AgentRole {
                AgentRole::Debugger
            }

            async fn execute(&self, _subtask: &SubTask) -> Result<ExecutionResult> {
                Err(EnsembleError::execution(
                    "simulated internal fault",
                    ExecutionCause::Internal,
                ))
            }
        }

        let pool = Arc::new(AgentPool::new(PoolConfig::default()));
        // "debugger-0" sorts first and is picked first.
        pool.register(Arc::new(FailingAgent {
            id: AgentId::from("debugger-0"),
        }))
        .unwrap();
        pool.register(FixedAgent::new(
            "debugger-1",
            AgentRole::Debugger,
            &[Capability::Debugging],
            0.8,
        ))
        .unwrap();
        let scheduler = Scheduler::new(EnsembleConfig::default(), pool).unwrap();

        let task_id = scheduler
            .submit_task(
                "fix the crash in the importer",
                TaskCategory::Debug,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.subtasks[0].attempts, 2);
        assert_eq!(
            snapshot.subtasks[0].assigned_agent,
            Some(AgentId::from("debugger-1"))
        );
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_is_idempotent_and_terminal() {
        let pool = pool_of(vec![Arc::new(HangingAgent {
            id: AgentId::from("debugger-0"),
            role: AgentRole::Debugger,
        })]);
        let scheduler = Scheduler::new(EnsembleConfig::default(), pool).unwrap();

        let task_id = scheduler
            .submit_task(
                "fix the crash in the importer",
                TaskCategory::Debug,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        assert!(scheduler.cancel_task(&task_id));
        assert!(!scheduler.cancel_task(&task_id));

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.failure.unwrap().kind, "cancelled");

        // Still false after the task is terminal.
        assert!(!scheduler.cancel_task(&task_id));
    }

    #[tokio::test]
    async fn cancel_unknown_task_returns_false() {
        let scheduler = Scheduler::with_standard_ensemble(EnsembleConfig::default()).unwrap();
        assert!(!scheduler.cancel_task(&TaskId::new()));
    }

    #[tokio::test]
    async fn cancelling_one_task_leaves_others_running() {
        let pool = pool_of(vec![
            Arc::new(HangingAgent {
                id: AgentId::from("debugger-0"),
                role: AgentRole::Debugger,
            }),
            FixedAgent::new("coder-0", AgentRole::Coder, &[Capability::Coding], 0.85),
        ]);
        let scheduler = Scheduler::new(EnsembleConfig::default(), pool).unwrap();

        let hanging = scheduler
            .submit_task("fix the crash", TaskCategory::Debug, TaskOptions::default())
            .await
            .unwrap();
        let healthy = scheduler
            .submit_task(
                "implement the config parser",
                TaskCategory::Coding,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        assert!(scheduler.cancel_task(&hanging));

        let snapshot = wait_terminal(&scheduler, &healthy).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.final_score, Some(0.85));
    }
}

mod backpressure {
    use super::*;

    #[tokio::test]
    async fn submissions_block_at_the_concurrency_limit() {
        let mut config = EnsembleConfig::default();
        config.scheduler.max_concurrent_tasks = 1;

        let pool = pool_of(vec![Arc::new(HangingAgent {
            id: AgentId::from("debugger-0"),
            role: AgentRole::Debugger,
        })]);
        let scheduler = Scheduler::new(config, pool).unwrap();

        let first = scheduler
            .submit_task("fix the crash", TaskCategory::Debug, TaskOptions::default())
            .await
            .unwrap();

        // The slot is taken; a second submission must not be admitted.
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            scheduler.submit_task("fix another crash", TaskCategory::Debug, TaskOptions::default()),
        )
        .await;
        assert!(blocked.is_err(), "second submission should block");

        // Freeing the slot admits the next submission.
        assert!(scheduler.cancel_task(&first));
        wait_terminal(&scheduler, &first).await;

        let second = tokio::time::timeout(
            Duration::from_secs(5),
            scheduler.submit_task("fix another crash", TaskCategory::Debug, TaskOptions::default()),
        )
        .await
        .expect("submission should be admitted after a slot frees")
        .unwrap();
        scheduler.cancel_task(&second);
    }
}

mod ensemble {
    use super::*;

    #[tokio::test]
    async fn standard_ensemble_reports_status() {
        let scheduler = Scheduler::with_standard_ensemble(EnsembleConfig::default()).unwrap();
        let status = scheduler.ensemble_status();

        assert_eq!(status.agents.len(), 7);
        assert_eq!(status.active_tasks, 0);
        assert_eq!(status.max_concurrent_tasks, 5);
        assert!((status.consensus_threshold - 0.7).abs() < 1e-9);
        assert!(status
            .agents
            .iter()
            .any(|a| a.role == AgentRole::Planner && a.success_rate == 1.0));
    }

    #[tokio::test]
    async fn composite_task_runs_the_full_pipeline() {
        let scheduler = Scheduler::with_standard_ensemble(EnsembleConfig::default()).unwrap();

        let task_id = scheduler
            .submit_task(
                "implement a parser for the config format",
                TaskCategory::Composite,
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = wait_terminal(&scheduler, &task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        // plan -> implement -> review -> test
        assert_eq!(snapshot.subtasks.len(), 4);
        assert!(snapshot.final_score.unwrap() > 0.7);
        assert!(snapshot
            .subtasks
            .iter()
            .all(|s| s.status == TaskStatus::Completed));
    }
}
