//! Scheduler / agent manager: owns tasks for their lifetime, resolves the
//! sub-task graph into execution waves, and routes quality-sensitive results
//! through consensus.
//!
//! Concurrency model: each task runs in its own spawned driver. Workers for
//! one wave execute concurrently and report back over an mpsc channel; the
//! driver is the single writer of the task's state, so concurrent
//! completions never interleave their merges. Suspension happens at exactly
//! two points, awaiting an agent's execute call and collecting evaluator
//! responses, and both are raced against the task's cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{
    AgentId, AgentPool, AgentStatusSnapshot, Attempt, CoderAgent, DebuggerAgent, PlannerAgent,
    ReviewerAgent, TesterAgent,
};
use crate::capability::Capability;
use crate::config::{EnsembleConfig, ResolvedOptions, TaskOptions};
use crate::consensus::{
    evaluator_weight, ConsensusDecision, ConsensusEngine, ConsensusRequest, Evaluation,
};
use crate::decomposer::TaskDecomposer;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::metrics::{EventOutcome, MetricsSink, TaskEvent, TracingSink};
use crate::task::{
    ExecutionResult, FailureInfo, SubTask, SubTaskGraph, SubTaskSnapshot, Task, TaskCategory,
    TaskId, TaskSnapshot, TaskStatus,
};

/// Mutable per-task state. The driver owns all writes; snapshot reads take
/// the same lock briefly.
struct TaskState {
    task: Task,
    graph: SubTaskGraph,
    cancel_requested: bool,
}

struct TaskHandle {
    state: Mutex<TaskState>,
    cancel: CancellationToken,
}

/// Report sent from a worker back to the driver.
struct AttemptReport {
    subtask: SubTask,
    exclude: Vec<AgentId>,
    attempt: Result<Attempt>,
}

/// A retry the driver decided on while merging a failed attempt.
struct Redispatch {
    subtask: SubTask,
    exclude: Vec<AgentId>,
}

/// Snapshot of the whole ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleStatus {
    pub agents: Vec<AgentStatusSnapshot>,
    pub active_tasks: usize,
    pub total_tasks: usize,
    pub max_concurrent_tasks: usize,
    pub consensus_threshold: f64,
}

pub struct Scheduler {
    config: EnsembleConfig,
    pool: Arc<AgentPool>,
    engine: ConsensusEngine,
    sink: Arc<dyn MetricsSink>,
    tasks: RwLock<HashMap<TaskId, Arc<TaskHandle>>>,
    /// Backpressure: one permit per in-flight task.
    submissions: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(config: EnsembleConfig, pool: Arc<AgentPool>) -> Result<Arc<Self>> {
        config.validate()?;
        let max_tasks = config.scheduler.max_concurrent_tasks.max(1);
        Ok(Arc::new(Self {
            config,
            pool,
            engine: ConsensusEngine::new(),
            sink: Arc::new(TracingSink),
            tasks: RwLock::new(HashMap::new()),
            submissions: Arc::new(Semaphore::new(max_tasks)),
        }))
    }

    pub fn with_metrics_sink(
        config: EnsembleConfig,
        pool: Arc<AgentPool>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Arc<Self>> {
        let scheduler = Self::new(config, pool)?;
        // Arc::new_cyclic is not needed; rebuild with the sink swapped in.
        let inner = Arc::try_unwrap(scheduler).map_err(|_| {
            EnsembleError::Config("scheduler unexpectedly shared during construction".into())
        })?;
        Ok(Arc::new(Self { sink, ..inner }))
    }

    /// Scheduler over the standard built-in ensemble: one planner, two
    /// coders, two reviewers, one debugger, one tester.
    pub fn with_standard_ensemble(config: EnsembleConfig) -> Result<Arc<Self>> {
        let pool = Arc::new(AgentPool::new(config.pool.clone()));
        pool.register(Arc::new(PlannerAgent::new(0)))?;
        pool.register(Arc::new(CoderAgent::new(0)))?;
        pool.register(Arc::new(CoderAgent::new(1)))?;
        pool.register(Arc::new(ReviewerAgent::new(0)))?;
        pool.register(Arc::new(ReviewerAgent::new(1)))?;
        pool.register(Arc::new(DebuggerAgent::new(0)))?;
        pool.register(Arc::new(TesterAgent::new(0)))?;
        Self::new(config, pool)
    }

    pub fn pool(&self) -> &Arc<AgentPool> {
        &self.pool
    }

    /// Submit a task for execution.
    ///
    /// Blocks while `max_concurrent_tasks` tasks are already in flight
    /// (backpressure, never an unbounded queue) and returns the task id once
    /// the driver is spawned.
    pub async fn submit_task(
        self: &Arc<Self>,
        description: impl Into<String>,
        category: TaskCategory,
        options: TaskOptions,
    ) -> Result<TaskId> {
        let options = options.resolve(&self.config)?;
        let description = description.into();
        if description.trim().is_empty() {
            return Err(EnsembleError::InvalidTask(
                "task description must not be empty".into(),
            ));
        }

        let permit = self
            .submissions
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EnsembleError::Config("scheduler shut down".into()))?;

        let task = Task::new(description, category);
        let task_id = task.id;
        let handle = Arc::new(TaskHandle {
            state: Mutex::new(TaskState {
                task,
                graph: SubTaskGraph::new(),
                cancel_requested: false,
            }),
            cancel: CancellationToken::new(),
        });
        self.tasks.write().insert(task_id, Arc::clone(&handle));

        info!(task = %task_id, category = %category, "Task submitted");
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_task(handle, options, permit).await;
        });
        Ok(task_id)
    }

    /// Read-only snapshot of a task.
    pub fn get_task_status(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        let tasks = self.tasks.read();
        let handle = tasks.get(task_id)?;
        let state = handle.state.lock();

        let mut subtasks: Vec<SubTaskSnapshot> = state
            .graph
            .nodes()
            .map(|node| SubTaskSnapshot {
                id: node.subtask.id,
                description: node.subtask.description.clone(),
                capability: node.subtask.capability,
                status: node.subtask.status,
                attempts: node.subtask.attempts,
                assigned_agent: node.subtask.assigned_agent.clone(),
                score: node.result.as_ref().map(|r| r.score),
            })
            .collect();
        subtasks.sort_by_key(|s| s.id);

        Some(TaskSnapshot {
            id: state.task.id,
            description: state.task.description.clone(),
            category: state.task.category,
            status: state.task.status,
            created_at: state.task.created_at,
            completed_at: state.task.completed_at,
            failure: state.task.failure.clone(),
            final_score: state.task.final_score,
            subtasks,
        })
    }

    /// Cancel a task. Idempotent: the first call on a live task returns
    /// true; repeated calls and calls on terminal or unknown tasks return
    /// false.
    pub fn cancel_task(&self, task_id: &TaskId) -> bool {
        let tasks = self.tasks.read();
        let Some(handle) = tasks.get(task_id) else {
            return false;
        };
        {
            let mut state = handle.state.lock();
            if state.task.status.is_terminal() || state.cancel_requested {
                return false;
            }
            state.cancel_requested = true;
        }
        handle.cancel.cancel();
        info!(task = %task_id, "Task cancellation requested");
        true
    }

    /// Snapshot of every agent descriptor plus task counts.
    pub fn ensemble_status(&self) -> EnsembleStatus {
        let tasks = self.tasks.read();
        let active = tasks
            .values()
            .filter(|handle| !handle.state.lock().task.status.is_terminal())
            .count();
        EnsembleStatus {
            agents: self.pool.snapshots(),
            active_tasks: active,
            total_tasks: tasks.len(),
            max_concurrent_tasks: self.config.scheduler.max_concurrent_tasks,
            consensus_threshold: self.config.consensus.threshold,
        }
    }

    /// Drive a task to a terminal state. Holds the submission permit for the
    /// task's whole lifetime.
    async fn run_task(
        &self,
        handle: Arc<TaskHandle>,
        options: ResolvedOptions,
        _permit: OwnedSemaphorePermit,
    ) {
        let task_id = handle.state.lock().task.id;

        let outcome = tokio::select! {
            _ = handle.cancel.cancelled() => Err(EnsembleError::execution(
                "task cancelled by caller",
                ExecutionCause::Cancelled,
            )),
            driven = tokio::time::timeout(options.task_timeout, self.drive(&handle, &options)) => {
                match driven {
                    Ok(inner) => inner,
                    Err(_) => Err(EnsembleError::TaskTimeout(options.task_timeout.as_secs())),
                }
            }
        };
        // Stop any in-flight workers before sealing the terminal state.
        handle.cancel.cancel();

        let mut state = handle.state.lock();
        state.task.completed_at = Some(Utc::now());
        match outcome {
            Ok(final_score) => {
                state.task.status = TaskStatus::Completed;
                state.task.final_score = Some(final_score);
                info!(task = %task_id, score = final_score, "Task completed");
            }
            Err(error) => {
                let kind = match &error {
                    EnsembleError::Execution {
                        cause: ExecutionCause::Cancelled,
                        ..
                    } => "cancelled",
                    other => other.kind_code(),
                };
                let mut failure = FailureInfo::new(kind, error.to_string());
                if let Some(last_error) = state.graph.last_error() {
                    failure = failure.with_last_error(last_error);
                }
                state.task.status = TaskStatus::Failed;
                state.task.failure = Some(failure);
                warn!(task = %task_id, error = %error, "Task failed");
            }
        }
    }

    /// Decompose, then run waves until the graph is complete.
    async fn drive(&self, handle: &Arc<TaskHandle>, options: &ResolvedOptions) -> Result<f64> {
        let task = handle.state.lock().task.clone();
        let registry = self.pool.registry();
        let decomposer = TaskDecomposer::new(
            self.config.decomposer.clone(),
            Duration::from_secs(self.config.scheduler.subtask_deadline_secs),
        );
        let subtasks = decomposer.decompose(&task, &registry, options.max_subtasks)?;
        let graph = SubTaskGraph::from_subtasks(subtasks)?;

        {
            let mut state = handle.state.lock();
            state.graph = graph;
            state.task.status = TaskStatus::Decomposed;
        }
        debug!(task = %task.id, "Decomposition accepted");
        handle.state.lock().task.status = TaskStatus::Running;

        let (tx, mut rx) = mpsc::channel::<AttemptReport>(64);

        loop {
            let ready = handle.state.lock().graph.ready_subtasks();
            if ready.is_empty() {
                let state = handle.state.lock();
                if state.graph.is_complete() {
                    break;
                }
                return Err(EnsembleError::execution(
                    "no runnable sub-task remains but the graph is incomplete",
                    ExecutionCause::Internal,
                ));
            }

            let mut inflight = 0usize;
            for subtask in ready {
                self.dispatch(handle, subtask, Vec::new(), &tx);
                inflight += 1;
            }

            // Single-writer merge of this wave's completions. A retry
            // re-enters the wave so dependents stay blocked until the
            // sub-task truly settles.
            while inflight > 0 {
                let Some(report) = rx.recv().await else {
                    return Err(EnsembleError::execution(
                        "worker channel closed",
                        ExecutionCause::Internal,
                    ));
                };
                inflight -= 1;
                if let Some(redispatch) = self.merge(handle, report, options).await? {
                    self.dispatch(handle, redispatch.subtask, redispatch.exclude, &tx);
                    inflight += 1;
                }
            }
        }

        let state = handle.state.lock();
        let scores: Vec<f64> = state
            .graph
            .completed_results()
            .iter()
            .map(|result| result.score)
            .collect();
        if scores.is_empty() {
            return Ok(0.0);
        }
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Spawn a worker for one attempt.
    fn dispatch(
        &self,
        handle: &Arc<TaskHandle>,
        subtask: SubTask,
        exclude: Vec<AgentId>,
        tx: &mpsc::Sender<AttemptReport>,
    ) {
        let attempt_no = {
            let mut state = handle.state.lock();
            state.graph.mark_running(&subtask.id);
            state.graph.record_attempt(&subtask.id)
        };
        debug!(
            subtask = %subtask.id,
            capability = %subtask.capability,
            attempt = attempt_no,
            "Dispatching sub-task"
        );

        let pool = Arc::clone(&self.pool);
        let cancel = handle.cancel.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let attempt = pool.execute(&subtask, &exclude, None, &cancel).await;
            let _ = tx
                .send(AttemptReport {
                    subtask,
                    exclude,
                    attempt,
                })
                .await;
        });
    }

    /// Merge one worker report into the task state.
    ///
    /// Returns a redispatch when the failed attempt still has retry budget.
    async fn merge(
        &self,
        handle: &Arc<TaskHandle>,
        report: AttemptReport,
        options: &ResolvedOptions,
    ) -> Result<Option<Redispatch>> {
        let AttemptReport {
            subtask,
            exclude,
            attempt,
        } = report;
        let task_id = subtask.parent;

        let (agent_id, duration, outcome) = match attempt {
            Ok(attempt) => (Some(attempt.agent_id), attempt.duration, attempt.outcome),
            Err(error) => (None, Duration::ZERO, Err(error)),
        };
        if let Some(agent) = &agent_id {
            handle.state.lock().graph.assign(&subtask.id, agent.clone());
        }

        match outcome {
            Ok(result) => {
                if self.is_quality_sensitive(subtask.capability) {
                    {
                        let mut state = handle.state.lock();
                        state.graph.mark_awaiting_consensus(&subtask.id);
                        state.task.status = TaskStatus::AwaitingConsensus;
                    }
                    let accepted = match self
                        .resolve_consensus(handle, &subtask, result, options)
                        .await
                    {
                        Ok(accepted) => accepted,
                        Err(error) => {
                            let record = ExecutionResult::new(
                                subtask.id,
                                agent_id.unwrap_or_else(|| AgentId::from("unassigned")),
                                Value::Null,
                                0.0,
                            )
                            .with_error(error.to_string());
                            handle.state.lock().graph.fail(&subtask.id, record);
                            return Err(error);
                        }
                    };
                    self.emit(
                        task_id,
                        &subtask,
                        agent_id.as_ref(),
                        duration,
                        EventOutcome::Completed,
                        Some(accepted.score),
                    );
                    let mut state = handle.state.lock();
                    state.graph.complete(&subtask.id, accepted);
                    state.task.status = TaskStatus::Running;
                } else {
                    self.emit(
                        task_id,
                        &subtask,
                        agent_id.as_ref(),
                        duration,
                        EventOutcome::Completed,
                        Some(result.score),
                    );
                    handle.state.lock().graph.complete(&subtask.id, result);
                }
                Ok(None)
            }
            Err(error) => {
                self.emit(
                    task_id,
                    &subtask,
                    agent_id.as_ref(),
                    duration,
                    EventOutcome::Failed,
                    None,
                );
                self.absorb_failure(handle, subtask, exclude, agent_id, error, options)
            }
        }
    }

    /// Retry, absorb (optional sub-task), or fail the task.
    fn absorb_failure(
        &self,
        handle: &Arc<TaskHandle>,
        subtask: SubTask,
        mut exclude: Vec<AgentId>,
        agent_id: Option<AgentId>,
        error: EnsembleError,
        options: &ResolvedOptions,
    ) -> Result<Option<Redispatch>> {
        // Cancellation propagates immediately; it is not a retryable fault.
        if matches!(
            error,
            EnsembleError::Execution {
                cause: ExecutionCause::Cancelled,
                ..
            }
        ) {
            return Err(error);
        }

        let attempts = handle
            .state
            .lock()
            .graph
            .get(&subtask.id)
            .map(|node| node.subtask.attempts)
            .unwrap_or(0);

        if error.is_retryable() && attempts <= options.max_retries {
            // Prefer a different qualifying instance on retry.
            if let Some(agent) = agent_id
                && !exclude.contains(&agent)
            {
                exclude.push(agent);
            }
            warn!(
                subtask = %subtask.id,
                attempts,
                max_retries = options.max_retries,
                error = %error,
                "Retrying sub-task"
            );
            handle.state.lock().graph.reset_for_retry(&subtask.id);
            return Ok(Some(Redispatch { subtask, exclude }));
        }

        let failure_record = ExecutionResult::new(
            subtask.id,
            agent_id.unwrap_or_else(|| AgentId::from("unassigned")),
            Value::Null,
            0.0,
        )
        .with_error(error.to_string());

        if subtask.optional {
            warn!(
                subtask = %subtask.id,
                error = %error,
                "Optional sub-task exhausted retries; absorbing failure"
            );
            handle.state.lock().graph.fail(&subtask.id, failure_record);
            return Ok(None);
        }

        handle.state.lock().graph.fail(&subtask.id, failure_record);
        Err(error)
    }

    /// Route a quality-sensitive result through consensus until it is
    /// accepted or the task must fail.
    ///
    /// Each loop turn either returns, consumes one revision round (bounded
    /// by `max_revision_rounds`), or consumes one untried alternate producer
    /// (bounded by the pool), so the loop terminates unconditionally.
    async fn resolve_consensus(
        &self,
        handle: &Arc<TaskHandle>,
        subtask: &SubTask,
        initial: ExecutionResult,
        options: &ResolvedOptions,
    ) -> Result<ExecutionResult> {
        let mut current = initial;
        let mut revision_round = 0u32;
        let mut insufficient_rounds = 0u32;
        let mut tried_producers = vec![current.agent_id.clone()];

        loop {
            if handle.cancel.is_cancelled() {
                return Err(EnsembleError::execution(
                    "task cancelled while awaiting consensus",
                    ExecutionCause::Cancelled,
                ));
            }

            let evaluators: Vec<AgentId> = self
                .pool
                .agents_with_capability(Capability::Review)
                .into_iter()
                .filter(|id| *id != current.agent_id)
                .collect();

            let evaluations = self
                .collect_evaluations(handle, subtask, &current, &evaluators)
                .await?;

            let (score, decision, recommendations) = if evaluations.is_empty() {
                // No evaluator responded in time: revise with zero
                // confidence once, reject on recurrence.
                insufficient_rounds += 1;
                let decision = if insufficient_rounds > 1 {
                    ConsensusDecision::Reject
                } else {
                    ConsensusDecision::Revise
                };
                warn!(
                    subtask = %subtask.id,
                    occurrences = insufficient_rounds,
                    "Insufficient evaluators"
                );
                (0.0, decision, Vec::new())
            } else {
                insufficient_rounds = 0;
                let request = ConsensusRequest::new(current.clone(), evaluators)
                    .with_threshold(options.consensus_threshold)
                    .with_margin(self.config.consensus.margin);
                let verdict = self.engine.evaluate(&request, &evaluations)?;
                (verdict.score, verdict.decision, verdict.recommendations)
            };

            // A Revise with no revision budget left is a Reject in effect;
            // emit and act on the effective decision.
            let effective = match decision {
                ConsensusDecision::Revise
                    if revision_round >= self.config.consensus.max_revision_rounds =>
                {
                    ConsensusDecision::Reject
                }
                other => other,
            };
            self.emit(
                subtask.parent,
                subtask,
                Some(&current.agent_id),
                Duration::ZERO,
                match effective {
                    ConsensusDecision::Accept => EventOutcome::ConsensusAccept,
                    ConsensusDecision::Revise => EventOutcome::ConsensusRevise,
                    ConsensusDecision::Reject => EventOutcome::ConsensusReject,
                },
                Some(score),
            );

            match effective {
                ConsensusDecision::Accept => {
                    current.score = score;
                    return Ok(current);
                }
                ConsensusDecision::Revise => {
                    revision_round += 1;
                    debug!(
                        subtask = %subtask.id,
                        round = revision_round,
                        "Consensus requested a revision"
                    );
                    current = self
                        .execute_revision(handle, subtask, &current, recommendations, revision_round)
                        .await?;
                }
                ConsensusDecision::Reject => {
                    // One shot with an untried qualifying producer, else
                    // the task fails.
                    let alternate = self
                        .pool
                        .agents_with_capability(subtask.capability)
                        .into_iter()
                        .find(|id| !tried_producers.contains(id));
                    let Some(alternate) = alternate else {
                        return Err(EnsembleError::ConsensusRejected { score });
                    };
                    info!(
                        subtask = %subtask.id,
                        alternate = %alternate,
                        "Consensus rejected; trying alternate producer"
                    );
                    tried_producers.push(alternate.clone());
                    let produced = match self
                        .pool
                        .execute_on(&alternate, subtask, &handle.cancel)
                        .await
                    {
                        Ok(attempt) => attempt.outcome,
                        Err(error) => Err(error),
                    };
                    match produced {
                        Ok(result) => current = result,
                        Err(EnsembleError::Execution {
                            cause: ExecutionCause::Cancelled,
                            ..
                        }) => {
                            return Err(EnsembleError::execution(
                                "task cancelled while awaiting consensus",
                                ExecutionCause::Cancelled,
                            ));
                        }
                        Err(error) => {
                            // A failed alternate is spent, not fatal; the
                            // loop re-judges the standing artifact and moves
                            // on to the next untried producer, if any.
                            warn!(
                                subtask = %subtask.id,
                                alternate = %alternate,
                                error = %error,
                                "Alternate producer failed"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Execute one revision sub-task targeted at the original producer,
    /// carrying the aggregated recommendations as additional input.
    async fn execute_revision(
        &self,
        handle: &Arc<TaskHandle>,
        subtask: &SubTask,
        current: &ExecutionResult,
        recommendations: Vec<String>,
        round: u32,
    ) -> Result<ExecutionResult> {
        let revision = SubTask::new(
            subtask.parent,
            format!("revise: {}", subtask.description),
            subtask.capability,
        )
        .with_complexity(subtask.complexity)
        .with_deadline(subtask.deadline)
        .with_input(json!({
            "original": subtask.input,
            "artifact": current.payload,
            "recommendations": recommendations,
            "revision_round": round,
        }));

        let attempt = self
            .pool
            .execute_on(&current.agent_id, &revision, &handle.cancel)
            .await?;
        let mut result = attempt.outcome?;
        // The revision settles the original sub-task's slot in the graph.
        result.subtask_id = subtask.id;
        Ok(result)
    }

    /// Fan the artifact out to the invited evaluators and collect whatever
    /// comes back before the evaluation deadline. Individual evaluator
    /// failures are dropped, not retried.
    async fn collect_evaluations(
        &self,
        handle: &Arc<TaskHandle>,
        subtask: &SubTask,
        artifact: &ExecutionResult,
        evaluators: &[AgentId],
    ) -> Result<Vec<Evaluation>> {
        if evaluators.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = self.config.consensus.evaluation_deadline();
        let futures = evaluators.iter().map(|evaluator| {
            let evaluation_subtask = SubTask::new(
                subtask.parent,
                format!("evaluate result of: {}", subtask.description),
                Capability::Review,
            )
            .with_deadline(deadline)
            .with_input(json!({
                "artifact": artifact.payload,
                "producer": artifact.agent_id,
                "producer_score": artifact.score,
            }));

            let pool = Arc::clone(&self.pool);
            let cancel = handle.cancel.clone();
            let evaluator = evaluator.clone();
            async move {
                let attempt = pool
                    .execute_on(&evaluator, &evaluation_subtask, &cancel)
                    .await
                    .ok()?;
                let result = attempt.outcome.ok()?;
                let descriptor = pool.descriptor(&attempt.agent_id)?;
                let weight = evaluator_weight(descriptor.role, descriptor.success_rate());
                Some(
                    Evaluation::new(attempt.agent_id, result.score, weight)
                        .with_recommendations(result.findings()),
                )
            }
        });

        let collected: Vec<Evaluation> = join_all(futures).await.into_iter().flatten().collect();
        if handle.cancel.is_cancelled() {
            return Err(EnsembleError::execution(
                "task cancelled while collecting evaluations",
                ExecutionCause::Cancelled,
            ));
        }
        Ok(collected)
    }

    fn is_quality_sensitive(&self, capability: Capability) -> bool {
        self.config.scheduler.quality_sensitive.contains(&capability)
    }

    /// Fire-and-forget metrics emission.
    fn emit(
        &self,
        task_id: TaskId,
        subtask: &SubTask,
        agent_id: Option<&AgentId>,
        duration: Duration,
        outcome: EventOutcome,
        score: Option<f64>,
    ) {
        self.sink.record(TaskEvent {
            task_id,
            subtask_id: subtask.id,
            agent_id: agent_id.cloned(),
            duration,
            outcome,
            score,
        });
    }
}
