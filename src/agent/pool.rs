//! Agent pool: registration, load-balanced selection, and supervised
//! execution of sub-task attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::core::{AgentDescriptor, AgentId, AgentStatusSnapshot, SpecializedAgent};
use crate::capability::{Capability, CapabilityRegistry};
use crate::config::PoolConfig;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::task::{ExecutionResult, SubTask};

struct PoolEntry {
    agent: Arc<dyn SpecializedAgent>,
    descriptor: Arc<AgentDescriptor>,
}

/// One finished execution attempt, successful or not.
///
/// The agent id and duration are reported even when the attempt failed, so
/// the scheduler can emit metrics and exclude the instance on retry.
#[derive(Debug)]
pub struct Attempt {
    pub agent_id: AgentId,
    pub duration: Duration,
    pub outcome: Result<ExecutionResult>,
}

/// Pool of registered agent instances with load-balanced selection.
pub struct AgentPool {
    config: PoolConfig,
    entries: RwLock<Vec<PoolEntry>>,
    /// Caps concurrent executions across the whole pool.
    permits: Arc<Semaphore>,
}

impl AgentPool {
    pub fn new(config: PoolConfig) -> Self {
        let max_concurrent = config.max_concurrent_executions.max(1);
        Self {
            config,
            entries: RwLock::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Register an agent instance; ids must be unique.
    pub fn register(&self, agent: Arc<dyn SpecializedAgent>) -> Result<()> {
        let id = agent.id().clone();
        let role = agent.role();
        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry.descriptor.id == id) {
            return Err(EnsembleError::AgentAlreadyRegistered(id));
        }

        let descriptor = Arc::new(AgentDescriptor::with_capabilities(
            id.clone(),
            role,
            agent.capabilities(),
            self.config.max_agent_load,
            self.config.success_history_window,
        ));
        entries.push(PoolEntry { agent, descriptor });
        debug!(agent = %id, role = %role, "Agent registered");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Capability registry covering the instances currently registered.
    pub fn registry(&self) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for entry in self.entries.read().iter() {
            registry.register_role_with(
                entry.descriptor.role,
                entry.descriptor.capabilities.clone(),
            );
        }
        registry
    }

    pub fn descriptor(&self, id: &AgentId) -> Option<Arc<AgentDescriptor>> {
        self.entries
            .read()
            .iter()
            .find(|entry| &entry.descriptor.id == id)
            .map(|entry| Arc::clone(&entry.descriptor))
    }

    /// Ids of all instances supporting a capability, in id order.
    pub fn agents_with_capability(&self, capability: Capability) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.descriptor.supports(capability))
            .map(|entry| entry.descriptor.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn snapshots(&self) -> Vec<AgentStatusSnapshot> {
        let mut snapshots: Vec<AgentStatusSnapshot> = self
            .entries
            .read()
            .iter()
            .map(|entry| entry.descriptor.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Select the best available instance for a capability.
    ///
    /// Least-loaded first; ties broken by highest rolling success rate, then
    /// lowest agent id for determinism. Excluded instances are skipped unless
    /// no other instance supports the capability. Returns `None` when every
    /// qualifying instance is saturated.
    fn select(
        &self,
        capability: Capability,
        exclude: &[AgentId],
        preferred: Option<&AgentId>,
    ) -> Option<(Arc<dyn SpecializedAgent>, Arc<AgentDescriptor>)> {
        let entries = self.entries.read();

        if let Some(wanted) = preferred
            && let Some(entry) = entries.iter().find(|entry| {
                &entry.descriptor.id == wanted && entry.descriptor.supports(capability)
            })
            && entry.descriptor.current_load() < entry.descriptor.max_load()
        {
            return Some((Arc::clone(&entry.agent), Arc::clone(&entry.descriptor)));
        }

        let qualifying: Vec<&PoolEntry> = entries
            .iter()
            .filter(|entry| entry.descriptor.supports(capability))
            .collect();
        if qualifying.is_empty() {
            return None;
        }

        let mut candidates: Vec<&&PoolEntry> = qualifying
            .iter()
            .filter(|entry| !exclude.contains(&entry.descriptor.id))
            .collect();
        if candidates.is_empty() {
            // Exclusion is best-effort: fall back to the full set rather
            // than stalling the retry.
            candidates = qualifying.iter().collect();
        }

        candidates
            .into_iter()
            .filter(|entry| entry.descriptor.current_load() < entry.descriptor.max_load())
            .min_by(|a, b| {
                a.descriptor
                    .current_load()
                    .cmp(&b.descriptor.current_load())
                    .then_with(|| {
                        b.descriptor
                            .success_rate()
                            .partial_cmp(&a.descriptor.success_rate())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.descriptor.id.cmp(&b.descriptor.id))
            })
            .map(|entry| (Arc::clone(&entry.agent), Arc::clone(&entry.descriptor)))
    }

    /// Whether any registered instance supports the capability at all.
    pub fn supports(&self, capability: Capability) -> bool {
        self.entries
            .read()
            .iter()
            .any(|entry| entry.descriptor.supports(capability))
    }

    /// Run a sub-task on one specific agent instance.
    ///
    /// Used for consensus fan-out and revision targeting, where the caller
    /// has already chosen the instance: no fallback to other agents.
    pub async fn execute_on(
        &self,
        agent_id: &AgentId,
        subtask: &SubTask,
        cancel: &CancellationToken,
    ) -> Result<Attempt> {
        let pair = {
            let entries = self.entries.read();
            entries
                .iter()
                .find(|entry| &entry.descriptor.id == agent_id)
                .map(|entry| (Arc::clone(&entry.agent), Arc::clone(&entry.descriptor)))
        };
        let Some((agent, descriptor)) = pair else {
            return Err(EnsembleError::AgentUnavailable(subtask.capability));
        };

        let started = Instant::now();
        let retry_delay = Duration::from_millis(self.config.selection_retry_delay_ms);
        let guard = loop {
            if cancel.is_cancelled() {
                return Err(EnsembleError::execution(
                    "task cancelled while waiting for the target agent",
                    ExecutionCause::Cancelled,
                ));
            }
            if started.elapsed() >= subtask.deadline {
                return Err(EnsembleError::execution(
                    format!("agent {} stayed saturated past the deadline", agent_id),
                    ExecutionCause::Timeout,
                ));
            }
            if let Some(guard) = descriptor.begin_execution_owned() {
                break guard;
            }
            tokio::time::sleep(retry_delay).await;
        };

        let remaining = subtask.deadline.saturating_sub(started.elapsed());
        let outcome = self
            .supervise(agent.as_ref(), subtask, remaining, cancel)
            .await;
        drop(guard);

        self.finish_attempt(&descriptor, subtask, started, outcome)
    }

    /// Run one execution attempt for a sub-task.
    ///
    /// Waits for a qualifying instance to free up (bounded by the sub-task
    /// deadline), claims a load slot, and supervises the agent call against
    /// the deadline and the task's cancellation token. The descriptor's
    /// rolling success rate is updated on every finished attempt.
    pub async fn execute(
        &self,
        subtask: &SubTask,
        exclude: &[AgentId],
        preferred: Option<&AgentId>,
        cancel: &CancellationToken,
    ) -> Result<Attempt> {
        if !self.supports(subtask.capability) {
            return Err(EnsembleError::AgentUnavailable(subtask.capability));
        }

        let started = Instant::now();
        let deadline = subtask.deadline;
        let retry_delay = Duration::from_millis(self.config.selection_retry_delay_ms);

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(EnsembleError::execution(
                    "task cancelled while waiting for an execution slot",
                    ExecutionCause::Cancelled,
                ));
            }
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|_| EnsembleError::execution(
                    "agent pool shut down",
                    ExecutionCause::Internal,
                ))?,
        };

        let (agent, descriptor, guard) = loop {
            if cancel.is_cancelled() {
                return Err(EnsembleError::execution(
                    "task cancelled while selecting an agent",
                    ExecutionCause::Cancelled,
                ));
            }
            if started.elapsed() >= deadline {
                return Err(EnsembleError::execution(
                    format!(
                        "no agent for {} freed up within {}s",
                        subtask.capability,
                        deadline.as_secs()
                    ),
                    ExecutionCause::Timeout,
                ));
            }

            if let Some((agent, descriptor)) = self.select(subtask.capability, exclude, preferred) {
                // The slot can be stolen between selection and claim; loop.
                if let Some(guard) = descriptor.begin_execution_owned() {
                    break (agent, descriptor, guard);
                }
            }
            tokio::time::sleep(retry_delay).await;
        };

        let remaining = deadline.saturating_sub(started.elapsed());
        let outcome = self
            .supervise(agent.as_ref(), subtask, remaining, cancel)
            .await;
        drop(guard);
        drop(permit);

        self.finish_attempt(&descriptor, subtask, started, outcome)
    }

    /// Run the agent call under the deadline and cancellation token.
    async fn supervise(
        &self,
        agent: &dyn SpecializedAgent,
        subtask: &SubTask,
        remaining: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        tokio::select! {
            _ = cancel.cancelled() => Err(EnsembleError::execution(
                "task cancelled during execution",
                ExecutionCause::Cancelled,
            )),
            result = tokio::time::timeout(remaining, agent.execute(subtask)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(EnsembleError::execution(
                    format!("sub-task deadline of {}s exceeded", subtask.deadline.as_secs()),
                    ExecutionCause::Timeout,
                )),
            },
        }
    }

    /// Record the outcome against the descriptor and wrap it up.
    ///
    /// Cancellations are not counted against the agent's success rate.
    fn finish_attempt(
        &self,
        descriptor: &AgentDescriptor,
        subtask: &SubTask,
        started: Instant,
        outcome: Result<ExecutionResult>,
    ) -> Result<Attempt> {
        let cancelled = matches!(
            outcome,
            Err(EnsembleError::Execution {
                cause: ExecutionCause::Cancelled,
                ..
            })
        );
        if !cancelled {
            descriptor.record_outcome(outcome.is_ok());
        }
        if let Err(error) = &outcome {
            warn!(
                agent = %descriptor.id,
                subtask = %subtask.id,
                error = %error,
                "Sub-task attempt failed"
            );
        }

        Ok(Attempt {
            agent_id: descriptor.id.clone(),
            duration: started.elapsed(),
            outcome,
        })
    }
}
