//! Agent trait and supporting types.

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilityRegistry};
use crate::error::Result;
use crate::task::{ExecutionResult, SubTask};

/// Identifier of one agent instance, in role-instance form (`"reviewer-0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn instance(role: AgentRole, index: usize) -> Self {
        Self(format!("{}-{}", role, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of ensemble roles.
///
/// New roles are added by extending this enum and the capability registry;
/// there is no open-ended role hierarchy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Coder,
    Reviewer,
    Debugger,
    Tester,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Debugger => "debugger",
            Self::Tester => "tester",
        }
    }

    pub fn all() -> [AgentRole; 5] {
        [
            Self::Planner,
            Self::Coder,
            Self::Reviewer,
            Self::Debugger,
            Self::Tester,
        ]
    }

    /// Fixed per-role base weight used by the consensus engine.
    ///
    /// Reviewers are the authoritative evaluators; secondary evaluators
    /// (testers) and occasional ones count progressively less.
    pub fn base_weight(&self) -> f64 {
        match self {
            Self::Reviewer => 1.0,
            Self::Tester => 0.8,
            Self::Debugger => 0.7,
            Self::Coder | Self::Planner => 0.6,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Executable unit bound to one capability role.
///
/// Implementations are stateless across calls; per-instance load and success
/// history live in the scheduler-owned [`AgentDescriptor`]. The registered
/// implementation may be anything from the built-in heuristic agents to a
/// bridge into a generative backend.
#[async_trait]
pub trait SpecializedAgent: Send + Sync {
    fn id(&self) -> &AgentId;
    fn role(&self) -> AgentRole;

    /// Capabilities this instance supports. Defaults to the role's standard
    /// set; override to narrow an instance (e.g. an evaluation-only
    /// reviewer).
    fn capabilities(&self) -> BTreeSet<Capability> {
        CapabilityRegistry::standard_capabilities(self.role())
    }

    /// Execute one sub-task. Failures surface as `EnsembleError::Execution`
    /// and are reported to the scheduler, never swallowed.
    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult>;
}

/// Identity fields shared by the built-in agents.
#[derive(Debug, Clone)]
pub struct AgentCore {
    pub id: AgentId,
    pub role: AgentRole,
}

impl AgentCore {
    pub fn new(role: AgentRole, index: usize) -> Self {
        Self {
            id: AgentId::instance(role, index),
            role,
        }
    }
}

/// In-flight sub-task counter.
#[derive(Debug, Default)]
pub struct LoadTracker {
    active: AtomicU32,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u32 {
        self.active.load(Ordering::Relaxed)
    }

    /// Increment if under `limit`; the pool never admits work beyond the
    /// descriptor's configured concurrency limit.
    pub fn try_increment(&self, limit: u32) -> bool {
        let mut current = self.active.load(Ordering::Relaxed);
        loop {
            if current >= limit {
                return false;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// RAII guard releasing one load slot; panic-safe.
pub struct LoadGuard<'a> {
    load: &'a LoadTracker,
}

impl<'a> LoadGuard<'a> {
    fn new(load: &'a LoadTracker) -> Self {
        Self { load }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.load.decrement();
    }
}

/// Owned variant of [`LoadGuard`] for callers holding the descriptor behind
/// an `Arc` and moving it across await points.
pub struct OwnedLoadGuard {
    descriptor: Arc<AgentDescriptor>,
}

impl Drop for OwnedLoadGuard {
    fn drop(&mut self) {
        self.descriptor.load.decrement();
    }
}

/// Rolling window of recent execution outcomes.
#[derive(Debug)]
struct SuccessWindow {
    samples: VecDeque<bool>,
    capacity: usize,
}

impl SuccessWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, success: bool) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(success);
    }

    /// An unsampled agent is treated as fully reliable so that fresh
    /// ensembles start from an equal-weight baseline.
    fn rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        let successes = self.samples.iter().filter(|s| **s).count();
        successes as f64 / self.samples.len() as f64
    }
}

/// Scheduler-owned bookkeeping for one registered agent instance.
///
/// Load and history mutation is serialized per descriptor: load through the
/// atomic tracker, history through its own lock.
#[derive(Debug)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub role: AgentRole,
    pub capabilities: BTreeSet<Capability>,
    max_load: u32,
    load: LoadTracker,
    history: RwLock<SuccessWindow>,
    total_executions: AtomicU64,
    failed_executions: AtomicU64,
}

impl AgentDescriptor {
    pub fn new(id: AgentId, role: AgentRole, max_load: u32, history_window: usize) -> Self {
        Self::with_capabilities(
            id,
            role,
            CapabilityRegistry::standard_capabilities(role),
            max_load,
            history_window,
        )
    }

    pub fn with_capabilities(
        id: AgentId,
        role: AgentRole,
        capabilities: BTreeSet<Capability>,
        max_load: u32,
        history_window: usize,
    ) -> Self {
        Self {
            id,
            role,
            capabilities,
            max_load,
            load: LoadTracker::new(),
            history: RwLock::new(SuccessWindow::new(history_window.max(1))),
            total_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn current_load(&self) -> u32 {
        self.load.current()
    }

    pub fn max_load(&self) -> u32 {
        self.max_load
    }

    /// Claim a load slot, or `None` when the instance is saturated.
    pub fn begin_execution(&self) -> Option<LoadGuard<'_>> {
        self.load
            .try_increment(self.max_load)
            .then(|| LoadGuard::new(&self.load))
    }

    /// Owned-guard variant of [`AgentDescriptor::begin_execution`].
    pub fn begin_execution_owned(self: &Arc<Self>) -> Option<OwnedLoadGuard> {
        self.load.try_increment(self.max_load).then(|| OwnedLoadGuard {
            descriptor: Arc::clone(self),
        })
    }

    pub fn record_outcome(&self, success: bool) {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_executions.fetch_add(1, Ordering::Relaxed);
        }
        self.history.write().record(success);
    }

    /// Rolling success rate over the recent outcome window.
    pub fn success_rate(&self) -> f64 {
        self.history.read().rate()
    }

    pub fn total_executions(&self) -> u64 {
        self.total_executions.load(Ordering::Relaxed)
    }

    pub fn failed_executions(&self) -> u64 {
        self.failed_executions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> AgentStatusSnapshot {
        AgentStatusSnapshot {
            id: self.id.clone(),
            role: self.role,
            capabilities: self.capabilities.iter().copied().collect(),
            current_load: self.current_load(),
            success_rate: self.success_rate(),
            total_executions: self.total_executions(),
            failed_executions: self.failed_executions(),
        }
    }
}

/// Read-only view of one agent's descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusSnapshot {
    pub id: AgentId,
    pub role: AgentRole,
    pub capabilities: Vec<Capability>,
    pub current_load: u32,
    pub success_rate: f64,
    pub total_executions: u64,
    pub failed_executions: u64,
}
