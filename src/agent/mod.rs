//! Agent trait, built-in role implementations, and the agent pool.

pub mod coder;
pub mod core;
pub mod debugger;
pub mod planner;
pub mod pool;
pub mod reviewer;
pub mod tester;

pub use coder::CoderAgent;
pub use self::core::{
    AgentCore, AgentDescriptor, AgentId, AgentRole, AgentStatusSnapshot, LoadGuard, LoadTracker,
    OwnedLoadGuard, SpecializedAgent,
};
pub use debugger::DebuggerAgent;
pub use planner::{ComplexityLevel, PlannerAgent};
pub use pool::{AgentPool, Attempt};
pub use reviewer::ReviewerAgent;
pub use tester::TesterAgent;
