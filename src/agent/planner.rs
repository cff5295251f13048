//! Built-in planning agent.
//!
//! Heuristic stand-in for a generative planning backend: classifies task
//! complexity from description keywords, selects an execution strategy, and
//! sketches a phase outline. The decomposer reuses the same complexity
//! assessment as its scheduling hint.

use async_trait::async_trait;
use serde_json::json;

use super::core::{AgentCore, AgentId, AgentRole, SpecializedAgent};
use crate::capability::Capability;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::task::{ExecutionResult, SubTask};

/// Complexity tier derived from description keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl ComplexityLevel {
    pub fn score(&self) -> f64 {
        match self {
            Self::Simple => 0.2,
            Self::Moderate => 0.5,
            Self::Complex => 0.8,
            Self::VeryComplex => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }
}

const SIMPLE_KEYWORDS: &[&str] = &["read", "write", "list", "search", "replace"];
const MODERATE_KEYWORDS: &[&str] = &["implement", "create", "modify", "update", "refactor"];
const COMPLEX_KEYWORDS: &[&str] = &["design", "architecture", "system", "integration", "migration"];
const VERY_COMPLEX_KEYWORDS: &[&str] = &["rewrite", "redesign", "optimize", "scale", "performance"];

pub struct PlannerAgent {
    core: AgentCore,
}

impl PlannerAgent {
    pub fn new(index: usize) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Planner, index),
        }
    }

    /// Classify a description into a complexity tier.
    ///
    /// Tiers are checked from most to least severe so that "redesign the
    /// search index" lands on very_complex, not simple.
    pub fn assess_complexity(description: &str) -> ComplexityLevel {
        let text = description.to_lowercase();
        let contains_any = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

        if contains_any(VERY_COMPLEX_KEYWORDS) {
            ComplexityLevel::VeryComplex
        } else if contains_any(COMPLEX_KEYWORDS) {
            ComplexityLevel::Complex
        } else if contains_any(MODERATE_KEYWORDS) {
            ComplexityLevel::Moderate
        } else if contains_any(SIMPLE_KEYWORDS) {
            ComplexityLevel::Simple
        } else {
            ComplexityLevel::Moderate
        }
    }

    fn select_strategy(level: ComplexityLevel) -> &'static str {
        match level {
            ComplexityLevel::VeryComplex => "iterative",
            ComplexityLevel::Complex => "parallel",
            ComplexityLevel::Moderate | ComplexityLevel::Simple => "sequential",
        }
    }

    fn outline(level: ComplexityLevel) -> Vec<&'static str> {
        match level {
            ComplexityLevel::Simple => vec!["implement", "verify"],
            ComplexityLevel::Moderate => vec!["analyze", "implement", "verify"],
            ComplexityLevel::Complex => {
                vec!["analyze", "design", "implement", "review", "verify"]
            }
            ComplexityLevel::VeryComplex => {
                vec!["analyze", "design", "prototype", "implement", "review", "verify"]
            }
        }
    }
}

#[async_trait]
impl SpecializedAgent for PlannerAgent {
    fn id(&self) -> &AgentId {
        &self.core.id
    }

    fn role(&self) -> AgentRole {
        self.core.role
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        if subtask.capability != Capability::Planning {
            return Err(EnsembleError::execution(
                format!("planner cannot execute {} sub-tasks", subtask.capability),
                ExecutionCause::Unsupported,
            ));
        }
        if subtask.description.trim().is_empty() {
            return Err(EnsembleError::execution(
                "empty sub-task description",
                ExecutionCause::InvalidInput,
            ));
        }

        let level = Self::assess_complexity(&subtask.description);
        let strategy = Self::select_strategy(level);
        let payload = json!({
            "analysis": {
                "complexity_level": level.as_str(),
                "complexity_score": level.score(),
            },
            "strategy": strategy,
            "phases": Self::outline(level),
        });

        // Planning confidence drops as the problem gets harder to scope.
        let score = (0.95 - 0.25 * level.score()).clamp(0.5, 0.95);
        Ok(ExecutionResult::new(
            subtask.id,
            self.core.id.clone(),
            payload,
            score,
        ))
    }
}
