//! Built-in review agent.
//!
//! Scores an artifact across weighted review categories and produces
//! actionable recommendations. The category weights favor correctness and
//! security over polish.

use async_trait::async_trait;
use serde_json::json;

use super::core::{AgentCore, AgentId, AgentRole, SpecializedAgent};
use crate::capability::Capability;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::task::{ExecutionResult, SubTask};

/// Review category with its contribution to the overall score.
const CATEGORY_WEIGHTS: &[(&str, f64)] = &[
    ("code_quality", 0.3),
    ("security", 0.25),
    ("performance", 0.2),
    ("maintainability", 0.15),
    ("documentation", 0.1),
];

/// Smells scanned per category. Each hit costs `SMELL_PENALTY`.
const CATEGORY_SMELLS: &[(&str, &[&str])] = &[
    ("code_quality", &["unwrap", "panic", "todo", "hack", "copy-paste"]),
    ("security", &["password", "secret", "unvalidated", "injection", "unsafe"]),
    ("performance", &["n+1", "quadratic", "blocking", "unbounded"]),
    ("maintainability", &["duplicated", "global", "magic number", "god object"]),
    ("documentation", &["undocumented", "missing docs"]),
];

const SMELL_PENALTY: f64 = 0.15;
const BASE_CATEGORY_SCORE: f64 = 0.9;

pub struct ReviewerAgent {
    core: AgentCore,
}

impl ReviewerAgent {
    pub fn new(index: usize) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Reviewer, index),
        }
    }

    /// Text of the artifact under review: the sub-task input's artifact
    /// payload when present (consensus evaluation), otherwise the
    /// description itself (direct review sub-tasks).
    fn review_text(subtask: &SubTask) -> String {
        match subtask.input.get("artifact") {
            Some(artifact) => artifact.to_string().to_lowercase(),
            None => subtask.description.to_lowercase(),
        }
    }

    fn score_category(text: &str, smells: &[&str]) -> f64 {
        let hits = smells.iter().filter(|s| text.contains(*s)).count();
        (BASE_CATEGORY_SCORE - hits as f64 * SMELL_PENALTY).max(0.1)
    }

    fn recommendation_for(category: &str) -> &'static str {
        match category {
            "code_quality" => "Replace failure-prone constructs with explicit error handling",
            "security" => "Validate all external input and remove hard-coded credentials",
            "performance" => "Bound queues and move blocking work off the hot path",
            "maintainability" => "Extract duplicated logic and name the constants",
            _ => "Document public interfaces and invariants",
        }
    }
}

#[async_trait]
impl SpecializedAgent for ReviewerAgent {
    fn id(&self) -> &AgentId {
        &self.core.id
    }

    fn role(&self) -> AgentRole {
        self.core.role
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        if subtask.capability != Capability::Review {
            return Err(EnsembleError::execution(
                format!("reviewer cannot execute {} sub-tasks", subtask.capability),
                ExecutionCause::Unsupported,
            ));
        }

        let text = Self::review_text(subtask);
        if text.trim().is_empty() {
            return Err(EnsembleError::execution(
                "nothing to review",
                ExecutionCause::InvalidInput,
            ));
        }

        let mut categories = serde_json::Map::new();
        let mut recommendations = Vec::new();
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (category, weight) in CATEGORY_WEIGHTS {
            let smells = CATEGORY_SMELLS
                .iter()
                .find(|(name, _)| name == category)
                .map(|(_, smells)| *smells)
                .unwrap_or(&[]);
            let score = Self::score_category(&text, smells);
            weighted_sum += score * weight;
            total_weight += weight;

            if score < 0.7 {
                recommendations.push(Self::recommendation_for(category).to_string());
            }
            categories.insert(category.to_string(), json!({ "score": score }));
        }

        let overall = if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        };

        let payload = json!({
            "categories": categories,
            "recommendations": recommendations,
            "overall_score": overall,
        });

        Ok(ExecutionResult::new(
            subtask.id,
            self.core.id.clone(),
            payload,
            overall,
        ))
    }
}
