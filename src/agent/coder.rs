//! Built-in implementation agent.

use async_trait::async_trait;
use serde_json::json;

use super::core::{AgentCore, AgentId, AgentRole, SpecializedAgent};
use super::planner::PlannerAgent;
use crate::capability::Capability;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::task::{ExecutionResult, SubTask};

pub struct CoderAgent {
    core: AgentCore,
}

impl CoderAgent {
    pub fn new(index: usize) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Coder, index),
        }
    }

    fn detect_language(text: &str) -> &'static str {
        let indicators: &[(&str, &[&str])] = &[
            ("rust", &["rust", "cargo", "crate"]),
            ("python", &["python", "django", "flask", "fastapi"]),
            ("typescript", &["typescript", "angular"]),
            ("javascript", &["javascript", "node", "react", "vue"]),
            ("java", &["java", "spring", "maven", "gradle"]),
            ("go", &["golang", "goroutine"]),
        ];
        for (language, keywords) in indicators {
            if keywords.iter().any(|k| text.contains(k)) {
                return language;
            }
        }
        "rust"
    }

    fn detect_task_type(text: &str) -> &'static str {
        if ["api", "endpoint", "rest", "grpc"].iter().any(|k| text.contains(k)) {
            "api_development"
        } else if ["database", "sql", "query", "storage"].iter().any(|k| text.contains(k)) {
            "database_operation"
        } else if ["refactor", "optimize", "improve"].iter().any(|k| text.contains(k)) {
            "refactoring"
        } else if ["test", "unit", "integration"].iter().any(|k| text.contains(k)) {
            "testing"
        } else {
            "general_implementation"
        }
    }

    /// Rough effort estimate in minutes, scaled by complexity tier.
    fn estimate_effort(complexity: f64) -> u64 {
        match complexity {
            c if c <= 0.2 => 30,
            c if c <= 0.5 => 120,
            c if c <= 0.8 => 240,
            _ => 480,
        }
    }
}

#[async_trait]
impl SpecializedAgent for CoderAgent {
    fn id(&self) -> &AgentId {
        &self.core.id
    }

    fn role(&self) -> AgentRole {
        self.core.role
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        if !matches!(subtask.capability, Capability::Coding | Capability::Testing) {
            return Err(EnsembleError::execution(
                format!("coder cannot execute {} sub-tasks", subtask.capability),
                ExecutionCause::Unsupported,
            ));
        }
        if subtask.description.trim().is_empty() {
            return Err(EnsembleError::execution(
                "empty sub-task description",
                ExecutionCause::InvalidInput,
            ));
        }

        let text = subtask.description.to_lowercase();
        let language = Self::detect_language(&text);
        let task_type = Self::detect_task_type(&text);
        let level = PlannerAgent::assess_complexity(&subtask.description);
        let complexity = if subtask.complexity > 0.0 {
            subtask.complexity
        } else {
            level.score()
        };

        // Revision rounds carry reviewer recommendations in the input; treat
        // their presence as applied fixes raising implementation confidence.
        let recommendations: Vec<String> = subtask
            .input
            .get("recommendations")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let payload = json!({
            "language": language,
            "task_type": task_type,
            "estimated_minutes": Self::estimate_effort(complexity),
            "applied_recommendations": recommendations,
            "steps": [
                "outline interfaces",
                "implement core logic",
                "add error handling",
                "write unit tests",
            ],
        });

        let mut score = (0.9 - 0.2 * complexity).clamp(0.4, 0.9);
        if !recommendations.is_empty() {
            score = (score + 0.05 * recommendations.len() as f64).min(0.95);
        }
        Ok(ExecutionResult::new(
            subtask.id,
            self.core.id.clone(),
            payload,
            score,
        ))
    }
}
