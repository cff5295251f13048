//! Built-in testing agent.

use async_trait::async_trait;
use serde_json::json;

use super::core::{AgentCore, AgentId, AgentRole, SpecializedAgent};
use crate::capability::Capability;
use crate::error::{EnsembleError, ExecutionCause, Result};
use crate::task::{ExecutionResult, SubTask};

pub struct TesterAgent {
    core: AgentCore,
}

impl TesterAgent {
    pub fn new(index: usize) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Tester, index),
        }
    }

    fn testing_scope(text: &str) -> &'static str {
        if ["comprehensive", "full", "complete", "thorough"].iter().any(|k| text.contains(k)) {
            "comprehensive"
        } else if ["smoke", "basic", "quick", "minimal"].iter().any(|k| text.contains(k)) {
            "smoke"
        } else if ["regression", "existing"].iter().any(|k| text.contains(k)) {
            "regression"
        } else {
            "standard"
        }
    }

    fn test_types(text: &str) -> Vec<&'static str> {
        let mut types = vec!["unit"];
        if ["integration", "end-to-end", "e2e", "api"].iter().any(|k| text.contains(k)) {
            types.push("integration");
        }
        if ["performance", "load", "latency"].iter().any(|k| text.contains(k)) {
            types.push("performance");
        }
        if ["security", "auth", "permission"].iter().any(|k| text.contains(k)) {
            types.push("security");
        }
        types
    }

    /// Coverage target by scope; comprehensive suites aim higher.
    fn coverage_target(scope: &str) -> f64 {
        match scope {
            "comprehensive" => 0.9,
            "smoke" => 0.4,
            "regression" => 0.7,
            _ => 0.8,
        }
    }

    fn case_names(text: &str, types: &[&'static str]) -> Vec<String> {
        let subject: String = text
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .take(3)
            .collect::<Vec<_>>()
            .join("_");
        let subject = if subject.is_empty() { "behavior".to_string() } else { subject };

        types
            .iter()
            .flat_map(|t| {
                [
                    format!("{}_{}_happy_path", t, subject),
                    format!("{}_{}_error_handling", t, subject),
                ]
            })
            .collect()
    }
}

#[async_trait]
impl SpecializedAgent for TesterAgent {
    fn id(&self) -> &AgentId {
        &self.core.id
    }

    fn role(&self) -> AgentRole {
        self.core.role
    }

    async fn execute(&self, subtask: &SubTask) -> Result<ExecutionResult> {
        if !matches!(subtask.capability, Capability::Testing | Capability::Review) {
            return Err(EnsembleError::execution(
                format!("tester cannot execute {} sub-tasks", subtask.capability),
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
        let scope = Self::testing_scope(&text);
        let types = Self::test_types(&text);
        let coverage = Self::coverage_target(scope);

        let payload = json!({
            "testing_scope": scope,
            "test_types": types,
            "test_cases": Self::case_names(&text, &types),
            "estimated_coverage": coverage,
        });

        Ok(ExecutionResult::new(
            subtask.id,
            self.core.id.clone(),
            payload,
            coverage,
        ))
    }
}
