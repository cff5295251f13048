//! Consensus engine: weighted aggregation of evaluator scores into a single
//! accept/revise/reject decision.
//!
//! The decision is a pure function of the (score, weight) pairs and the
//! configured threshold; no state is carried between evaluations. Evaluator
//! weights combine a fixed per-role base weight with the evaluator's rolling
//! success rate, so one chronically unreliable evaluator cannot dominate the
//! verdict.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{AgentId, AgentRole};
use crate::error::{EnsembleError, Result};
use crate::task::ExecutionResult;

/// Floor applied to computed weights so a weight of zero can never silently
/// drop an evaluator from the aggregate.
const MIN_WEIGHT: f64 = 1e-6;

/// Weight of an evaluator: role base weight scaled by reliability.
///
/// A never-sampled or perfectly reliable evaluator carries its full base
/// weight; a consistently failing one is halved, never zeroed.
pub fn evaluator_weight(role: AgentRole, success_rate: f64) -> f64 {
    let reliability = 0.5 + 0.5 * success_rate.clamp(0.0, 1.0);
    (role.base_weight() * reliability).max(MIN_WEIGHT)
}

/// One evaluator's verdict on an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub agent_id: AgentId,
    pub score: f64,
    pub weight: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Evaluation {
    pub fn new(agent_id: AgentId, score: f64, weight: f64) -> Self {
        Self {
            agent_id,
            score: score.clamp(0.0, 1.0),
            weight: weight.max(MIN_WEIGHT),
            recommendations: Vec::new(),
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }
}

/// Request to judge one artifact.
#[derive(Debug, Clone)]
pub struct ConsensusRequest {
    /// The execution result under judgment.
    pub artifact: ExecutionResult,
    /// Evaluator instances invited to respond.
    pub evaluators: Vec<AgentId>,
    pub threshold: f64,
    pub margin: f64,
}

impl ConsensusRequest {
    pub fn new(artifact: ExecutionResult, evaluators: Vec<AgentId>) -> Self {
        Self {
            artifact,
            evaluators,
            threshold: 0.7,
            margin: 0.1,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin.max(0.0);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusDecision {
    Accept,
    Revise,
    Reject,
}

/// Outcome of one consensus evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub score: f64,
    pub decision: ConsensusDecision,
    /// Per-evaluator scores and weights that produced the verdict.
    pub evaluations: Vec<Evaluation>,
    /// Aggregated evaluator recommendations, deduplicated in order.
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine;

impl ConsensusEngine {
    pub fn new() -> Self {
        Self
    }

    /// Merge evaluator verdicts into one decision.
    ///
    /// Weighted score = Σ(score·weight) / Σ(weight). At least one evaluation
    /// is required. Decision bands, from the top: `score >= threshold` is
    /// Accept, `score >= threshold - margin` is Revise, anything lower is
    /// Reject. The exact `threshold - margin` boundary resolves to Revise,
    /// the non-destructive reading of a tie.
    pub fn evaluate(
        &self,
        request: &ConsensusRequest,
        evaluations: &[Evaluation],
    ) -> Result<ConsensusResult> {
        if evaluations.is_empty() {
            return Err(EnsembleError::InsufficientEvaluators);
        }

        let total_weight: f64 = evaluations.iter().map(|e| e.weight).sum();
        let weighted_sum: f64 = evaluations.iter().map(|e| e.score * e.weight).sum();
        let score = (weighted_sum / total_weight).clamp(0.0, 1.0);

        let decision = if score >= request.threshold {
            ConsensusDecision::Accept
        } else if score >= request.threshold - request.margin {
            ConsensusDecision::Revise
        } else {
            ConsensusDecision::Reject
        };

        let mut recommendations = Vec::new();
        for evaluation in evaluations {
            for recommendation in &evaluation.recommendations {
                if !recommendations.contains(recommendation) {
                    recommendations.push(recommendation.clone());
                }
            }
        }

        debug!(
            artifact = %request.artifact.subtask_id,
            evaluators = evaluations.len(),
            score,
            threshold = request.threshold,
            decision = ?decision,
            "Consensus evaluated"
        );

        Ok(ConsensusResult {
            score,
            decision,
            evaluations: evaluations.to_vec(),
            recommendations,
        })
    }
}
