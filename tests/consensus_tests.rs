//! Consensus engine properties: weighted-score bounds, decision bands,
//! determinism, and weight derivation.

use agent_ensemble::agent::{AgentId, AgentRole};
use agent_ensemble::capability::Capability;
use agent_ensemble::consensus::{
    evaluator_weight, ConsensusDecision, ConsensusEngine, ConsensusRequest, Evaluation,
};
use agent_ensemble::error::EnsembleError;
use agent_ensemble::task::{ExecutionResult, SubTask, TaskId};

/// Deterministic pseudo-random sequence; prime strides instead of an RNG so
/// failures reproduce.
struct Stride {
    state: u64,
}

impl Stride {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_unit(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn request(threshold: f64, margin: f64) -> ConsensusRequest {
    let subtask = SubTask::new(TaskId::new(), "artifact under judgment", Capability::Review);
    let artifact = ExecutionResult::new(
        subtask.id,
        AgentId::from("coder-0"),
        serde_json::Value::Null,
        0.5,
    );
    ConsensusRequest::new(artifact, vec![])
        .with_threshold(threshold)
        .with_margin(margin)
}

#[test]
fn weighted_score_is_always_in_unit_interval() {
    let engine = ConsensusEngine::new();
    let mut stride = Stride::new(7);

    for count in 1..=24usize {
        let evaluations: Vec<Evaluation> = (0..count)
            .map(|i| {
                Evaluation::new(
                    AgentId::from(format!("reviewer-{}", i).as_str()),
                    stride.next_unit(),
                    0.05 + stride.next_unit() * 2.0,
                )
            })
            .collect();

        let result = engine.evaluate(&request(0.7, 0.1), &evaluations).unwrap();
        assert!(
            (0.0..=1.0).contains(&result.score),
            "count={} produced {}",
            count,
            result.score
        );
    }
}

#[test]
fn single_evaluator_reduces_to_its_score() {
    let engine = ConsensusEngine::new();
    let mut stride = Stride::new(11);

    for _ in 0..50 {
        let score = stride.next_unit();
        let result = engine
            .evaluate(
                &request(0.7, 0.1),
                &[Evaluation::new(AgentId::from("reviewer-0"), score, 1.4)],
            )
            .unwrap();
        assert!((result.score - score.clamp(0.0, 1.0)).abs() < 1e-12);
    }
}

#[test]
fn decision_is_deterministic_for_identical_input() {
    let engine = ConsensusEngine::new();
    let evaluations = vec![
        Evaluation::new(AgentId::from("reviewer-0"), 0.64, 1.0),
        Evaluation::new(AgentId::from("reviewer-1"), 0.71, 0.8),
    ];

    let first = engine.evaluate(&request(0.7, 0.1), &evaluations).unwrap();
    for _ in 0..10 {
        let again = engine.evaluate(&request(0.7, 0.1), &evaluations).unwrap();
        assert_eq!(again.decision, first.decision);
        assert_eq!(again.score, first.score);
    }
}

#[test]
fn decision_bands_partition_the_score_axis() {
    let engine = ConsensusEngine::new();

    // Sweep scores across the axis; every score lands in exactly the band
    // its value dictates.
    for step in 0..=100u32 {
        let score = step as f64 / 100.0;
        let result = engine
            .evaluate(
                &request(0.7, 0.1),
                &[Evaluation::new(AgentId::from("reviewer-0"), score, 1.0)],
            )
            .unwrap();

        let expected = if score >= 0.7 {
            ConsensusDecision::Accept
        } else if score >= 0.6 {
            ConsensusDecision::Revise
        } else {
            ConsensusDecision::Reject
        };
        assert_eq!(result.decision, expected, "score={}", score);
    }
}

#[test]
fn adversarial_epsilon_below_threshold_always_revises() {
    // An evaluator pinned at threshold - epsilon can demand revision every
    // round, but never flips the verdict to Accept or Reject; the bounded
    // revision loop upstream is what terminates the exchange.
    let engine = ConsensusEngine::new();
    let epsilon = 1e-6;

    for _ in 0..10 {
        let result = engine
            .evaluate(
                &request(0.7, 0.1),
                &[Evaluation::new(
                    AgentId::from("reviewer-0"),
                    0.7 - epsilon,
                    1.0,
                )],
            )
            .unwrap();
        assert_eq!(result.decision, ConsensusDecision::Revise);
    }
}

#[test]
fn zero_margin_leaves_no_revise_band() {
    let engine = ConsensusEngine::new();
    let result = engine
        .evaluate(
            &request(0.7, 0.0),
            &[Evaluation::new(AgentId::from("reviewer-0"), 0.69, 1.0)],
        )
        .unwrap();
    assert_eq!(result.decision, ConsensusDecision::Reject);
}

#[test]
fn empty_evaluations_error() {
    let engine = ConsensusEngine::new();
    let err = engine.evaluate(&request(0.7, 0.1), &[]).unwrap_err();
    assert!(matches!(err, EnsembleError::InsufficientEvaluators));
}

#[test]
fn unreliable_evaluator_cannot_dominate() {
    // A failing-history coder outweighed by two healthy reviewers: the
    // outlier's low score moves the aggregate but cannot force a reject.
    let engine = ConsensusEngine::new();
    let outlier_weight = evaluator_weight(AgentRole::Coder, 0.0);
    let reviewer_weight = evaluator_weight(AgentRole::Reviewer, 1.0);

    let result = engine
        .evaluate(
            &request(0.7, 0.1),
            &[
                Evaluation::new(AgentId::from("coder-0"), 0.0, outlier_weight),
                Evaluation::new(AgentId::from("reviewer-0"), 0.9, reviewer_weight),
                Evaluation::new(AgentId::from("reviewer-1"), 0.9, reviewer_weight),
            ],
        )
        .unwrap();

    assert!(result.score >= 0.7, "score {}", result.score);
    assert_eq!(result.decision, ConsensusDecision::Accept);
}
