//! Judge scorer: subjective quality scores from an external LLM judge.
//!
//! Judge unavailability degrades a case's score to `None`; it never turns a
//! rule-passing case into an errored one.

use qc_core::types::{JudgeScore, TestCase};
use std::sync::Arc;

use crate::client::JudgeClient;
use crate::types::{CaseExecutionOutcome, JudgeRequest};

pub struct JudgeScorer {
    client: Arc<dyn JudgeClient>,
    pub enabled: bool,
}

impl JudgeScorer {
    pub fn new(client: Arc<dyn JudgeClient>) -> Self {
        Self {
            client,
            enabled: true,
        }
    }

    pub fn disabled(client: Arc<dyn JudgeClient>) -> Self {
        Self {
            client,
            enabled: false,
        }
    }

    /// Score one completed case. Returns `None` when the judge is disabled
    /// or the call fails.
    pub fn score(&self, case: &TestCase, outcome: &CaseExecutionOutcome) -> Option<JudgeScore> {
        if !self.enabled {
            return None;
        }

        let request = build_judge_request(case, outcome);
        match self.client.score(&request) {
            Ok(score) => Some(clamp_scores(score)),
            Err(err) => {
                eprintln!(
                    "[judge] scoring failed for case '{}': {}, recording null score",
                    case.name, err
                );
                None
            }
        }
    }
}

fn build_judge_request(case: &TestCase, outcome: &CaseExecutionOutcome) -> JudgeRequest {
    let transcript = if outcome.turns.is_empty() {
        outcome.content.clone()
    } else {
        outcome
            .turns
            .iter()
            .map(|turn| format!("[turn {}] {}", turn.index, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    JudgeRequest {
        case_name: case.name.clone(),
        case_description: case.description.clone(),
        transcript,
        tool_names: outcome.tool_calls.iter().map(|t| t.name.clone()).collect(),
        multi_turn: case.is_multi_turn(),
    }
}

/// Judges occasionally return values slightly outside `[0, 1]`; clamp so
/// downstream averaging stays in range.
fn clamp_scores(mut score: JudgeScore) -> JudgeScore {
    score.correctness = score.correctness.clamp(0.0, 1.0);
    score.tool_accuracy = score.tool_accuracy.clamp(0.0, 1.0);
    score.response_quality = score.response_quality.clamp(0.0, 1.0);
    score.flow_coherence = score.flow_coherence.map(|v| v.clamp(0.0, 1.0));
    score
}
