//! Deterministic rule checks against a completed case execution.
//!
//! No network and no model calls: everything here is a pure function of the
//! case definition and the captured outcome, so rule verdicts are cheap to
//! recompute and trivially idempotent.

use qc_core::types::{RuleCheckResult, TestCase};
use qc_exec::types::CaseExecutionOutcome;
use regex::RegexBuilder;

/// Evaluate every rule sub-check for one case.
///
/// `details` collects one display-ready line per failed sub-check; a fully
/// vacuous case (no expectations, no latency budget) always passes.
pub fn evaluate(case: &TestCase, outcome: &CaseExecutionOutcome) -> RuleCheckResult {
    let mut details = Vec::new();

    let tools_ok = check_tools(case, outcome, &mut details);
    let patterns_ok = check_patterns(case, outcome, &mut details);
    let latency_ok = check_latency(case, outcome, &mut details);

    RuleCheckResult {
        tools_ok,
        patterns_ok,
        latency_ok,
        details,
    }
}

fn check_tools(case: &TestCase, outcome: &CaseExecutionOutcome, details: &mut Vec<String>) -> bool {
    let mut ok = true;
    let called: Vec<&str> = outcome.tool_calls.iter().map(|t| t.name.as_str()).collect();

    for tool in &case.expected_tools {
        if !called.contains(&tool.as_str()) {
            details.push(format!("expected tool '{tool}' was not called"));
            ok = false;
        }
    }
    for tool in &case.unexpected_tools {
        if called.contains(&tool.as_str()) {
            details.push(format!("unexpected tool '{tool}' was called"));
            ok = false;
        }
    }

    // Per-turn expectations are checked against that turn's calls only.
    for (turn_def, turn_result) in case.turns.iter().zip(&outcome.turns) {
        let turn_called: Vec<&str> = turn_result
            .tool_calls
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        for tool in &turn_def.expected_tools {
            if !turn_called.contains(&tool.as_str()) {
                details.push(format!(
                    "turn {}: expected tool '{tool}' was not called",
                    turn_result.index
                ));
                ok = false;
            }
        }
        for tool in &turn_def.unexpected_tools {
            if turn_called.contains(&tool.as_str()) {
                details.push(format!(
                    "turn {}: unexpected tool '{tool}' was called",
                    turn_result.index
                ));
                ok = false;
            }
        }
    }

    ok
}

fn check_patterns(
    case: &TestCase,
    outcome: &CaseExecutionOutcome,
    details: &mut Vec<String>,
) -> bool {
    let mut ok = true;

    for pattern in &case.expected_content_patterns {
        if !pattern_matches(pattern, &outcome.content) {
            details.push(format!("content did not match pattern '{pattern}'"));
            ok = false;
        }
    }

    for (turn_def, turn_result) in case.turns.iter().zip(&outcome.turns) {
        for pattern in &turn_def.expected_content_patterns {
            if !pattern_matches(pattern, &turn_result.content) {
                details.push(format!(
                    "turn {}: content did not match pattern '{pattern}'",
                    turn_result.index
                ));
                ok = false;
            }
        }
    }

    ok
}

fn check_latency(
    case: &TestCase,
    outcome: &CaseExecutionOutcome,
    details: &mut Vec<String>,
) -> bool {
    let Some(budget) = case.max_latency_ms else {
        return true;
    };
    if outcome.latency_ms <= budget {
        return true;
    }
    details.push(format!(
        "latency {}ms exceeded budget {}ms",
        outcome.latency_ms, budget
    ));
    false
}

/// Case-insensitive match: regex when the pattern compiles, substring
/// search otherwise.
fn pattern_matches(pattern: &str, content: &str) -> bool {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(content),
        Err(_) => content.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_core::types::{CaseId, ToolCall, TurnDefinition, TurnResult};

    fn mk_case() -> TestCase {
        TestCase {
            id: CaseId::new("C1"),
            name: "lookup confirmation".to_string(),
            description: String::new(),
            input: "look up my order".to_string(),
            turns: Vec::new(),
            expected_tools: Vec::new(),
            unexpected_tools: Vec::new(),
            expected_content_patterns: Vec::new(),
            max_latency_ms: None,
            min_quality_score: None,
            enabled: true,
        }
    }

    fn mk_outcome(content: &str, tools: &[&str], latency_ms: u64) -> CaseExecutionOutcome {
        CaseExecutionOutcome {
            content: content.to_string(),
            tool_calls: tools
                .iter()
                .map(|name| ToolCall {
                    name: name.to_string(),
                    input: "{}".to_string(),
                    result: None,
                })
                .collect(),
            latency_ms,
            ..Default::default()
        }
    }

    #[test]
    fn vacuous_case_always_passes() {
        let check = evaluate(&mk_case(), &mk_outcome("anything at all", &[], 999_999));
        assert!(check.tools_ok);
        assert!(check.patterns_ok);
        assert!(check.latency_ok);
        assert!(check.details.is_empty());
    }

    #[test]
    fn expected_tool_present_passes() {
        let mut case = mk_case();
        case.expected_tools = vec!["lookup".to_string()];
        let check = evaluate(&case, &mk_outcome("ok", &["lookup", "notify"], 10));
        assert!(check.tools_ok);
    }

    #[test]
    fn missing_expected_tool_fails_with_named_detail() {
        let mut case = mk_case();
        case.expected_tools = vec!["lookup".to_string()];
        let check = evaluate(&case, &mk_outcome("ok", &["wrong_tool"], 10));
        assert!(!check.tools_ok);
        assert!(check
            .details
            .iter()
            .any(|d| d.contains("'lookup'") && d.contains("not called")));
    }

    #[test]
    fn unexpected_tool_fails() {
        let mut case = mk_case();
        case.unexpected_tools = vec!["delete_account".to_string()];
        let check = evaluate(&case, &mk_outcome("ok", &["delete_account"], 10));
        assert!(!check.tools_ok);
        assert!(check
            .details
            .iter()
            .any(|d| d.contains("unexpected tool 'delete_account'")));
    }

    #[test]
    fn substring_pattern_is_case_insensitive() {
        let mut case = mk_case();
        case.expected_content_patterns = vec!["CONFIRMED".to_string()];
        let check = evaluate(&case, &mk_outcome("lookup confirmed", &[], 10));
        assert!(check.patterns_ok);
    }

    #[test]
    fn regex_pattern_matches() {
        let mut case = mk_case();
        case.expected_content_patterns = vec![r"order #\d+".to_string()];
        let check = evaluate(&case, &mk_outcome("your order #4521 shipped", &[], 10));
        assert!(check.patterns_ok);
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let mut case = mk_case();
        // Unbalanced bracket, not a valid regex, but a literal match exists.
        case.expected_content_patterns = vec!["result[".to_string()];
        let check = evaluate(&case, &mk_outcome("raw result[ dump", &[], 10));
        assert!(check.patterns_ok);
    }

    #[test]
    fn missing_pattern_fails_with_detail() {
        let mut case = mk_case();
        case.expected_content_patterns = vec!["confirmed".to_string()];
        let check = evaluate(&case, &mk_outcome("sorry, something went wrong", &[], 10));
        assert!(!check.patterns_ok);
        assert!(check
            .details
            .iter()
            .any(|d| d.contains("did not match pattern 'confirmed'")));
    }

    #[test]
    fn latency_within_budget_passes_at_exact_boundary() {
        let mut case = mk_case();
        case.max_latency_ms = Some(2_000);
        assert!(evaluate(&case, &mk_outcome("ok", &[], 2_000)).latency_ok);
        assert!(!evaluate(&case, &mk_outcome("ok", &[], 2_001)).latency_ok);
    }

    #[test]
    fn null_latency_budget_always_passes() {
        let case = mk_case();
        assert!(evaluate(&case, &mk_outcome("ok", &[], u64::MAX)).latency_ok);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut case = mk_case();
        case.expected_tools = vec!["lookup".to_string()];
        case.expected_content_patterns = vec!["confirmed".to_string()];
        case.max_latency_ms = Some(100);

        let outcome = mk_outcome("nope", &["other"], 500);
        let first = evaluate(&case, &outcome);
        let second = evaluate(&case, &outcome);
        assert_eq!(first, second);
    }

    #[test]
    fn per_turn_expectations_checked_against_that_turn() {
        let mut case = mk_case();
        case.input = String::new();
        case.turns = vec![
            TurnDefinition {
                role: Default::default(),
                message: "first".to_string(),
                expected_tools: vec!["search".to_string()],
                unexpected_tools: vec![],
                expected_content_patterns: vec![],
                description: String::new(),
            },
            TurnDefinition {
                role: Default::default(),
                message: "second".to_string(),
                expected_tools: vec![],
                unexpected_tools: vec![],
                expected_content_patterns: vec!["booked".to_string()],
                description: String::new(),
            },
        ];

        let outcome = CaseExecutionOutcome {
            content: "booked it".to_string(),
            turns: vec![
                TurnResult {
                    index: 0,
                    content: "searching".to_string(),
                    // search was called in turn 1, not turn 0
                    tool_calls: vec![],
                    latency_ms: 5,
                },
                TurnResult {
                    index: 1,
                    content: "booked it".to_string(),
                    tool_calls: vec![ToolCall {
                        name: "search".to_string(),
                        input: "{}".to_string(),
                        result: None,
                    }],
                    latency_ms: 5,
                },
            ],
            ..Default::default()
        };

        let check = evaluate(&case, &outcome);
        assert!(!check.tools_ok);
        assert!(check.details.iter().any(|d| d.starts_with("turn 0:")));
        assert!(check.patterns_ok);
    }
}
