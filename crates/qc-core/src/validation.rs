//! Validation for quality-engine configuration and suite definitions.

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::types::{TestCase, TestSuite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for QualityConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.engine.default_case_timeout_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "engine.case_timeout.zero",
                message: "default case timeout must be greater than zero".to_string(),
            });
        }

        if self.engine.default_case_timeout_ms > 0 && self.engine.default_case_timeout_ms < 1_000 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "engine.case_timeout.low",
                message: format!(
                    "case timeout {}ms is very low; agent calls may be aborted before replying",
                    self.engine.default_case_timeout_ms
                ),
            });
        }

        if !(0.0..=1.0).contains(&self.judge.default_min_quality) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "judge.min_quality.range",
                message: format!(
                    "default_min_quality {} is outside [0, 1]",
                    self.judge.default_min_quality
                ),
            });
        }

        if self.rollout.review_reject_delta_warn <= 0.0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "rollout.review_delta.nonpositive",
                message: "review_reject_delta_warn must be positive".to_string(),
            });
        }

        if self.rollout.qa_failure_delta_warn <= 0.0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "rollout.qa_delta.nonpositive",
                message: "qa_failure_delta_warn must be positive".to_string(),
            });
        }

        if self.rollout.default_minimum_sample_size == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "rollout.min_sample.zero",
                message: "minimum sample size of 0 lets canaries promote with no observations"
                    .to_string(),
            });
        }

        issues
    }
}

impl Validate for TestCase {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.input.trim().is_empty() && self.turns.is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "case.input.empty",
                message: format!(
                    "case '{}' has neither an input message nor turns",
                    self.name
                ),
            });
        }

        if !self.input.trim().is_empty() && !self.turns.is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "case.input.ambiguous",
                message: format!(
                    "case '{}' defines both a single-turn input and a turn list",
                    self.name
                ),
            });
        }

        for (index, turn) in self.turns.iter().enumerate() {
            if turn.message.trim().is_empty() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "case.turn.empty_message",
                    message: format!("case '{}' turn {} has an empty message", self.name, index),
                });
            }
        }

        if let Some(threshold) = self.min_quality_score {
            if !(0.0..=1.0).contains(&threshold) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "case.min_quality.range",
                    message: format!(
                        "case '{}' min_quality_score {threshold} is outside [0, 1]",
                        self.name
                    ),
                });
            }
        }

        if let Some(budget) = self.max_latency_ms {
            if budget == 0 {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "case.max_latency.zero",
                    message: format!(
                        "case '{}' has a zero latency budget, it can never pass",
                        self.name
                    ),
                });
            }
        }

        for tool in &self.expected_tools {
            if self.unexpected_tools.contains(tool) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "case.tools.contradiction",
                    message: format!(
                        "case '{}' lists tool '{}' as both expected and unexpected",
                        self.name, tool
                    ),
                });
            }
        }

        issues
    }
}

impl Validate for TestSuite {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.agent_id.0.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "suite.agent_id.empty",
                message: format!("suite '{}' has no owning agent id", self.name),
            });
        }

        if self.enabled_cases().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "suite.cases.none_enabled",
                message: format!("suite '{}' has no enabled cases, a run would do nothing", self.name),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for case in &self.cases {
            if !seen.insert(&case.id.0) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "suite.case_id.duplicate",
                    message: format!("suite '{}' repeats case id '{}'", self.name, case.id),
                });
            }
            issues.extend(case.validate());
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, CaseId, SuiteId, TurnDefinition};

    fn mk_case(id: &str) -> TestCase {
        TestCase {
            id: CaseId::new(id),
            name: format!("case {id}"),
            description: String::new(),
            input: "hello".to_string(),
            turns: Vec::new(),
            expected_tools: Vec::new(),
            unexpected_tools: Vec::new(),
            expected_content_patterns: Vec::new(),
            max_latency_ms: None,
            min_quality_score: Some(0.5),
            enabled: true,
        }
    }

    fn mk_suite(cases: Vec<TestCase>) -> TestSuite {
        TestSuite {
            id: SuiteId::new("S1"),
            agent_id: AgentId("joi".to_string()),
            name: "smoke".to_string(),
            tags: vec![],
            enabled: true,
            cases,
        }
    }

    #[test]
    fn valid_suite_has_no_issues() {
        assert!(mk_suite(vec![mk_case("C1")]).validate().is_empty());
    }

    #[test]
    fn case_without_input_or_turns_is_an_error() {
        let mut case = mk_case("C1");
        case.input = String::new();
        let issues = case.validate();
        assert!(issues.iter().any(|i| i.code == "case.input.empty"));
    }

    #[test]
    fn case_with_both_input_and_turns_is_an_error() {
        let mut case = mk_case("C1");
        case.turns.push(TurnDefinition {
            role: Default::default(),
            message: "second".to_string(),
            expected_tools: vec![],
            unexpected_tools: vec![],
            expected_content_patterns: vec![],
            description: String::new(),
        });
        let issues = case.validate();
        assert!(issues.iter().any(|i| i.code == "case.input.ambiguous"));
    }

    #[test]
    fn contradictory_tool_expectations_flagged() {
        let mut case = mk_case("C1");
        case.expected_tools = vec!["lookup".to_string()];
        case.unexpected_tools = vec!["lookup".to_string()];
        let issues = case.validate();
        assert!(issues.iter().any(|i| i.code == "case.tools.contradiction"));
    }

    #[test]
    fn quality_threshold_out_of_range_flagged() {
        let mut case = mk_case("C1");
        case.min_quality_score = Some(1.5);
        let issues = case.validate();
        assert!(issues.iter().any(|i| i.code == "case.min_quality.range"));
    }

    #[test]
    fn duplicate_case_ids_flagged() {
        let suite = mk_suite(vec![mk_case("C1"), mk_case("C1")]);
        let issues = suite.validate();
        assert!(issues.iter().any(|i| i.code == "suite.case_id.duplicate"));
    }

    #[test]
    fn suite_with_only_disabled_cases_warns() {
        let mut case = mk_case("C1");
        case.enabled = false;
        let issues = mk_suite(vec![case]).validate();
        assert!(issues
            .iter()
            .any(|i| i.code == "suite.cases.none_enabled" && i.level == ValidationLevel::Warning));
    }

    #[test]
    fn config_zero_timeout_is_an_error() {
        let mut config = QualityConfig::default();
        config.engine.default_case_timeout_ms = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.code == "engine.case_timeout.zero"));
    }

    #[test]
    fn config_defaults_validate_clean() {
        assert!(QualityConfig::default().validate().is_empty());
    }
}
