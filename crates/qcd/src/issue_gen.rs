//! Converts failing results from a completed run into tracked issues.
//!
//! Results are grouped by failure signature (failed rule-check category,
//! or infrastructure error reason) and each signature yields at most one
//! issue per run. The idempotency key `"{suite_id}:{signature}"` keeps
//! repeated runs from piling up duplicate open issues.

use chrono::Utc;
use qc_core::state::ResultStatus;
use qc_core::types::{
    Issue, IssueCategory, IssueEvidence, IssueId, IssueSeverity, IssueStatus, TestCase, TestResult,
    TestRun, TestSuite,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("task tracker unreachable: {message}")]
    Unreachable { message: String },
    #[error("task tracker rejected issue {issue_id}: {message}")]
    Rejected { issue_id: String, message: String },
}

/// External task-system hook. `Ok(Some(id))` when the issue was filed
/// externally, `Ok(None)` when the tracker does not mint ids.
pub trait TaskTracker: Send + Sync {
    fn file_task(&self, issue: &Issue) -> Result<Option<String>, TrackerError>;
}

/// Tracker that only logs. Used when no external task system is wired up.
#[derive(Debug, Default)]
pub struct LogTracker;

impl TaskTracker for LogTracker {
    fn file_task(&self, issue: &Issue) -> Result<Option<String>, TrackerError> {
        eprintln!(
            "[issues] {} [{}] {}: {}",
            issue.id, issue.severity, issue.title, issue.description
        );
        Ok(None)
    }
}

pub struct IssueGenerator {
    tracker: Arc<dyn TaskTracker>,
}

impl IssueGenerator {
    pub fn new(tracker: Arc<dyn TaskTracker>) -> Self {
        Self { tracker }
    }

    /// Groups failed and errored results by signature and emits one issue
    /// per signature. Passed and skipped results are ignored.
    pub fn generate(
        &self,
        run: &TestRun,
        suite: &TestSuite,
        results: &[TestResult],
    ) -> Vec<Issue> {
        // First-seen order so issue numbering follows suite order.
        let mut groups: Vec<(String, Vec<&TestResult>)> = Vec::new();
        for result in results {
            if !matches!(result.status, ResultStatus::Failed | ResultStatus::Errored) {
                continue;
            }
            let signature = failure_signature(result);
            match groups.iter_mut().find(|(sig, _)| *sig == signature) {
                Some((_, members)) => members.push(result),
                None => groups.push((signature, vec![result])),
            }
        }

        let mut issues = Vec::new();
        for (index, (signature, members)) in groups.iter().enumerate() {
            let severity = severity_for(members, suite);
            let category = category_for(signature);
            let evidence: Vec<IssueEvidence> = members
                .iter()
                .map(|result| IssueEvidence {
                    case_id: result.case_id.clone(),
                    case_name: result.case_name.clone(),
                    excerpt: excerpt_for(result),
                })
                .collect();

            let mut issue = Issue {
                id: IssueId::new(format!("I-{}-{}", run.id, index + 1)),
                run_id: run.id.clone(),
                suite_id: run.suite_id.clone(),
                title: title_for(signature, members.len()),
                description: describe(members),
                severity,
                category,
                status: IssueStatus::Open,
                evidence,
                signature: signature.clone(),
                idempotency_key: format!("{}:{}", run.suite_id, signature),
                external_task_id: None,
                created_at: Utc::now(),
            };
            match self.tracker.file_task(&issue) {
                Ok(external_id) => issue.external_task_id = external_id,
                Err(err) => eprintln!("[issues] forwarding {} failed: {err}", issue.id),
            }
            issues.push(issue);
        }
        issues
    }
}

/// Signature of a failing result: the first failed rule-check category in
/// tools/content/latency order, the quality threshold, or the infra reason.
fn failure_signature(result: &TestResult) -> String {
    if result.status == ResultStatus::Errored {
        let reason = result.error_reason.as_deref().unwrap_or("unknown");
        return format!("infrastructure:{reason}");
    }
    if !result.rule_check.tools_ok {
        return "tools".to_string();
    }
    if !result.rule_check.patterns_ok {
        return "content".to_string();
    }
    if !result.rule_check.latency_ok {
        return "latency".to_string();
    }
    // Rules held, so the case failed the quality threshold.
    "quality:below_threshold".to_string()
}

fn category_for(signature: &str) -> IssueCategory {
    if signature.starts_with("infrastructure:") {
        IssueCategory::Infrastructure
    } else if signature == "tools" {
        IssueCategory::Tools
    } else if signature == "content" {
        IssueCategory::Content
    } else if signature == "latency" {
        IssueCategory::Latency
    } else {
        IssueCategory::Quality
    }
}

/// Severity heuristic:
/// - `critical` for an errored case that produced no quality signal at all,
/// - `high` when multiple cases share the signature,
/// - otherwise `medium`/`low` by the worst quality-score gap in the group.
fn severity_for(members: &[&TestResult], suite: &TestSuite) -> IssueSeverity {
    if members
        .iter()
        .any(|result| result.status == ResultStatus::Errored && result.judge.is_none())
    {
        return IssueSeverity::Critical;
    }
    if members.len() > 1 {
        return IssueSeverity::High;
    }
    let gap = members
        .iter()
        .filter_map(|result| {
            let judge = result.judge.as_ref()?;
            let threshold = find_case(suite, result)?.min_quality_score?;
            Some(threshold - judge.composite())
        })
        .fold(0.0_f64, f64::max);
    if gap > 0.3 {
        IssueSeverity::Medium
    } else {
        IssueSeverity::Low
    }
}

fn find_case<'a>(suite: &'a TestSuite, result: &TestResult) -> Option<&'a TestCase> {
    suite.cases.iter().find(|case| case.id == result.case_id)
}

fn title_for(signature: &str, count: usize) -> String {
    let what = match category_for(signature) {
        IssueCategory::Tools => "tool expectations not met".to_string(),
        IssueCategory::Content => "content pattern missing".to_string(),
        IssueCategory::Latency => "latency budget exceeded".to_string(),
        IssueCategory::Quality => "quality score below threshold".to_string(),
        IssueCategory::Infrastructure => {
            let reason = signature.trim_start_matches("infrastructure:");
            format!("infrastructure failure: {reason}")
        }
    };
    if count > 1 {
        format!("{what} ({count} cases)")
    } else {
        what
    }
}

fn describe(members: &[&TestResult]) -> String {
    members
        .iter()
        .map(|result| format!("{}: {}", result.case_name, excerpt_for(result)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One display-ready line per offending result, for issue evidence.
fn excerpt_for(result: &TestResult) -> String {
    if let Some(reason) = &result.error_reason {
        return reason.clone();
    }
    if let Some(detail) = result.rule_check.details.first() {
        return detail.clone();
    }
    if let Some(judge) = &result.judge {
        return format!("composite score {:.2}: {}", judge.composite(), judge.reasoning);
    }
    let mut excerpt = result.content.clone();
    excerpt.truncate(200);
    excerpt
}
