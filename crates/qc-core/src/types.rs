//! Core types for the quality engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ResultStatus, RolloutStatus, RunStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuiteId(pub String);

impl SuiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SuiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SuiteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolloutId(pub String);

impl RolloutId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RolloutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RolloutId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fidelity level a case is executed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Real agent call with real side effects and real tool backends.
    Live,
    /// Read-only duplicated execution with no side effects.
    Shadow,
    /// Fully simulated tool responses, nothing real is touched.
    #[default]
    DryRun,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Live => "live",
            ExecutionMode::Shadow => "shadow",
            ExecutionMode::DryRun => "dry_run",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "live" => Ok(ExecutionMode::Live),
            "shadow" => Ok(ExecutionMode::Shadow),
            "dry_run" | "dry-run" => Ok(ExecutionMode::DryRun),
            other => Err(format!(
                "invalid execution mode '{other}'. valid values: live, shadow, dry_run"
            )),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic delay ranges for non-live execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub tool_min_ms: u64,
    pub tool_max_ms: u64,
    pub response_min_ms: u64,
    pub response_max_ms: u64,
    #[serde(default)]
    pub jitter_ms: u64,
}

/// Role attached to a scripted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    #[default]
    User,
    System,
}

/// One scripted turn of a multi-turn case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDefinition {
    #[serde(default)]
    pub role: TurnRole,
    pub message: String,
    #[serde(default)]
    pub expected_tools: Vec<String>,
    #[serde(default)]
    pub unexpected_tools: Vec<String>,
    #[serde(default)]
    pub expected_content_patterns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// A single scripted interaction with pass/fail criteria.
///
/// Single-turn cases carry their message in `input`; multi-turn cases carry
/// an ordered `turns` list and leave `input` empty. A case is multi-turn iff
/// `turns` is non-empty (enforced by validation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: CaseId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub turns: Vec<TurnDefinition>,
    #[serde(default)]
    pub expected_tools: Vec<String>,
    #[serde(default)]
    pub unexpected_tools: Vec<String>,
    #[serde(default)]
    pub expected_content_patterns: Vec<String>,
    /// Latency budget in milliseconds. `None` means no budget.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Minimum composite judge score in `[0, 1]` for the case to pass.
    /// `None` defers to the configured default; an explicit 0.0 makes the
    /// quality gate vacuous for this case.
    #[serde(default)]
    pub min_quality_score: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TestCase {
    pub fn is_multi_turn(&self) -> bool {
        !self.turns.is_empty()
    }
}

fn default_true() -> bool {
    true
}

/// Named collection of test cases targeting one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: SuiteId,
    pub agent_id: AgentId,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    /// Cases that will actually be attempted by a run.
    pub fn enabled_cases(&self) -> Vec<&TestCase> {
        self.cases.iter().filter(|c| c.enabled).collect()
    }
}

/// Immutable configuration snapshot for one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub case_timeout_ms: Option<u64>,
    #[serde(default)]
    pub latency_profile: Option<LatencyProfile>,
    #[serde(default = "default_true")]
    pub keep_conversation_artifacts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::DryRun,
            case_timeout_ms: None,
            latency_profile: None,
            keep_conversation_artifacts: true,
        }
    }
}

/// One execution of all enabled cases in a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: RunId,
    pub suite_id: SuiteId,
    pub agent_id: AgentId,
    pub config: RunConfig,
    pub status: RunStatus,
    pub total_cases: u32,
    pub passed: u32,
    pub failed: u32,
    pub errored: u32,
    pub total_latency_ms: u64,
    pub total_cost_usd: f64,
    /// Mean composite judge score over judged, non-errored cases.
    pub avg_quality: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Populated only on orchestrator-level failure.
    pub failure_reason: Option<String>,
}

impl TestRun {
    pub fn new(id: RunId, suite: &TestSuite, config: RunConfig, total_cases: u32) -> Self {
        Self {
            id,
            suite_id: suite.id.clone(),
            agent_id: suite.agent_id.clone(),
            config,
            status: RunStatus::Running,
            total_cases,
            passed: 0,
            failed: 0,
            errored: 0,
            total_latency_ms: 0,
            total_cost_usd: 0.0,
            avg_quality: None,
            started_at: Utc::now(),
            ended_at: None,
            failure_reason: None,
        }
    }

    pub fn counted(&self) -> u32 {
        self.passed + self.failed + self.errored
    }
}

/// One recorded tool invocation from an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Tool input, serialized as JSON text.
    #[serde(default)]
    pub input: String,
    /// Simulated or captured result (dry_run / shadow only for simulated).
    #[serde(default)]
    pub result: Option<String>,
}

/// Per-turn slice of a multi-turn execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResult {
    pub index: usize,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub latency_ms: u64,
}

/// Deterministic rule-check verdict for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCheckResult {
    pub tools_ok: bool,
    pub patterns_ok: bool,
    pub latency_ok: bool,
    /// One display-ready line per failed sub-check.
    #[serde(default)]
    pub details: Vec<String>,
}

impl RuleCheckResult {
    pub fn passing() -> Self {
        Self {
            tools_ok: true,
            patterns_ok: true,
            latency_ok: true,
            details: Vec::new(),
        }
    }

    pub fn all_ok(&self) -> bool {
        self.tools_ok && self.patterns_ok && self.latency_ok
    }
}

/// Subjective scores from the LLM judge, all in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeScore {
    pub correctness: f64,
    pub tool_accuracy: f64,
    pub response_quality: f64,
    pub reasoning: String,
    /// Holistic context-retention score, multi-turn cases only.
    #[serde(default)]
    pub flow_coherence: Option<f64>,
    #[serde(default)]
    pub flow_reasoning: Option<String>,
}

impl JudgeScore {
    /// Gating composite. Flow coherence is reported separately and not
    /// blended in here.
    pub fn composite(&self) -> f64 {
        (self.correctness + self.tool_accuracy + self.response_quality) / 3.0
    }
}

/// Outcome of one TestCase within one TestRun. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub run_id: RunId,
    pub case_id: CaseId,
    pub case_name: String,
    pub status: ResultStatus,
    /// Final agent content (the transcript tail the rules matched against).
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub turns: Vec<TurnResult>,
    pub rule_check: RuleCheckResult,
    /// `None` when the judge was unavailable.
    pub judge: Option<JudgeScore>,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Infra failure reason, e.g. `"timeout"`. Set only when errored.
    pub error_reason: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Severity of a derived issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSeverity::Low => "low",
            IssueSeverity::Medium => "medium",
            IssueSeverity::High => "high",
            IssueSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Tools,
    Content,
    Latency,
    Quality,
    Infrastructure,
}

impl IssueCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Tools => "tools",
            IssueCategory::Content => "content",
            IssueCategory::Latency => "latency",
            IssueCategory::Quality => "quality",
            IssueCategory::Infrastructure => "infrastructure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    Investigating,
    AutodevAssigned,
    Fixed,
    Closed,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::Investigating => "investigating",
            IssueStatus::AutodevAssigned => "autodev_assigned",
            IssueStatus::Fixed => "fixed",
            IssueStatus::Closed => "closed",
        }
    }
}

/// Pointer from an issue back to the offending result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvidence {
    pub case_id: CaseId,
    pub case_name: String,
    /// Transcript excerpt or failure detail line.
    pub excerpt: String,
}

/// Tracked failure derived from a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub run_id: RunId,
    pub suite_id: SuiteId,
    pub title: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub status: IssueStatus,
    #[serde(default)]
    pub evidence: Vec<IssueEvidence>,
    /// Shared failure signature this issue groups.
    pub signature: String,
    /// `"{suite_id}:{signature}"`, stable across repeated runs.
    pub idempotency_key: String,
    #[serde(default)]
    pub external_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Baseline/current pair with precomputed delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RateDelta {
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

/// Externally supplied production observations for one canary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RolloutMetrics {
    pub sample_size: u64,
    pub review_reject_rate: RateDelta,
    pub qa_failure_rate: RateDelta,
    pub high_severity_incidents: u64,
}

/// One staged agent-behavior canary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoulRollout {
    pub id: RolloutId,
    pub agent_id: AgentId,
    pub soul_version: String,
    pub status: RolloutStatus,
    pub traffic_percent: f64,
    pub minimum_sample_size: u64,
    pub metrics: RolloutMetrics,
    /// Populated on any transition out of `canary_active`.
    pub decision_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, at the transition out of `canary_active`.
    pub ended_at: Option<DateTime<Utc>>,
}

impl SoulRollout {
    pub fn is_active(&self) -> bool {
        self.status == RolloutStatus::CanaryActive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_case() -> TestCase {
        TestCase {
            id: CaseId::new("C1"),
            name: "lookup confirmation".to_string(),
            description: String::new(),
            input: "look up my order".to_string(),
            turns: Vec::new(),
            expected_tools: vec!["lookup".to_string()],
            unexpected_tools: Vec::new(),
            expected_content_patterns: vec!["confirmed".to_string()],
            max_latency_ms: Some(2_000),
            min_quality_score: Some(0.7),
            enabled: true,
        }
    }

    #[test]
    fn execution_mode_roundtrip() {
        for mode in [
            ExecutionMode::Live,
            ExecutionMode::Shadow,
            ExecutionMode::DryRun,
        ] {
            let parsed: ExecutionMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("turbo".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn execution_mode_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionMode::DryRun).unwrap();
        assert_eq!(json, "\"dry_run\"");
    }

    #[test]
    fn single_turn_case_is_not_multi_turn() {
        assert!(!mk_case().is_multi_turn());
    }

    #[test]
    fn suite_filters_disabled_cases() {
        let mut disabled = mk_case();
        disabled.id = CaseId::new("C2");
        disabled.enabled = false;

        let suite = TestSuite {
            id: SuiteId::new("S1"),
            agent_id: AgentId("joi".to_string()),
            name: "smoke".to_string(),
            tags: vec![],
            enabled: true,
            cases: vec![mk_case(), disabled],
        };

        let enabled = suite.enabled_cases();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id.0, "C1");
    }

    #[test]
    fn judge_composite_is_mean_of_three() {
        let score = JudgeScore {
            correctness: 0.9,
            tool_accuracy: 0.6,
            response_quality: 0.3,
            reasoning: "mixed".to_string(),
            flow_coherence: Some(0.0),
            flow_reasoning: None,
        };
        assert!((score.composite() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn run_counters_start_at_zero() {
        let suite = TestSuite {
            id: SuiteId::new("S1"),
            agent_id: AgentId("joi".to_string()),
            name: "smoke".to_string(),
            tags: vec![],
            enabled: true,
            cases: vec![mk_case()],
        };
        let run = TestRun::new(RunId::new("R1"), &suite, RunConfig::default(), 1);
        assert_eq!(run.counted(), 0);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn rule_check_vacuous_pass() {
        let check = RuleCheckResult::passing();
        assert!(check.all_ok());
        assert!(check.details.is_empty());
    }

    #[test]
    fn test_run_roundtrip_json() {
        let suite = TestSuite {
            id: SuiteId::new("S1"),
            agent_id: AgentId("joi".to_string()),
            name: "smoke".to_string(),
            tags: vec!["nightly".to_string()],
            enabled: true,
            cases: vec![],
        };
        let run = TestRun::new(RunId::new("R1"), &suite, RunConfig::default(), 0);
        let json = serde_json::to_string(&run).unwrap();
        let decoded: TestRun = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, run);
    }

    #[test]
    fn rollout_active_check() {
        let rollout = SoulRollout {
            id: RolloutId::new("RO1"),
            agent_id: AgentId("joi".to_string()),
            soul_version: "v3".to_string(),
            status: RolloutStatus::CanaryActive,
            traffic_percent: 10.0,
            minimum_sample_size: 50,
            metrics: RolloutMetrics::default(),
            decision_reason: None,
            started_at: Utc::now(),
            ended_at: None,
        };
        assert!(rollout.is_active());
    }
}
