//! Sequences case execution for one suite run.
//!
//! Per run: acquire the suite lock, snapshot enabled cases, execute them
//! in suite order, combine executor + rules + judge into a verdict per
//! case, aggregate totals, then hand failures to the issue generator.
//! One case failing or erroring never aborts the run.

use chrono::Utc;
use qc_core::config::QualityConfig;
use qc_core::events::{Event, EventKind};
use qc_core::state::{ResultStatus, RunStatus};
use qc_core::types::{
    RunConfig, RunId, SuiteId, TestCase, TestResult, TestRun, TestSuite,
};
use qc_exec::{CancelToken, CaseExecutionOutcome, CaseExecutor, JudgeScorer, LatencySimulator};
use std::sync::{Arc, Mutex};

use crate::event_bus::EventBus;
use crate::event_log::JsonlEventLog;
use crate::issue_gen::IssueGenerator;
use crate::persistence::{PersistenceError, SqliteStore};
use crate::rules;
use crate::run_lock::{RunLockError, SuiteLockTable};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Conflict(#[from] RunLockError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Read-only suite snapshot provider. Runs never mutate suites.
pub trait SuiteSource: Send + Sync {
    fn fetch(&self, suite_id: &SuiteId) -> Result<TestSuite, String>;
}

/// Suite source backed by an in-memory map. Used by the CLI (suites loaded
/// from TOML up front) and by tests.
#[derive(Debug, Default)]
pub struct InMemorySuites {
    suites: Mutex<std::collections::HashMap<String, TestSuite>>,
}

impl InMemorySuites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, suite: TestSuite) {
        self.suites
            .lock()
            .expect("suite map poisoned")
            .insert(suite.id.0.clone(), suite);
    }
}

impl SuiteSource for InMemorySuites {
    fn fetch(&self, suite_id: &SuiteId) -> Result<TestSuite, String> {
        self.suites
            .lock()
            .expect("suite map poisoned")
            .get(&suite_id.0)
            .cloned()
            .ok_or_else(|| format!("suite {suite_id} not found"))
    }
}

pub struct RunOrchestrator {
    executor: CaseExecutor,
    judge: JudgeScorer,
    suites: Arc<dyn SuiteSource>,
    store: Arc<Mutex<SqliteStore>>,
    locks: SuiteLockTable,
    bus: EventBus,
    event_log: JsonlEventLog,
    issues: IssueGenerator,
    config: QualityConfig,
}

impl RunOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: CaseExecutor,
        judge: JudgeScorer,
        suites: Arc<dyn SuiteSource>,
        store: Arc<Mutex<SqliteStore>>,
        bus: EventBus,
        event_log: JsonlEventLog,
        issues: IssueGenerator,
        config: QualityConfig,
    ) -> Self {
        Self {
            executor,
            judge,
            suites,
            store,
            locks: SuiteLockTable::new(),
            bus,
            event_log,
            issues,
            config,
        }
    }

    /// Execute one full suite run. Returns `Conflict` when the suite
    /// already has a running run; a suite-fetch failure produces a run
    /// record marked failed with zero results instead of an error.
    pub fn run(
        &self,
        suite_id: &SuiteId,
        config: RunConfig,
    ) -> Result<(TestRun, Vec<TestResult>), OrchestratorError> {
        // Guard drops on every exit path, including a panic mid-run.
        let _guard = self.locks.acquire(suite_id)?;
        let run_id = next_run_id(suite_id);

        let suite = match self.suites.fetch(suite_id) {
            Ok(suite) => suite,
            Err(reason) => {
                eprintln!("[run] suite fetch failed for {suite_id}: {reason}");
                let run = self.record_fetch_failure(run_id, suite_id, config, &reason)?;
                return Ok((run, Vec::new()));
            }
        };

        let cases: Vec<TestCase> = suite.enabled_cases().into_iter().cloned().collect();
        let mut run = TestRun::new(run_id, &suite, config.clone(), cases.len() as u32);
        self.store_run(&run)?;

        eprintln!(
            "[run] {} starting for suite {} ({} cases, {})",
            run.id,
            suite_id,
            cases.len(),
            config.execution_mode
        );
        self.emit(Event::for_run(
            self.bus.next_event_id(),
            run.id.clone(),
            suite_id.clone(),
            EventKind::RunStarted {
                execution_mode: config.execution_mode,
                total_cases: run.total_cases,
            },
        ));

        let mut simulator = LatencySimulator::new(config.latency_profile.clone());
        let cancel = CancelToken::new();
        let mut results = Vec::with_capacity(cases.len());
        let mut quality_sum = 0.0;
        let mut quality_count = 0u32;

        for case in &cases {
            let outcome = self.executor.execute(
                case,
                &suite.agent_id,
                config.execution_mode,
                config.case_timeout_ms,
                &mut simulator,
                &cancel,
            );
            let rule_check = rules::evaluate(case, &outcome);
            let judge = if outcome.is_errored() {
                None
            } else {
                self.judge.score(case, &outcome)
            };

            let status = verdict(case, &outcome, &rule_check, judge.as_ref(), &self.config);
            if let Some(score) = &judge {
                if status != ResultStatus::Errored {
                    quality_sum += score.composite();
                    quality_count += 1;
                }
            }

            let mut result = TestResult {
                run_id: run.id.clone(),
                case_id: case.id.clone(),
                case_name: case.name.clone(),
                status,
                content: outcome.content.clone(),
                tool_calls: outcome.tool_calls.clone(),
                turns: outcome.turns.clone(),
                rule_check,
                judge,
                latency_ms: outcome.latency_ms,
                cost_usd: outcome.cost_usd,
                input_tokens: outcome.input_tokens,
                output_tokens: outcome.output_tokens,
                error_reason: outcome.error.clone(),
                completed_at: Utc::now(),
            };
            if !config.keep_conversation_artifacts {
                strip_artifacts(&mut result);
            }

            match status {
                ResultStatus::Passed => run.passed += 1,
                ResultStatus::Failed => run.failed += 1,
                ResultStatus::Errored => run.errored += 1,
                ResultStatus::Skipped => {}
            }
            run.total_latency_ms += result.latency_ms;
            run.total_cost_usd += result.cost_usd;

            self.store_result(&result)?;
            self.store_run(&run)?;
            self.emit(Event::for_run(
                self.bus.next_event_id(),
                run.id.clone(),
                suite_id.clone(),
                EventKind::CaseResult {
                    case_id: case.id.clone(),
                    case_name: case.name.clone(),
                    status,
                    latency_ms: result.latency_ms,
                },
            ));
            results.push(result);
        }

        run.status = RunStatus::Completed;
        run.ended_at = Some(Utc::now());
        if quality_count > 0 {
            run.avg_quality = Some(quality_sum / quality_count as f64);
        }
        self.store_run(&run)?;
        eprintln!(
            "[run] {} completed: {} passed, {} failed, {} errored",
            run.id, run.passed, run.failed, run.errored
        );
        self.emit(Event::for_run(
            self.bus.next_event_id(),
            run.id.clone(),
            suite_id.clone(),
            EventKind::RunCompleted {
                passed: run.passed,
                failed: run.failed,
                errored: run.errored,
                total_cases: run.total_cases,
            },
        ));

        self.raise_issues(&run, &suite, &results)?;
        Ok((run, results))
    }

    fn raise_issues(
        &self,
        run: &TestRun,
        suite: &TestSuite,
        results: &[TestResult],
    ) -> Result<(), OrchestratorError> {
        for issue in self.issues.generate(run, suite, results) {
            let inserted = self
                .store
                .lock()
                .expect("store poisoned")
                .insert_issue_if_new(&issue)?;
            if !inserted {
                eprintln!(
                    "[issues] open issue already exists for key {}",
                    issue.idempotency_key
                );
                continue;
            }
            self.emit(Event::for_run(
                self.bus.next_event_id(),
                run.id.clone(),
                run.suite_id.clone(),
                EventKind::IssueCreated {
                    issue_id: issue.id.clone(),
                    severity: issue.severity,
                    title: issue.title.clone(),
                },
            ));
        }
        Ok(())
    }

    /// Suite definition could not be read. The only run-fatal path: the
    /// run is recorded as failed with zero results.
    fn record_fetch_failure(
        &self,
        run_id: RunId,
        suite_id: &SuiteId,
        config: RunConfig,
        reason: &str,
    ) -> Result<TestRun, OrchestratorError> {
        let mut run = TestRun {
            id: run_id,
            suite_id: suite_id.clone(),
            agent_id: qc_core::types::AgentId::new("unknown"),
            config,
            status: RunStatus::Failed,
            total_cases: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            total_latency_ms: 0,
            total_cost_usd: 0.0,
            avg_quality: None,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            failure_reason: Some(reason.to_string()),
        };
        run.ended_at = Some(run.started_at);
        self.store_run(&run)?;
        self.emit(Event::for_run(
            self.bus.next_event_id(),
            run.id.clone(),
            suite_id.clone(),
            EventKind::RunFailed {
                reason: reason.to_string(),
            },
        ));
        Ok(run)
    }

    fn store_run(&self, run: &TestRun) -> Result<(), PersistenceError> {
        self.store.lock().expect("store poisoned").upsert_run(run)
    }

    fn store_result(&self, result: &TestResult) -> Result<(), PersistenceError> {
        self.store
            .lock()
            .expect("store poisoned")
            .upsert_result(result)
    }

    /// Publish to the bus and append to the JSONL log. A log write failure
    /// is reported but never fails the run.
    fn emit(&self, event: Event) {
        if let Err(err) = self.event_log.append(&event) {
            eprintln!("[events] journal append failed: {err}");
        }
        self.bus.publish(&event);
    }
}

/// Final status for one case.
///
/// `errored` when the executor hit an infrastructure failure; otherwise
/// `passed` iff every rule check held and the judge either did not score
/// the case or its composite clears the case threshold; otherwise `failed`.
fn verdict(
    case: &TestCase,
    outcome: &CaseExecutionOutcome,
    rule_check: &qc_core::types::RuleCheckResult,
    judge: Option<&qc_core::types::JudgeScore>,
    config: &QualityConfig,
) -> ResultStatus {
    if outcome.is_errored() {
        return ResultStatus::Errored;
    }
    if !rule_check.all_ok() {
        return ResultStatus::Failed;
    }
    match judge {
        None => ResultStatus::Passed,
        Some(score) => {
            let threshold = case
                .min_quality_score
                .unwrap_or(config.judge.default_min_quality);
            if score.composite() >= threshold {
                ResultStatus::Passed
            } else {
                ResultStatus::Failed
            }
        }
    }
}

/// Drop transcript payloads while keeping the verdict and accounting.
fn strip_artifacts(result: &mut TestResult) {
    result.content.clear();
    result.turns.clear();
    for call in &mut result.tool_calls {
        call.input.clear();
        call.result = None;
    }
}

fn next_run_id(suite_id: &SuiteId) -> RunId {
    RunId::new(format!(
        "R-{}-{}",
        suite_id,
        Utc::now().format("%Y%m%d%H%M%S%3f")
    ))
}
