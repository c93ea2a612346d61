use chrono::{DateTime, Utc};
use qc_core::state::{ResultStatus, RolloutStatus, RunStatus};
use qc_core::types::{Issue, IssueId, RolloutId, RunId, SoulRollout, SuiteId, TestResult, TestRun};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("timestamp parse error for value '{value}': {source}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    suite_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    status_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_suite ON runs(suite_id, started_at);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status_tag);

CREATE TABLE IF NOT EXISTS results (
    run_id TEXT NOT NULL,
    case_id TEXT NOT NULL,
    status_tag TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (run_id, case_id)
);

CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id, completed_at);
CREATE INDEX IF NOT EXISTS idx_results_status ON results(status_tag);

CREATE TABLE IF NOT EXISTS issues (
    issue_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    suite_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    category TEXT NOT NULL,
    status_tag TEXT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_run ON issues(run_id);
CREATE INDEX IF NOT EXISTS idx_issues_suite ON issues(suite_id, created_at);

CREATE TABLE IF NOT EXISTS rollouts (
    rollout_id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    soul_version TEXT NOT NULL,
    status_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_rollouts_agent ON rollouts(agent_id, started_at);
CREATE INDEX IF NOT EXISTS idx_rollouts_status ON rollouts(status_tag);
"#,
        )?;
        Ok(())
    }

    // ── runs ──────────────────────────────────────────────────────────────

    pub fn upsert_run(&self, run: &TestRun) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(run)?;
        self.conn.execute(
            r#"
INSERT INTO runs (run_id, suite_id, agent_id, status_tag, payload_json, started_at, ended_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(run_id) DO UPDATE SET
  status_tag = excluded.status_tag,
  payload_json = excluded.payload_json,
  ended_at = excluded.ended_at
"#,
            params![
                run.id.0,
                run.suite_id.0,
                run.agent_id.0,
                run.status.as_str(),
                payload,
                run.started_at.to_rfc3339(),
                run.ended_at.map(|at| at.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn load_run(&self, run_id: &RunId) -> Result<Option<TestRun>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM runs WHERE run_id = ?1",
                params![run_id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<TestRun>(&value))
            .transpose()
            .map_err(PersistenceError::from)
    }

    pub fn list_runs_for_suite(&self, suite_id: &SuiteId) -> Result<Vec<TestRun>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM runs WHERE suite_id = ?1 ORDER BY started_at DESC, run_id ASC",
        )?;
        let rows = stmt.query_map(params![suite_id.0], |row| row.get::<_, String>(0))?;
        let mut runs = Vec::new();
        for row in rows {
            let payload = row?;
            runs.push(serde_json::from_str::<TestRun>(&payload)?);
        }
        Ok(runs)
    }

    pub fn list_runs_by_status(&self, status: RunStatus) -> Result<Vec<TestRun>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM runs WHERE status_tag = ?1 ORDER BY started_at DESC, run_id ASC",
        )?;
        let rows = stmt.query_map(params![status.as_str()], |row| row.get::<_, String>(0))?;
        let mut runs = Vec::new();
        for row in rows {
            let payload = row?;
            runs.push(serde_json::from_str::<TestRun>(&payload)?);
        }
        Ok(runs)
    }

    // ── results ───────────────────────────────────────────────────────────

    pub fn upsert_result(&self, result: &TestResult) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(result)?;
        self.conn.execute(
            r#"
INSERT INTO results (run_id, case_id, status_tag, latency_ms, payload_json, completed_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(run_id, case_id) DO UPDATE SET
  status_tag = excluded.status_tag,
  latency_ms = excluded.latency_ms,
  payload_json = excluded.payload_json,
  completed_at = excluded.completed_at
"#,
            params![
                result.run_id.0,
                result.case_id.0,
                result.status.as_str(),
                result.latency_ms as i64,
                payload,
                result.completed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_results_for_run(&self, run_id: &RunId) -> Result<Vec<TestResult>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM results WHERE run_id = ?1 ORDER BY completed_at ASC, case_id ASC",
        )?;
        let rows = stmt.query_map(params![run_id.0], |row| row.get::<_, String>(0))?;
        let mut results = Vec::new();
        for row in rows {
            let payload = row?;
            results.push(serde_json::from_str::<TestResult>(&payload)?);
        }
        Ok(results)
    }

    pub fn count_results_by_status(
        &self,
        run_id: &RunId,
        status: ResultStatus,
    ) -> Result<u32, PersistenceError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM results WHERE run_id = ?1 AND status_tag = ?2",
            params![run_id.0, status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // ── issues ────────────────────────────────────────────────────────────

    /// Inserts the issue unless one with the same idempotency key already
    /// exists. Returns `true` when a row was written.
    pub fn insert_issue_if_new(&self, issue: &Issue) -> Result<bool, PersistenceError> {
        let payload = serde_json::to_string(issue)?;
        let changed = self.conn.execute(
            r#"
INSERT INTO issues (issue_id, run_id, suite_id, severity, category, status_tag,
                    idempotency_key, payload_json, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(idempotency_key) DO NOTHING
"#,
            params![
                issue.id.0,
                issue.run_id.0,
                issue.suite_id.0,
                issue.severity.as_str(),
                issue.category.as_str(),
                issue.status.as_str(),
                issue.idempotency_key,
                payload,
                issue.created_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn load_issue(&self, issue_id: &IssueId) -> Result<Option<Issue>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM issues WHERE issue_id = ?1",
                params![issue_id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<Issue>(&value))
            .transpose()
            .map_err(PersistenceError::from)
    }

    pub fn list_issues_for_suite(&self, suite_id: &SuiteId) -> Result<Vec<Issue>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM issues WHERE suite_id = ?1 ORDER BY created_at ASC, issue_id ASC",
        )?;
        let rows = stmt.query_map(params![suite_id.0], |row| row.get::<_, String>(0))?;
        let mut issues = Vec::new();
        for row in rows {
            let payload = row?;
            issues.push(serde_json::from_str::<Issue>(&payload)?);
        }
        Ok(issues)
    }

    // ── rollouts ──────────────────────────────────────────────────────────

    pub fn upsert_rollout(&self, rollout: &SoulRollout) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(rollout)?;
        self.conn.execute(
            r#"
INSERT INTO rollouts (rollout_id, agent_id, soul_version, status_tag, payload_json, started_at, ended_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(rollout_id) DO UPDATE SET
  status_tag = excluded.status_tag,
  payload_json = excluded.payload_json,
  ended_at = excluded.ended_at
"#,
            params![
                rollout.id.0,
                rollout.agent_id.0,
                rollout.soul_version,
                rollout.status.as_str(),
                payload,
                rollout.started_at.to_rfc3339(),
                rollout.ended_at.map(|at| at.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn load_rollout(
        &self,
        rollout_id: &RolloutId,
    ) -> Result<Option<SoulRollout>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM rollouts WHERE rollout_id = ?1",
                params![rollout_id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<SoulRollout>(&value))
            .transpose()
            .map_err(PersistenceError::from)
    }

    pub fn list_rollouts_by_status(
        &self,
        status: RolloutStatus,
    ) -> Result<Vec<SoulRollout>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM rollouts WHERE status_tag = ?1 ORDER BY started_at ASC, rollout_id ASC",
        )?;
        let rows = stmt.query_map(params![status.as_str()], |row| row.get::<_, String>(0))?;
        let mut rollouts = Vec::new();
        for row in rows {
            let payload = row?;
            rollouts.push(serde_json::from_str::<SoulRollout>(&payload)?);
        }
        Ok(rollouts)
    }
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|source| PersistenceError::TimestampParse {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_core::types::{
        AgentId, CaseId, IssueCategory, IssueSeverity, IssueStatus, RolloutMetrics,
        RuleCheckResult, RunConfig, TestCase, TestSuite,
    };

    fn mk_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    fn mk_run(id: &str) -> TestRun {
        let suite = TestSuite {
            id: SuiteId::new("S1"),
            agent_id: AgentId::new("agent-1"),
            name: "smoke".to_string(),
            tags: vec![],
            enabled: true,
            cases: vec![TestCase {
                id: CaseId::new("C1"),
                name: "greets".to_string(),
                description: String::new(),
                input: "say hello".to_string(),
                turns: vec![],
                expected_tools: vec![],
                unexpected_tools: vec![],
                expected_content_patterns: vec![],
                max_latency_ms: None,
                min_quality_score: None,
                enabled: true,
            }],
        };
        TestRun::new(RunId::new(id), &suite, RunConfig::default(), 1)
    }

    fn mk_result(run: &str, case: &str, status: ResultStatus) -> TestResult {
        TestResult {
            run_id: RunId::new(run),
            case_id: CaseId::new(case),
            case_name: case.to_string(),
            status,
            content: "hello".to_string(),
            tool_calls: vec![],
            turns: vec![],
            rule_check: RuleCheckResult::passing(),
            judge: None,
            latency_ms: 12,
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            error_reason: None,
            completed_at: Utc::now(),
        }
    }

    fn mk_issue(id: &str, key: &str) -> Issue {
        Issue {
            id: IssueId::new(id),
            run_id: RunId::new("R1"),
            suite_id: SuiteId::new("S1"),
            title: "missing tool 'lookup'".to_string(),
            description: "expected tool was never called".to_string(),
            severity: IssueSeverity::Medium,
            category: IssueCategory::Tools,
            status: IssueStatus::Open,
            evidence: vec![],
            signature: "tools:missing:lookup".to_string(),
            idempotency_key: key.to_string(),
            external_task_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn run_round_trips_through_store() {
        let store = mk_store();
        let run = mk_run("R1");
        store.upsert_run(&run).unwrap();

        let loaded = store.load_run(&RunId::new("R1")).unwrap().unwrap();
        assert_eq!(loaded, run);
        assert!(store.load_run(&RunId::new("R-missing")).unwrap().is_none());
    }

    #[test]
    fn upsert_run_updates_existing_row() {
        let store = mk_store();
        let mut run = mk_run("R1");
        store.upsert_run(&run).unwrap();

        run.status = RunStatus::Completed;
        run.passed = 1;
        run.ended_at = Some(Utc::now());
        store.upsert_run(&run).unwrap();

        let loaded = store.load_run(&run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);
        assert_eq!(loaded.passed, 1);
        assert_eq!(store.list_runs_for_suite(&SuiteId::new("S1")).unwrap().len(), 1);
    }

    #[test]
    fn results_list_and_count_by_status() {
        let store = mk_store();
        store
            .upsert_result(&mk_result("R1", "C1", ResultStatus::Passed))
            .unwrap();
        store
            .upsert_result(&mk_result("R1", "C2", ResultStatus::Failed))
            .unwrap();
        store
            .upsert_result(&mk_result("R2", "C1", ResultStatus::Passed))
            .unwrap();

        let run1 = store.list_results_for_run(&RunId::new("R1")).unwrap();
        assert_eq!(run1.len(), 2);
        assert_eq!(
            store
                .count_results_by_status(&RunId::new("R1"), ResultStatus::Passed)
                .unwrap(),
            1
        );
    }

    #[test]
    fn issue_insert_is_idempotent_on_key() {
        let store = mk_store();
        assert!(store.insert_issue_if_new(&mk_issue("I1", "S1:tools:missing:lookup")).unwrap());
        assert!(!store.insert_issue_if_new(&mk_issue("I2", "S1:tools:missing:lookup")).unwrap());

        let issues = store.list_issues_for_suite(&SuiteId::new("S1")).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id.0, "I1");
    }

    #[test]
    fn rollout_round_trips_and_filters_by_status() {
        let store = mk_store();
        let rollout = SoulRollout {
            id: RolloutId::new("RO1"),
            agent_id: AgentId::new("agent-1"),
            soul_version: "v2".to_string(),
            status: RolloutStatus::CanaryActive,
            traffic_percent: 10.0,
            minimum_sample_size: 50,
            metrics: RolloutMetrics::default(),
            decision_reason: None,
            started_at: Utc::now(),
            ended_at: None,
        };
        store.upsert_rollout(&rollout).unwrap();

        let active = store
            .list_rollouts_by_status(RolloutStatus::CanaryActive)
            .unwrap();
        assert_eq!(active.len(), 1);
        assert!(store
            .list_rollouts_by_status(RolloutStatus::Promoted)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn timestamp_parse_reports_bad_value() {
        let err = parse_timestamp("not-a-time").unwrap_err();
        assert!(err.to_string().contains("not-a-time"));
    }
}
