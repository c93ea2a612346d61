//! Lifecycle events published by the run orchestrator and rollout engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ResultStatus, RolloutStatus};
use crate::types::{
    CaseId, EventId, ExecutionMode, IssueId, IssueSeverity, RolloutId, RunId, SuiteId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        execution_mode: ExecutionMode,
        total_cases: u32,
    },
    CaseResult {
        case_id: CaseId,
        case_name: String,
        status: ResultStatus,
        latency_ms: u64,
    },
    RunCompleted {
        passed: u32,
        failed: u32,
        errored: u32,
        total_cases: u32,
    },
    RunFailed {
        reason: String,
    },
    IssueCreated {
        issue_id: IssueId,
        severity: IssueSeverity,
        title: String,
    },
    RolloutEvaluated {
        action: String,
        reason: String,
    },
    RolloutTransition {
        from: RolloutStatus,
        to: RolloutStatus,
        reason: String,
    },
}

/// A lifecycle event. Carries enough identifiers for a subscriber to
/// reconstruct progress without polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub run_id: Option<RunId>,
    pub suite_id: Option<SuiteId>,
    pub rollout_id: Option<RolloutId>,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    /// Event scoped to one run.
    pub fn for_run(id: EventId, run_id: RunId, suite_id: SuiteId, kind: EventKind) -> Self {
        Self {
            id,
            run_id: Some(run_id),
            suite_id: Some(suite_id),
            rollout_id: None,
            at: Utc::now(),
            kind,
        }
    }

    /// Event scoped to one rollout.
    pub fn for_rollout(id: EventId, rollout_id: RolloutId, kind: EventKind) -> Self {
        Self {
            id,
            run_id: None,
            suite_id: None,
            rollout_id: Some(rollout_id),
            at: Utc::now(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_event_carries_run_and_suite_ids() {
        let event = Event::for_run(
            EventId("E1".to_string()),
            RunId::new("R1"),
            SuiteId::new("S1"),
            EventKind::RunStarted {
                execution_mode: ExecutionMode::DryRun,
                total_cases: 3,
            },
        );
        assert_eq!(event.run_id.as_ref().unwrap().0, "R1");
        assert_eq!(event.suite_id.as_ref().unwrap().0, "S1");
        assert!(event.rollout_id.is_none());
    }

    #[test]
    fn case_result_event_roundtrip_json() {
        let event = Event::for_run(
            EventId("E2".to_string()),
            RunId::new("R1"),
            SuiteId::new("S1"),
            EventKind::CaseResult {
                case_id: CaseId::new("C1"),
                case_name: "lookup confirmation".to_string(),
                status: ResultStatus::Passed,
                latency_ms: 420,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn rollout_transition_event_serializes_statuses() {
        let event = Event::for_rollout(
            EventId("E3".to_string()),
            RolloutId::new("RO1"),
            EventKind::RolloutTransition {
                from: RolloutStatus::CanaryActive,
                to: RolloutStatus::RolledBack,
                reason: "review-reject delta 0.06 > 0.05".to_string(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("rolled_back"));
        assert!(json.contains("canary_active"));
    }
}
