//! Facade over the orchestrator, store, and rollout engine. The CLI (and
//! any other frontend) talks to this instead of the components directly.

use chrono::Utc;
use qc_core::config::QualityConfig;
use qc_core::events::{Event, EventKind};
use qc_core::state::RolloutStatus;
use qc_core::types::{RolloutId, RunConfig, RunId, SoulRollout, SuiteId, TestResult, TestRun};
use std::sync::{mpsc, Arc, Mutex};

use crate::event_bus::EventBus;
use crate::event_log::JsonlEventLog;
use crate::orchestrator::{OrchestratorError, RunOrchestrator};
use crate::persistence::{PersistenceError, SqliteStore};
use crate::rollout::{Decision, RolloutEngine, RolloutError, RolloutEvaluation};
use crate::run_lock::RunLockError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("suite {suite_id} already has a running run")]
    Conflict { suite_id: SuiteId },
    #[error(transparent)]
    InvalidState(#[from] RolloutError),
    #[error("run {0} not found")]
    RunNotFound(RunId),
    #[error("rollout {0} not found")]
    RolloutNotFound(RolloutId),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<OrchestratorError> for ServiceError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Conflict(RunLockError::AlreadyRunning { suite_id }) => {
                ServiceError::Conflict { suite_id }
            }
            OrchestratorError::Persistence(err) => ServiceError::Persistence(err),
        }
    }
}

pub struct QualityService {
    orchestrator: RunOrchestrator,
    store: Arc<Mutex<SqliteStore>>,
    engine: RolloutEngine,
    bus: EventBus,
    event_log: JsonlEventLog,
}

impl QualityService {
    pub fn new(
        orchestrator: RunOrchestrator,
        store: Arc<Mutex<SqliteStore>>,
        bus: EventBus,
        event_log: JsonlEventLog,
        config: &QualityConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            engine: RolloutEngine::new(config.rollout.clone()),
            bus,
            event_log,
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        self.bus.subscribe()
    }

    // ── runs ──────────────────────────────────────────────────────────────

    /// Execute a full suite run and return its summary.
    pub fn start_run(
        &self,
        suite_id: &SuiteId,
        config: RunConfig,
    ) -> Result<TestRun, ServiceError> {
        let (run, _) = self.orchestrator.run(suite_id, config)?;
        Ok(run)
    }

    pub fn run_with_results(
        &self,
        run_id: &RunId,
    ) -> Result<(TestRun, Vec<TestResult>), ServiceError> {
        let store = self.store.lock().expect("store poisoned");
        let run = store
            .load_run(run_id)?
            .ok_or_else(|| ServiceError::RunNotFound(run_id.clone()))?;
        let results = store.list_results_for_run(run_id)?;
        Ok((run, results))
    }

    // ── rollouts ──────────────────────────────────────────────────────────

    /// Store or update a rollout, including its metrics snapshot. Metrics
    /// are externally supplied; the engine only reads them.
    pub fn upsert_rollout(&self, rollout: &SoulRollout) -> Result<(), ServiceError> {
        self.store
            .lock()
            .expect("store poisoned")
            .upsert_rollout(rollout)?;
        Ok(())
    }

    pub fn evaluate_rollout(
        &self,
        rollout_id: &RolloutId,
        apply: bool,
    ) -> Result<Decision, ServiceError> {
        let mut rollout = self.load_rollout(rollout_id)?;
        let decision = self.engine.evaluate(&mut rollout, apply, Utc::now())?;
        self.emit(Event::for_rollout(
            self.bus.next_event_id(),
            rollout.id.clone(),
            EventKind::RolloutEvaluated {
                action: decision.action.as_str().to_string(),
                reason: decision.reason.clone(),
            },
        ));
        if !rollout.is_active() {
            self.record_transition(&rollout)?;
        }
        Ok(decision)
    }

    pub fn promote_rollout(
        &self,
        rollout_id: &RolloutId,
        reason: &str,
    ) -> Result<SoulRollout, ServiceError> {
        let mut rollout = self.load_rollout(rollout_id)?;
        self.engine.promote(&mut rollout, reason, Utc::now())?;
        self.record_transition(&rollout)?;
        Ok(rollout)
    }

    pub fn rollback_rollout(
        &self,
        rollout_id: &RolloutId,
        reason: &str,
    ) -> Result<SoulRollout, ServiceError> {
        let mut rollout = self.load_rollout(rollout_id)?;
        self.engine.rollback(&mut rollout, reason, Utc::now())?;
        self.record_transition(&rollout)?;
        Ok(rollout)
    }

    pub fn cancel_rollout(
        &self,
        rollout_id: &RolloutId,
        reason: &str,
    ) -> Result<SoulRollout, ServiceError> {
        let mut rollout = self.load_rollout(rollout_id)?;
        self.engine.cancel(&mut rollout, reason, Utc::now())?;
        self.record_transition(&rollout)?;
        Ok(rollout)
    }

    /// Evaluate every active rollout. A failure evaluating one rollout
    /// lands in its own slot, the sweep continues.
    pub fn evaluate_all_rollouts(
        &self,
        apply: bool,
    ) -> Result<Vec<RolloutEvaluation>, ServiceError> {
        let mut rollouts = self
            .store
            .lock()
            .expect("store poisoned")
            .list_rollouts_by_status(RolloutStatus::CanaryActive)?;
        let sweep = self.engine.evaluate_all(&mut rollouts, apply, Utc::now());

        for (rollout, evaluation) in rollouts.iter().zip(&sweep) {
            if let Ok(decision) = &evaluation.outcome {
                self.emit(Event::for_rollout(
                    self.bus.next_event_id(),
                    rollout.id.clone(),
                    EventKind::RolloutEvaluated {
                        action: decision.action.as_str().to_string(),
                        reason: decision.reason.clone(),
                    },
                ));
            }
            if !rollout.is_active() {
                self.record_transition(rollout)?;
            }
        }
        Ok(sweep)
    }

    fn load_rollout(&self, rollout_id: &RolloutId) -> Result<SoulRollout, ServiceError> {
        self.store
            .lock()
            .expect("store poisoned")
            .load_rollout(rollout_id)?
            .ok_or_else(|| ServiceError::RolloutNotFound(rollout_id.clone()))
    }

    /// Persist a transitioned rollout and publish the transition event.
    fn record_transition(&self, rollout: &SoulRollout) -> Result<(), ServiceError> {
        self.store
            .lock()
            .expect("store poisoned")
            .upsert_rollout(rollout)?;
        self.emit(Event::for_rollout(
            self.bus.next_event_id(),
            rollout.id.clone(),
            EventKind::RolloutTransition {
                from: RolloutStatus::CanaryActive,
                to: rollout.status,
                reason: rollout.decision_reason.clone().unwrap_or_default(),
            },
        ));
        Ok(())
    }

    fn emit(&self, event: Event) {
        if let Err(err) = self.event_log.append(&event) {
            eprintln!("[events] journal append failed: {err}");
        }
        self.bus.publish(&event);
    }
}
