pub mod event_bus;
pub mod event_log;
pub mod issue_gen;
pub mod orchestrator;
pub mod persistence;
pub mod rollout;
pub mod rules;
pub mod run_lock;
pub mod service;

pub use event_bus::EventBus;
pub use event_log::{EventLogError, JsonlEventLog, LogStream};
pub use issue_gen::{IssueGenerator, LogTracker, TaskTracker, TrackerError};
pub use orchestrator::{InMemorySuites, OrchestratorError, RunOrchestrator, SuiteSource};
pub use persistence::{PersistenceError, SqliteStore};
pub use rollout::{Decision, RolloutAction, RolloutEngine, RolloutError, RolloutEvaluation};
pub use run_lock::{RunLockError, SuiteLockTable, SuiteRunGuard};
pub use service::{QualityService, ServiceError};
