//! Per-suite run mutual exclusion.
//!
//! One keyed lock table guarded by a single short-lived mutex, not one
//! global lock across all suites, since unrelated suites must be able to run
//! concurrently. Release is RAII so the slot frees on every exit path,
//! including a panicking orchestrator.

use qc_core::types::SuiteId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum RunLockError {
    #[error("suite {suite_id} already has a running run")]
    AlreadyRunning { suite_id: SuiteId },
}

#[derive(Debug, Clone, Default)]
pub struct SuiteLockTable {
    held: Arc<Mutex<HashSet<String>>>,
}

impl SuiteLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the run slot for a suite.
    pub fn acquire(&self, suite_id: &SuiteId) -> Result<SuiteRunGuard, RunLockError> {
        let mut held = self.held.lock().expect("suite lock table poisoned");
        if !held.insert(suite_id.0.clone()) {
            return Err(RunLockError::AlreadyRunning {
                suite_id: suite_id.clone(),
            });
        }
        Ok(SuiteRunGuard {
            table: Arc::clone(&self.held),
            suite_id: suite_id.0.clone(),
        })
    }

    pub fn is_held(&self, suite_id: &SuiteId) -> bool {
        self.held
            .lock()
            .expect("suite lock table poisoned")
            .contains(&suite_id.0)
    }
}

/// Held run slot. Dropping it releases the suite.
#[derive(Debug)]
pub struct SuiteRunGuard {
    table: Arc<Mutex<HashSet<String>>>,
    suite_id: String,
}

impl Drop for SuiteRunGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.table.lock() {
            held.remove(&self.suite_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sid(s: &str) -> SuiteId {
        SuiteId::new(s)
    }

    #[test]
    fn acquire_then_conflict_then_release() {
        let table = SuiteLockTable::new();
        let guard = table.acquire(&sid("S1")).expect("first acquire");
        assert!(table.is_held(&sid("S1")));

        let err = table.acquire(&sid("S1")).unwrap_err();
        assert!(err.to_string().contains("S1"));

        drop(guard);
        assert!(!table.is_held(&sid("S1")));
        table.acquire(&sid("S1")).expect("reacquire after release");
    }

    #[test]
    fn different_suites_do_not_contend() {
        let table = SuiteLockTable::new();
        let _a = table.acquire(&sid("S1")).unwrap();
        let _b = table.acquire(&sid("S2")).unwrap();
        assert!(table.is_held(&sid("S1")));
        assert!(table.is_held(&sid("S2")));
    }

    #[test]
    fn guard_releases_on_panic() {
        let table = SuiteLockTable::new();
        let table_clone = table.clone();

        let result = thread::spawn(move || {
            let _guard = table_clone.acquire(&sid("S1")).unwrap();
            panic!("orchestrator blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!table.is_held(&sid("S1")));
    }

    #[test]
    fn concurrent_acquires_grant_exactly_one_winner() {
        let table = SuiteLockTable::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            handles.push(thread::spawn(move || {
                table.acquire(&SuiteId::new("S1")).map(|guard| {
                    // Hold briefly so contenders overlap.
                    thread::sleep(std::time::Duration::from_millis(20));
                    drop(guard);
                })
            }));
        }

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        // At least one thread wins; losers get AlreadyRunning. Sequential
        // winners are possible if a guard drops before a later acquire.
        assert!(granted >= 1);
    }
}
