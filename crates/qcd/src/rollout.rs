//! Canary rollout governance.
//!
//! A rollout sits in `canary_active` until the policy (or an operator)
//! moves it to exactly one terminal state. The policy itself is pure; it
//! reads an externally supplied metrics snapshot and never mutates the
//! rollout unless `apply` is set.

use chrono::{DateTime, Utc};
use qc_core::config::RolloutPolicyConfig;
use qc_core::state::RolloutStatus;
use qc_core::types::{RolloutId, SoulRollout};

#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("rollout {rollout_id} is {status:?}, not canary_active")]
    InvalidState {
        rollout_id: RolloutId,
        status: RolloutStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutAction {
    Hold,
    Promote,
    Rollback,
    Cancel,
}

impl RolloutAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloutAction::Hold => "hold",
            RolloutAction::Promote => "promote",
            RolloutAction::Rollback => "rollback",
            RolloutAction::Cancel => "cancel",
        }
    }
}

/// Outcome of one policy evaluation. Advisory unless applied.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decision {
    pub action: RolloutAction,
    pub reason: String,
}

/// One slot of an `evaluate_all` sweep. Failures are isolated per rollout.
#[derive(Debug)]
pub struct RolloutEvaluation {
    pub rollout_id: RolloutId,
    pub outcome: Result<Decision, RolloutError>,
}

#[derive(Debug, Clone)]
pub struct RolloutEngine {
    policy: RolloutPolicyConfig,
}

impl RolloutEngine {
    pub fn new(policy: RolloutPolicyConfig) -> Self {
        Self { policy }
    }

    /// Decides promote/rollback/hold for an active rollout.
    ///
    /// When `apply` is set and the decision is promote or rollback, the
    /// transition is performed in place. A `hold` never transitions.
    pub fn evaluate(
        &self,
        rollout: &mut SoulRollout,
        apply: bool,
        at: DateTime<Utc>,
    ) -> Result<Decision, RolloutError> {
        require_active(rollout)?;

        let decision = self.decide(rollout);
        eprintln!(
            "[rollout] {} -> {} ({})",
            rollout.id, decision.action.as_str(), decision.reason
        );

        if apply {
            match decision.action {
                RolloutAction::Promote => {
                    transition(rollout, RolloutStatus::Promoted, &decision.reason, at)?;
                }
                RolloutAction::Rollback => {
                    transition(rollout, RolloutStatus::RolledBack, &decision.reason, at)?;
                }
                RolloutAction::Hold | RolloutAction::Cancel => {}
            }
        }

        Ok(decision)
    }

    /// Pure decision against the configured thresholds. Strict `>`, so a
    /// delta sitting exactly on a threshold is not a violation.
    fn decide(&self, rollout: &SoulRollout) -> Decision {
        let metrics = &rollout.metrics;
        if metrics.sample_size < rollout.minimum_sample_size {
            return Decision {
                action: RolloutAction::Hold,
                reason: format!(
                    "insufficient sample: {}/{}",
                    metrics.sample_size, rollout.minimum_sample_size
                ),
            };
        }

        let mut violations = Vec::new();
        if metrics.review_reject_rate.delta > self.policy.review_reject_delta_warn {
            violations.push(format!(
                "review-reject delta {} > {}",
                metrics.review_reject_rate.delta, self.policy.review_reject_delta_warn
            ));
        }
        if metrics.qa_failure_rate.delta > self.policy.qa_failure_delta_warn {
            violations.push(format!(
                "qa-failure delta {} > {}",
                metrics.qa_failure_rate.delta, self.policy.qa_failure_delta_warn
            ));
        }
        if metrics.high_severity_incidents > 0 {
            violations.push(format!(
                "{} high-severity incidents",
                metrics.high_severity_incidents
            ));
        }

        if violations.is_empty() {
            Decision {
                action: RolloutAction::Promote,
                reason: "all thresholds satisfied with sufficient sample".to_string(),
            }
        } else {
            Decision {
                action: RolloutAction::Rollback,
                reason: violations.join("; "),
            }
        }
    }

    /// Manual promote, bypassing the policy.
    pub fn promote(
        &self,
        rollout: &mut SoulRollout,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RolloutError> {
        transition(rollout, RolloutStatus::Promoted, reason, at)
    }

    /// Manual rollback, bypassing the policy.
    pub fn rollback(
        &self,
        rollout: &mut SoulRollout,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RolloutError> {
        transition(rollout, RolloutStatus::RolledBack, reason, at)
    }

    /// Unconditional operator cancel. Available on any active rollout
    /// regardless of metrics.
    pub fn cancel(
        &self,
        rollout: &mut SoulRollout,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RolloutError> {
        transition(rollout, RolloutStatus::Cancelled, reason, at)
    }

    /// Evaluates every rollout in the slice. One rollout's failure lands in
    /// its own slot and never blocks the rest of the sweep.
    pub fn evaluate_all(
        &self,
        rollouts: &mut [SoulRollout],
        apply: bool,
        at: DateTime<Utc>,
    ) -> Vec<RolloutEvaluation> {
        rollouts
            .iter_mut()
            .map(|rollout| RolloutEvaluation {
                rollout_id: rollout.id.clone(),
                outcome: self.evaluate(rollout, apply, at),
            })
            .collect()
    }
}

fn require_active(rollout: &SoulRollout) -> Result<(), RolloutError> {
    if rollout.is_active() {
        Ok(())
    } else {
        Err(RolloutError::InvalidState {
            rollout_id: rollout.id.clone(),
            status: rollout.status,
        })
    }
}

/// Single exit from `canary_active`. Sets `decision_reason` and `ended_at`
/// exactly once.
fn transition(
    rollout: &mut SoulRollout,
    to: RolloutStatus,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<(), RolloutError> {
    require_active(rollout)?;
    rollout.status = to;
    rollout.decision_reason = Some(reason.to_string());
    rollout.ended_at = Some(at);
    eprintln!("[rollout] {} transitioned to {}", rollout.id, to.as_str());
    Ok(())
}
