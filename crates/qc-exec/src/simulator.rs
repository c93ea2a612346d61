//! Latency/fidelity simulator: synthetic delays for non-live execution.

use qc_core::types::{ExecutionMode, LatencyProfile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// What kind of delay is being sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    /// A tool-backend round trip.
    Tool,
    /// A response turn from the agent.
    Response,
}

/// Samples synthetic delays from a latency profile.
///
/// Live mode always yields zero (real latency is whatever the live call
/// takes). Without a profile every draw is zero, the fastest and least realistic
/// execution, useful for smoke tests. Seedable for deterministic tests.
#[derive(Debug)]
pub struct LatencySimulator {
    profile: Option<LatencyProfile>,
    rng: StdRng,
}

impl LatencySimulator {
    pub fn new(profile: Option<LatencyProfile>) -> Self {
        Self {
            profile,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(profile: Option<LatencyProfile>, seed: u64) -> Self {
        Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sample one delay. Uniform in `[min, max]` plus symmetric jitter in
    /// `[-jitter, +jitter]`, clamped to zero.
    pub fn delay(&mut self, kind: DelayKind, mode: ExecutionMode) -> Duration {
        if mode == ExecutionMode::Live {
            return Duration::ZERO;
        }
        let Some(profile) = self.profile else {
            return Duration::ZERO;
        };

        let (min, max) = match kind {
            DelayKind::Tool => (profile.tool_min_ms, profile.tool_max_ms),
            DelayKind::Response => (profile.response_min_ms, profile.response_max_ms),
        };
        let (min, max) = if min <= max { (min, max) } else { (max, min) };

        let base = self.rng.gen_range(min..=max) as i64;
        let jitter = if profile.jitter_ms == 0 {
            0
        } else {
            let j = profile.jitter_ms as i64;
            self.rng.gen_range(-j..=j)
        };

        Duration::from_millis((base + jitter).max(0) as u64)
    }
}
