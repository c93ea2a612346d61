//! Request/reply types for the agent and judge seams.

use qc_core::types::{AgentId, ExecutionMode, ToolCall, TurnResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A prior exchange carried into later turns of a multi-turn case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub speaker: Speaker,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// One message sent to the agent under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub agent_id: AgentId,
    pub mode: ExecutionMode,
    pub message: String,
    /// Evolving conversation context, empty on the first turn.
    #[serde(default)]
    pub context: Vec<ContextMessage>,
    pub turn_index: usize,
}

/// The agent's reply to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TurnReply {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

/// Raw outcome of executing one case. `error` set means the case errored
/// (infrastructure failure) and the remaining fields hold whatever was
/// captured before the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaseExecutionOutcome {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub turns: Vec<TurnResult>,
    pub latency_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub error: Option<String>,
}

impl CaseExecutionOutcome {
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    pub fn errored(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// What the judge is asked to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub case_name: String,
    pub case_description: String,
    /// Full transcript the judge should read.
    pub transcript: String,
    pub tool_names: Vec<String>,
    /// When true the judge is also asked for a flow-coherence score.
    pub multi_turn: bool,
}

/// Cooperative stop flag checked between turns. There is no supported
/// mid-run stop operation; this is the extension point for one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
