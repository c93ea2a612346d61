//! Case executor: runs one test case against the agent under a fidelity
//! mode and a hard per-case deadline.
//!
//! The agent call runs on a worker thread so the deadline can be enforced
//! with `recv_timeout`; a timed-out worker is left to finish in the
//! background. Timeouts and agent failures surface as `errored` outcomes,
//! never as propagated errors; one bad case must not abort a run.

use qc_core::config::DEFAULT_CASE_TIMEOUT_MS;
use qc_core::types::{AgentId, ExecutionMode, TestCase, ToolCall, TurnResult};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::client::AgentClient;
use crate::error::ExecError;
use crate::simulator::{DelayKind, LatencySimulator};
use crate::types::{CancelToken, CaseExecutionOutcome, ContextMessage, Speaker, TurnReply, TurnRequest};

pub struct CaseExecutor {
    client: Arc<dyn AgentClient>,
    pub default_timeout_ms: u64,
}

impl CaseExecutor {
    pub fn new(client: Arc<dyn AgentClient>) -> Self {
        Self {
            client,
            default_timeout_ms: DEFAULT_CASE_TIMEOUT_MS,
        }
    }

    pub fn with_timeout(client: Arc<dyn AgentClient>, default_timeout_ms: u64) -> Self {
        Self {
            client,
            default_timeout_ms,
        }
    }

    /// Execute one case. Simulated delays are charged against the same
    /// deadline as real wall-clock time, so a latency profile can push a
    /// case over budget exactly like a slow live agent would.
    pub fn execute(
        &self,
        case: &TestCase,
        agent_id: &AgentId,
        mode: ExecutionMode,
        timeout_ms: Option<u64>,
        simulator: &mut LatencySimulator,
        cancel: &CancelToken,
    ) -> CaseExecutionOutcome {
        let budget_ms = timeout_ms.unwrap_or(self.default_timeout_ms);
        if budget_ms == 0 {
            return CaseExecutionOutcome::errored("timeout");
        }

        if case.is_multi_turn() {
            self.execute_turns(case, agent_id, mode, budget_ms, simulator, cancel)
        } else {
            self.execute_single(case, agent_id, mode, budget_ms, simulator)
        }
    }

    fn execute_single(
        &self,
        case: &TestCase,
        agent_id: &AgentId,
        mode: ExecutionMode,
        budget_ms: u64,
        simulator: &mut LatencySimulator,
    ) -> CaseExecutionOutcome {
        let request = TurnRequest {
            agent_id: agent_id.clone(),
            mode,
            message: case.input.clone(),
            context: Vec::new(),
            turn_index: 0,
        };

        match self.run_turn(request, mode, budget_ms, simulator) {
            Ok((reply, latency_ms)) => CaseExecutionOutcome {
                content: reply.content,
                tool_calls: reply.tool_calls,
                turns: Vec::new(),
                latency_ms,
                input_tokens: reply.input_tokens,
                output_tokens: reply.output_tokens,
                cost_usd: reply.cost_usd,
                error: None,
            },
            Err(err) => CaseExecutionOutcome::errored(err.reason()),
        }
    }

    fn execute_turns(
        &self,
        case: &TestCase,
        agent_id: &AgentId,
        mode: ExecutionMode,
        budget_ms: u64,
        simulator: &mut LatencySimulator,
        cancel: &CancelToken,
    ) -> CaseExecutionOutcome {
        let mut outcome = CaseExecutionOutcome::default();
        let mut context: Vec<ContextMessage> = Vec::new();

        for (index, turn) in case.turns.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.error = Some("cancelled".to_string());
                return outcome;
            }

            let remaining_ms = budget_ms.saturating_sub(outcome.latency_ms);
            if remaining_ms == 0 {
                outcome.error = Some("timeout".to_string());
                return outcome;
            }

            let request = TurnRequest {
                agent_id: agent_id.clone(),
                mode,
                message: turn.message.clone(),
                context: context.clone(),
                turn_index: index,
            };

            match self.run_turn(request, mode, remaining_ms, simulator) {
                Ok((reply, latency_ms)) => {
                    context.push(ContextMessage {
                        speaker: Speaker::User,
                        content: turn.message.clone(),
                    });
                    context.push(ContextMessage {
                        speaker: Speaker::Agent,
                        content: reply.content.clone(),
                    });

                    outcome.turns.push(TurnResult {
                        index,
                        content: reply.content.clone(),
                        tool_calls: reply.tool_calls.clone(),
                        latency_ms,
                    });
                    outcome.content = reply.content;
                    outcome.tool_calls.extend(reply.tool_calls);
                    outcome.latency_ms += latency_ms;
                    outcome.input_tokens += reply.input_tokens;
                    outcome.output_tokens += reply.output_tokens;
                    outcome.cost_usd += reply.cost_usd;
                }
                Err(err) => {
                    outcome.error = Some(err.reason());
                    return outcome;
                }
            }
        }

        outcome
    }

    /// Run one turn under the remaining budget. Returns the reply and the
    /// charged latency (wall clock plus simulated delays).
    fn run_turn(
        &self,
        request: TurnRequest,
        mode: ExecutionMode,
        remaining_ms: u64,
        simulator: &mut LatencySimulator,
    ) -> Result<(TurnReply, u64), ExecError> {
        let start = Instant::now();
        let mut reply = self.call_with_deadline(request, Duration::from_millis(remaining_ms))?;
        let wall_ms = start.elapsed().as_millis() as u64;

        let mut simulated_ms = simulator.delay(DelayKind::Response, mode).as_millis() as u64;
        for call in &mut reply.tool_calls {
            simulated_ms += simulator.delay(DelayKind::Tool, mode).as_millis() as u64;
            if mode == ExecutionMode::DryRun && call.result.is_none() {
                call.result = Some(simulated_tool_result(call));
            }
        }

        let latency_ms = wall_ms + simulated_ms;
        if latency_ms > remaining_ms {
            return Err(ExecError::Timeout);
        }
        Ok((reply, latency_ms))
    }

    fn call_with_deadline(
        &self,
        request: TurnRequest,
        remaining: Duration,
    ) -> Result<TurnReply, ExecError> {
        let (tx, rx) = mpsc::channel();
        let client = Arc::clone(&self.client);
        thread::spawn(move || {
            let _ = tx.send(client.send(&request));
        });

        match rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout),
        }
    }
}

/// Placeholder payload substituted for real tool backends in dry_run mode.
fn simulated_tool_result(call: &ToolCall) -> String {
    format!("{{\"simulated\":true,\"tool\":\"{}\"}}", call.name)
}
