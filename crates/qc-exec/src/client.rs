//! Seams for the agent under test and the LLM judge.
//!
//! The real endpoints are external collaborators; everything in the engine
//! talks to them through these traits. `ScriptedAgent` and `ScriptedJudge`
//! are in-memory implementations used by tests and offline harnesses.

use qc_core::types::JudgeScore;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ExecError;
use crate::types::{JudgeRequest, TurnReply, TurnRequest};

/// Invocation endpoint for the agent under test.
pub trait AgentClient: Send + Sync {
    fn send(&self, request: &TurnRequest) -> Result<TurnReply, ExecError>;
}

/// Invocation endpoint for the LLM judge.
pub trait JudgeClient: Send + Sync {
    fn score(&self, request: &JudgeRequest) -> Result<JudgeScore, ExecError>;
}

/// Replies with the request message verbatim and no tool calls. Useful as a
/// smoke-test agent when no real endpoint is wired up.
#[derive(Debug, Clone, Default)]
pub struct EchoAgent;

impl AgentClient for EchoAgent {
    fn send(&self, request: &TurnRequest) -> Result<TurnReply, ExecError> {
        Ok(TurnReply {
            content: request.message.clone(),
            tool_calls: Vec::new(),
            input_tokens: request.message.len() as u64 / 4,
            output_tokens: request.message.len() as u64 / 4,
            cost_usd: 0.0,
        })
    }
}

/// Maps input messages to canned replies. Unknown messages get the default
/// reply; with no default they fail as unreachable.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    replies: HashMap<String, TurnReply>,
    default_reply: Option<TurnReply>,
    /// Messages received, in order. For asserting context threading.
    received: Mutex<Vec<TurnRequest>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, message: impl Into<String>, reply: TurnReply) -> Self {
        self.replies.insert(message.into(), reply);
        self
    }

    pub fn with_default_reply(mut self, reply: TurnReply) -> Self {
        self.default_reply = Some(reply);
        self
    }

    pub fn received(&self) -> Vec<TurnRequest> {
        self.received.lock().expect("received lock").clone()
    }
}

impl AgentClient for ScriptedAgent {
    fn send(&self, request: &TurnRequest) -> Result<TurnReply, ExecError> {
        self.received
            .lock()
            .expect("received lock")
            .push(request.clone());

        if let Some(reply) = self.replies.get(&request.message) {
            return Ok(reply.clone());
        }
        match &self.default_reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(ExecError::AgentUnreachable {
                agent_id: request.agent_id.clone(),
                message: format!("no scripted reply for message '{}'", request.message),
            }),
        }
    }
}

/// Always fails. For exercising the errored path.
#[derive(Debug, Clone)]
pub struct UnreachableAgent {
    pub message: String,
}

impl AgentClient for UnreachableAgent {
    fn send(&self, request: &TurnRequest) -> Result<TurnReply, ExecError> {
        Err(ExecError::AgentUnreachable {
            agent_id: request.agent_id.clone(),
            message: self.message.clone(),
        })
    }
}

/// Returns a fixed score for every request.
#[derive(Debug, Clone)]
pub struct ScriptedJudge {
    pub score: JudgeScore,
}

impl JudgeClient for ScriptedJudge {
    fn score(&self, request: &JudgeRequest) -> Result<JudgeScore, ExecError> {
        let mut score = self.score.clone();
        if !request.multi_turn {
            score.flow_coherence = None;
            score.flow_reasoning = None;
        }
        Ok(score)
    }
}

/// Always fails. For exercising judge-unavailable degradation.
#[derive(Debug, Clone, Default)]
pub struct UnavailableJudge;

impl JudgeClient for UnavailableJudge {
    fn score(&self, _request: &JudgeRequest) -> Result<JudgeScore, ExecError> {
        Err(ExecError::JudgeUnavailable {
            message: "judge endpoint not configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_core::types::{AgentId, ExecutionMode};

    fn mk_request(message: &str) -> TurnRequest {
        TurnRequest {
            agent_id: AgentId("joi".to_string()),
            mode: ExecutionMode::DryRun,
            message: message.to_string(),
            context: Vec::new(),
            turn_index: 0,
        }
    }

    #[test]
    fn echo_agent_returns_the_message() {
        let reply = EchoAgent.send(&mk_request("hello there")).unwrap();
        assert_eq!(reply.content, "hello there");
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn scripted_agent_matches_message() {
        let agent = ScriptedAgent::new().with_reply(
            "ping",
            TurnReply {
                content: "pong".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(agent.send(&mk_request("ping")).unwrap().content, "pong");
    }

    #[test]
    fn scripted_agent_without_default_fails_unknown_messages() {
        let agent = ScriptedAgent::new();
        let err = agent.send(&mk_request("unknown")).unwrap_err();
        assert!(err.to_string().contains("no scripted reply"));
    }

    #[test]
    fn scripted_agent_records_requests_in_order() {
        let agent = ScriptedAgent::new().with_default_reply(TurnReply::default());
        agent.send(&mk_request("one")).unwrap();
        agent.send(&mk_request("two")).unwrap();

        let received = agent.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].message, "one");
        assert_eq!(received[1].message, "two");
    }

    #[test]
    fn scripted_judge_strips_flow_score_for_single_turn() {
        let judge = ScriptedJudge {
            score: JudgeScore {
                correctness: 0.9,
                tool_accuracy: 0.9,
                response_quality: 0.9,
                reasoning: "good".to_string(),
                flow_coherence: Some(0.8),
                flow_reasoning: Some("consistent".to_string()),
            },
        };
        let request = JudgeRequest {
            case_name: "c".to_string(),
            case_description: String::new(),
            transcript: "hi".to_string(),
            tool_names: vec![],
            multi_turn: false,
        };
        let score = judge.score(&request).unwrap();
        assert!(score.flow_coherence.is_none());
    }
}
