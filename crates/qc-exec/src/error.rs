use qc_core::types::AgentId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    #[error("timeout")]
    Timeout,
    #[error("agent {agent_id} unreachable: {message}")]
    AgentUnreachable { agent_id: AgentId, message: String },
    #[error("malformed agent response: {message}")]
    MalformedResponse { message: String },
    #[error("judge call failed: {message}")]
    JudgeUnavailable { message: String },
    #[error("invalid execution request: {message}")]
    InvalidRequest { message: String },
}

impl ExecError {
    /// Display-ready reason for the `errored` result status.
    pub fn reason(&self) -> String {
        match self {
            ExecError::Timeout => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}
