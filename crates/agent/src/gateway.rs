use async_trait::async_trait;
use copilot_core::{AgentKey, ChatMessage};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("unknown agent key `{0}`")]
    UnknownAgentKey(AgentKey),
    #[error("agent input is empty")]
    EmptyInput,
    #[error("agent gateway is misconfigured: {0}")]
    Configuration(String),
    #[error("agent transport failed: {0}")]
    Transport(String),
    #[error("agent service returned status {status}: {message}")]
    Service { status: u16, message: String },
    #[error("agent response could not be interpreted: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Faults of the remote service rather than of this process or its input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Service { .. })
    }
}

/// Capability to send an ordered message list to one logical agent and get its
/// free-text reply. Replies are untrusted text.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn call_agent(
        &self,
        agent: AgentKey,
        messages: &[ChatMessage],
        conversation_id: Option<&str>,
    ) -> Result<String, GatewayError>;
}

pub fn ensure_input(messages: &[ChatMessage]) -> Result<(), GatewayError> {
    if messages.iter().all(ChatMessage::is_blank) {
        return Err(GatewayError::EmptyInput);
    }
    Ok(())
}
