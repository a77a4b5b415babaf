use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Uses the caller-supplied id when it carries content, otherwise starts a
    /// fresh conversation.
    pub fn resolve(supplied: Option<&str>) -> Self {
        match supplied.map(str::trim) {
            Some(value) if !value.is_empty() => Self(value.to_string()),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outstanding clarification loop for one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingClarification {
    pub agent: AgentKey,
    pub original_request: String,
    pub last_question: String,
}

#[cfg(test)]
mod tests {
    use super::ConversationId;

    #[test]
    fn resolve_keeps_supplied_id_and_generates_for_blank() {
        assert_eq!(ConversationId::resolve(Some("conv-7")).as_str(), "conv-7");

        let generated = ConversationId::resolve(Some("   "));
        assert!(!generated.as_str().trim().is_empty());
        assert_ne!(generated, ConversationId::resolve(None));
    }
}
