use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical agent identifiers. Provider-side agent names are resolved from
/// configuration, never from these keys directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKey {
    Routing,
    DataFetch,
    Promotion,
    Procurement,
    Document,
    General,
}

impl AgentKey {
    pub const ALL: [AgentKey; 6] = [
        Self::Routing,
        Self::DataFetch,
        Self::Promotion,
        Self::Procurement,
        Self::Document,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::DataFetch => "data_fetch",
            Self::Promotion => "promotion",
            Self::Procurement => "procurement",
            Self::Document => "document",
            Self::General => "general",
        }
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown agent key `{0}`")]
pub struct UnknownAgentKey(pub String);

impl std::str::FromStr for AgentKey {
    type Err = UnknownAgentKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| UnknownAgentKey(value.to_string()))
    }
}

/// Classified purpose of a user turn. Recomputed on every turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Promotion,
    Procurement,
    Document,
    General,
}

impl Intent {
    pub const VOCABULARY: [Intent; 4] =
        [Self::Promotion, Self::Procurement, Self::Document, Self::General];

    pub fn as_str(&self) -> &'static str {
        self.agent_key().as_str()
    }

    /// Business agent that answers turns of this intent.
    pub fn agent_key(&self) -> AgentKey {
        match self {
            Self::Promotion => AgentKey::Promotion,
            Self::Procurement => AgentKey::Procurement,
            Self::Document => AgentKey::Document,
            Self::General => AgentKey::General,
        }
    }

    pub fn requires_data(&self) -> bool {
        matches!(self, Self::Promotion | Self::Procurement)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
