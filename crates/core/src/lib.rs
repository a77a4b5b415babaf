pub mod config;
pub mod domain;
pub mod errors;

pub use domain::agent::{AgentKey, Intent, UnknownAgentKey};
pub use domain::conversation::{ConversationId, PendingClarification};
pub use domain::message::{ChatMessage, Role};
pub use errors::InterfaceError;
