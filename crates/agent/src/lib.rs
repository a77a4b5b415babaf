//! Agent orchestration for the copilot.
//!
//! A turn flows through a fixed pipeline:
//! 1. **Routing** - the routing agent's reply is classified into an [`Intent`].
//! 2. **Data fetch** - data-dependent intents ask the data-fetch agent for a
//!    query, which runs through the guarded `copilot-db` data access.
//! 3. **Business agent** - the intent's agent answers with the fetched context.
//! 4. **Clarification** - replies starting with `clarify:` park the
//!    conversation until the user answers.
//!
//! Agent replies are untrusted text. The only structured thing taken from them
//! is the fetch request, and its query is validated before it reaches the
//! database.
//!
//! [`Intent`]: copilot_core::Intent

pub mod conversation;
pub mod foundry;
pub mod gateway;
pub mod intent;
pub mod orchestrator;
pub mod reply;

pub use conversation::ConversationStore;
pub use foundry::FoundryGateway;
pub use gateway::{AgentGateway, GatewayError};
pub use orchestrator::{Orchestrator, ReplyKind, TurnError, TurnOutcome, TurnTrace};
pub use reply::{AgentReply, FetchRequest, MalformedFetchResponse};
