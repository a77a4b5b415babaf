use std::sync::Arc;

use copilot_core::{
    AgentKey, ChatMessage, ConversationId, Intent, InterfaceError, PendingClarification,
};
use copilot_db::{DataAccess, DataAccessError, Row};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::ConversationStore;
use crate::gateway::{AgentGateway, GatewayError};
use crate::intent;
use crate::reply::{parse_agent_reply, parse_fetch_request, AgentReply, MalformedFetchResponse};

pub const ROWS_PREVIEW_LIMIT: usize = 50;
const ROWS_PREVIEW_NOTE: &str = "Only first 50 rows provided.";

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    MalformedFetchResponse(#[from] MalformedFetchResponse),
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error("data context could not be serialized: {0}")]
    Context(#[from] serde_json::Error),
}

impl TurnError {
    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        let message = self.to_string();
        let interface = match self {
            Self::EmptyMessage
            | Self::MalformedFetchResponse(_)
            | Self::DataAccess(DataAccessError::Rejected(_)) => {
                InterfaceError::bad_request(message)
            }
            Self::DataAccess(DataAccessError::Connection(_)) => {
                InterfaceError::service_unavailable(message)
            }
            Self::Gateway(error) if error.is_unavailable() => {
                InterfaceError::service_unavailable(message)
            }
            Self::Gateway(_)
            | Self::DataAccess(DataAccessError::Execution(_))
            | Self::Context(_) => InterfaceError::internal(message),
        };
        interface.with_correlation_id(correlation_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Final,
    Clarification,
}

/// Diagnostics for one turn. Logged, never returned to the end user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnTrace {
    pub resumed_clarification: bool,
    pub routing_raw: Option<String>,
    pub intent: Option<Intent>,
    pub fetch_sql: Option<String>,
    pub fetch_reason: Option<String>,
    pub rows_count: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: ConversationId,
    pub agent: AgentKey,
    pub reply: String,
    pub kind: ReplyKind,
    pub trace: TurnTrace,
}

impl TurnOutcome {
    pub fn is_clarification(&self) -> bool {
        self.kind == ReplyKind::Clarification
    }
}

#[derive(Debug, Serialize)]
struct DataContext<'a> {
    rows_preview: &'a [Row],
    rows_count: usize,
    fetch_reason: Option<&'a str>,
    note: &'static str,
}

impl<'a> DataContext<'a> {
    fn new(rows: &'a [Row], fetch_reason: Option<&'a str>) -> Self {
        Self {
            rows_preview: &rows[..rows.len().min(ROWS_PREVIEW_LIMIT)],
            rows_count: rows.len(),
            fetch_reason,
            note: ROWS_PREVIEW_NOTE,
        }
    }
}

/// Drives one chat turn: routing, optional guarded data fetch, the business
/// agent call, and the per-conversation clarification loop.
pub struct Orchestrator {
    gateway: Arc<dyn AgentGateway>,
    data: Arc<dyn DataAccess>,
    store: ConversationStore,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn AgentGateway>, data: Arc<dyn DataAccess>) -> Self {
        Self { gateway, data, store: ConversationStore::new() }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub async fn handle(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        correlation_id: &str,
    ) -> Result<TurnOutcome, TurnError> {
        if message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let conversation_id = ConversationId::resolve(conversation_id);
        info!(
            event_name = "copilot.turn.started",
            correlation_id,
            conversation_id = conversation_id.as_str(),
            "copilot turn started"
        );

        let result = match self.store.get(&conversation_id).await {
            Some(pending) => {
                self.continue_clarification(&conversation_id, pending, message, correlation_id)
                    .await
            }
            None => self.start_turn(&conversation_id, message, correlation_id).await,
        };

        match &result {
            Ok(outcome) => info!(
                event_name = "copilot.turn.completed",
                correlation_id,
                conversation_id = conversation_id.as_str(),
                agent = outcome.agent.as_str(),
                clarification = outcome.is_clarification(),
                resumed_clarification = outcome.trace.resumed_clarification,
                rows_count = outcome.trace.rows_count.unwrap_or_default(),
                "copilot turn completed"
            ),
            Err(error) => warn!(
                event_name = "copilot.turn.failed",
                correlation_id,
                conversation_id = conversation_id.as_str(),
                error = %error,
                "copilot turn failed"
            ),
        }

        result
    }

    async fn continue_clarification(
        &self,
        conversation_id: &ConversationId,
        pending: PendingClarification,
        answer: &str,
        correlation_id: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let prompt = stitch_clarification(&pending, answer);
        let raw = self
            .gateway
            .call_agent(pending.agent, &[ChatMessage::user(prompt)], Some(conversation_id.as_str()))
            .await?;

        let trace = TurnTrace { resumed_clarification: true, ..TurnTrace::default() };
        let outcome = self
            .settle(conversation_id, pending.agent, pending.original_request, &raw, trace)
            .await;
        info!(
            event_name = "copilot.turn.clarification_answered",
            correlation_id,
            conversation_id = conversation_id.as_str(),
            agent = outcome.agent.as_str(),
            "clarification answer delivered to agent"
        );
        Ok(outcome)
    }

    async fn start_turn(
        &self,
        conversation_id: &ConversationId,
        message: &str,
        correlation_id: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let conversation = Some(conversation_id.as_str());

        let routing_raw = self
            .gateway
            .call_agent(AgentKey::Routing, &[ChatMessage::user(message)], conversation)
            .await?;
        let intent = intent::classify(&routing_raw);
        info!(
            event_name = "copilot.turn.routed",
            correlation_id,
            conversation_id = conversation_id.as_str(),
            intent = intent.as_str(),
            "routing agent classified turn"
        );

        let mut trace = TurnTrace {
            routing_raw: Some(routing_raw),
            intent: Some(intent),
            ..TurnTrace::default()
        };

        let context = if intent.requires_data() {
            let fetch_raw = self
                .gateway
                .call_agent(
                    AgentKey::DataFetch,
                    &[
                        ChatMessage::user(message),
                        ChatMessage::system(format!("INTENT: {}", intent.as_str())),
                    ],
                    conversation,
                )
                .await?;
            let request = parse_fetch_request(&fetch_raw)?;
            let rows = self.data.query(&request.sql, &request.params, None).await?;

            info!(
                event_name = "copilot.turn.data_fetched",
                correlation_id,
                conversation_id = conversation_id.as_str(),
                rows_count = rows.len(),
                "data fetch completed"
            );

            let context =
                serde_json::to_string(&DataContext::new(&rows, request.reason.as_deref()))?;
            trace.rows_count = Some(rows.len());
            trace.fetch_sql = Some(request.sql);
            trace.fetch_reason = request.reason;
            context
        } else {
            "{}".to_string()
        };

        let agent = intent.agent_key();
        let raw = self
            .gateway
            .call_agent(
                agent,
                &[ChatMessage::user(message), ChatMessage::system(context)],
                conversation,
            )
            .await?;

        Ok(self.settle(conversation_id, agent, message.to_string(), &raw, trace).await)
    }

    async fn settle(
        &self,
        conversation_id: &ConversationId,
        agent: AgentKey,
        original_request: String,
        raw: &str,
        trace: TurnTrace,
    ) -> TurnOutcome {
        let (reply, kind) = match parse_agent_reply(raw) {
            AgentReply::Clarification(question) => {
                self.store
                    .set(
                        conversation_id,
                        PendingClarification {
                            agent,
                            original_request,
                            last_question: question.clone(),
                        },
                    )
                    .await;
                info!(
                    event_name = "copilot.turn.clarification_requested",
                    conversation_id = conversation_id.as_str(),
                    agent = agent.as_str(),
                    "agent requested clarification"
                );
                (question, ReplyKind::Clarification)
            }
            AgentReply::Final(text) => {
                self.store.clear(conversation_id).await;
                (text, ReplyKind::Final)
            }
        };

        TurnOutcome { conversation_id: conversation_id.clone(), agent, reply, kind, trace }
    }
}

fn stitch_clarification(pending: &PendingClarification, answer: &str) -> String {
    format!(
        "Original request: {}\nClarifying question: {}\nUser answer: {}",
        pending.original_request,
        pending.last_question,
        answer.trim()
    )
}
