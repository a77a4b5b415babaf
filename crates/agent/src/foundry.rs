//! HTTP gateway to provider-hosted agents exposed through a Responses-style API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use copilot_core::config::AgentsConfig;
use copilot_core::{AgentKey, ChatMessage};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::gateway::{ensure_input, AgentGateway, GatewayError};

const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct FoundryGateway {
    client: Client,
    responses_url: String,
    api_key: Option<SecretString>,
    agents: BTreeMap<AgentKey, String>,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    input: &'a [ChatMessage],
    agent: AgentReference<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<RequestMetadata<'a>>,
}

#[derive(Debug, Serialize)]
struct AgentReference<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestMetadata<'a> {
    conversation_id: &'a str,
}

impl FoundryGateway {
    pub fn from_config(config: &AgentsConfig) -> Result<Self, GatewayError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| GatewayError::Configuration("agents.endpoint is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            responses_url: responses_url(endpoint, config.api_version.as_deref()),
            api_key: config.api_key.clone(),
            agents: config.agent_map.clone(),
        })
    }

    pub fn responses_url(&self) -> &str {
        &self.responses_url
    }

    pub fn agent_name(&self, agent: AgentKey) -> Option<&str> {
        self.agents.get(&agent).map(String::as_str)
    }
}

#[async_trait]
impl AgentGateway for FoundryGateway {
    async fn call_agent(
        &self,
        agent: AgentKey,
        messages: &[ChatMessage],
        conversation_id: Option<&str>,
    ) -> Result<String, GatewayError> {
        ensure_input(messages)?;
        let name = self.agent_name(agent).ok_or(GatewayError::UnknownAgentKey(agent))?;

        let body = ResponsesRequest {
            input: messages,
            agent: AgentReference { kind: "agent_reference", name },
            metadata: conversation_id.map(|conversation_id| RequestMetadata { conversation_id }),
        };

        let mut request = self.client.post(&self.responses_url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| GatewayError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Service {
                status: status.as_u16(),
                message: truncate(detail.trim(), MAX_ERROR_BODY_CHARS),
            });
        }

        let payload: Value = response.json().await.map_err(|error| {
            GatewayError::InvalidResponse(format!("response body is not JSON: {error}"))
        })?;
        let text = extract_text(&payload).ok_or_else(|| {
            GatewayError::InvalidResponse("response carries no output text".to_string())
        })?;

        debug!(
            event_name = "agent.gateway.responded",
            agent = agent.as_str(),
            agent_name = name,
            reply_chars = text.chars().count(),
            "agent replied"
        );
        Ok(text)
    }
}

pub fn responses_url(endpoint: &str, api_version: Option<&str>) -> String {
    let base = endpoint.trim().trim_end_matches('/');
    match api_version.map(str::trim).filter(|version| !version.is_empty()) {
        Some(version) => format!("{base}/openai/responses?api-version={version}"),
        None => format!("{base}/openai/responses"),
    }
}

/// Reads `output_text` when present, otherwise joins every
/// `output[].content[].text` part in order.
pub fn extract_text(payload: &Value) -> Option<String> {
    if let Some(text) = payload.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    let parts: Vec<&str> = payload
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    (!parts.is_empty()).then(|| parts.concat())
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
