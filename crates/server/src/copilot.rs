use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use copilot_agent::Orchestrator;
use copilot_core::InterfaceError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct CopilotState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CopilotRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopilotResponse {
    pub reply: String,
    pub conversation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new().route("/api/copilot", post(copilot)).with_state(CopilotState { orchestrator })
}

pub async fn copilot(
    State(state): State<CopilotState>,
    Json(request): Json<CopilotRequest>,
) -> Result<Json<CopilotResponse>, (StatusCode, Json<ErrorResponse>)> {
    let correlation_id = Uuid::new_v4().to_string();

    let outcome = state
        .orchestrator
        .handle(&request.message, request.conversation_id.as_deref(), &correlation_id)
        .await
        .map_err(|turn_error| render_error(turn_error.into_interface(&correlation_id)))?;

    info!(
        event_name = "copilot.http.replied",
        correlation_id = %correlation_id,
        conversation_id = outcome.conversation_id.as_str(),
        routing_raw = outcome.trace.routing_raw.as_deref().unwrap_or_default(),
        fetch_sql = outcome.trace.fetch_sql.as_deref().unwrap_or_default(),
        fetch_reason = outcome.trace.fetch_reason.as_deref().unwrap_or_default(),
        "copilot reply sent"
    );

    Ok(Json(CopilotResponse {
        reply: outcome.reply,
        conversation_id: outcome.conversation_id.0,
    }))
}

fn render_error(interface: InterfaceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(
            event_name = "copilot.http.failed",
            correlation_id = interface.correlation_id(),
            status = status.as_u16(),
            error = %interface,
            "copilot request failed"
        );
    } else {
        warn!(
            event_name = "copilot.http.rejected",
            correlation_id = interface.correlation_id(),
            status = status.as_u16(),
            error = %interface,
            "copilot request rejected"
        );
    }

    let body = ErrorResponse {
        error: interface.user_message().to_string(),
        correlation_id: interface.correlation_id().to_string(),
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use copilot_agent::{AgentGateway, GatewayError, Orchestrator};
    use copilot_core::{AgentKey, ChatMessage};
    use copilot_db::{DataAccess, DataAccessError, QueryParams, Row};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::{router, CopilotResponse, ErrorResponse};

    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, GatewayError>>>,
    }

    impl ScriptedGateway {
        fn new<const N: usize>(replies: [Result<String, GatewayError>; N]) -> Self {
            Self { replies: Mutex::new(replies.into_iter().collect()) }
        }
    }

    #[async_trait]
    impl AgentGateway for ScriptedGateway {
        async fn call_agent(
            &self,
            agent: AgentKey,
            _messages: &[ChatMessage],
            _conversation_id: Option<&str>,
        ) -> Result<String, GatewayError> {
            self.replies.lock().await.pop_front().unwrap_or_else(|| {
                Err(GatewayError::Transport(format!("no scripted reply for {agent}")))
            })
        }
    }

    struct FixedRows(Vec<Row>);

    #[async_trait]
    impl DataAccess for FixedRows {
        async fn query(
            &self,
            _sql: &str,
            _params: &QueryParams,
            _row_limit: Option<u32>,
        ) -> Result<Vec<Row>, DataAccessError> {
            Ok(self.0.clone())
        }
    }

    fn app<const N: usize>(replies: [Result<String, GatewayError>; N]) -> Router {
        let rows = (1..=3)
            .filter_map(|id| json!({"id": id, "name": format!("promo-{id}")}).as_object().cloned())
            .collect();
        let orchestrator =
            Orchestrator::new(Arc::new(ScriptedGateway::new(replies)), Arc::new(FixedRows(rows)));
        router(Arc::new(orchestrator))
    }

    fn ok(reply: &str) -> Result<String, GatewayError> {
        Ok(reply.to_string())
    }

    async fn post(app: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/copilot")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn promotion_request_returns_reply_and_conversation_id() {
        let app = app([
            ok("promotion"),
            ok(r#"{"sql": "SELECT id, name FROM promo", "reason": "top promos"}"#),
            ok("Here are the promos."),
        ]);

        let (status, body) =
            post(app, json!({"message": "show top promos", "conversation_id": "conv-1"})).await;

        assert_eq!(status, StatusCode::OK);
        let response: CopilotResponse = serde_json::from_value(body).expect("copilot response");
        assert_eq!(
            response,
            CopilotResponse {
                reply: "Here are the promos.".to_string(),
                conversation_id: "conv-1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_conversation_id_is_generated() {
        let app = app([ok("general"), ok("CLARIFY: which region?")]);

        let (status, body) = post(app, json!({"message": "how are sales?"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "which region?");
        assert!(body["conversation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn blank_message_is_a_bad_request() {
        let (status, body) = post(app([]), json!({"message": "   "})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_value(body).expect("error body");
        assert_eq!(error.error, "The request could not be processed. Check inputs and try again.");
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn malformed_fetch_reply_is_a_bad_request() {
        let app = app([ok("procurement"), ok("no query today")]);

        let (status, _) = post(app, json!({"message": "vendor spend"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn agent_outage_is_service_unavailable_without_details() {
        let app = app([Err(GatewayError::Transport("connection refused to 10.0.0.7".to_string()))]);

        let (status, body) = post(app, json!({"message": "hello"})).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn invalid_agent_response_is_internal() {
        let app = app([Err(GatewayError::InvalidResponse("no output".to_string()))]);

        let (status, body) = post(app, json!({"message": "hello"})).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "An unexpected internal error occurred.");
    }
}
