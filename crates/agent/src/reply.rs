//! Pure interpretation of agent replies.
//!
//! Business agents answer in free text and signal a clarification loop with a
//! leading marker. The data-fetch agent answers with a JSON object, optionally
//! wrapped in a markdown fence.

use copilot_db::QueryParams;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const CLARIFICATION_MARKER: &str = "clarify:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentReply {
    Clarification(String),
    Final(String),
}

impl AgentReply {
    pub fn is_clarification(&self) -> bool {
        matches!(self, Self::Clarification(_))
    }
}

pub fn parse_agent_reply(raw: &str) -> AgentReply {
    let trimmed = raw.trim();
    let marker_len = CLARIFICATION_MARKER.len();

    match trimmed.get(..marker_len) {
        Some(prefix) if prefix.eq_ignore_ascii_case(CLARIFICATION_MARKER) => {
            AgentReply::Clarification(trimmed[marker_len..].trim().to_string())
        }
        _ => AgentReply::Final(raw.to_string()),
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("data fetch reply is not a valid fetch request: {0}")]
pub struct MalformedFetchResponse(pub String);

#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub sql: String,
    pub params: QueryParams,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFetchRequest {
    sql: Option<String>,
    #[serde(default)]
    params: Option<QueryParams>,
    #[serde(default)]
    reason: Option<String>,
}

pub fn parse_fetch_request(raw: &str) -> Result<FetchRequest, MalformedFetchResponse> {
    let body = unfence(raw.trim())?;
    let value: Value = serde_json::from_str(body)
        .map_err(|error| MalformedFetchResponse(format!("invalid JSON: {error}")))?;
    if !value.is_object() {
        return Err(MalformedFetchResponse("expected a JSON object".to_string()));
    }
    let parsed: RawFetchRequest = serde_json::from_value(value)
        .map_err(|error| MalformedFetchResponse(format!("invalid JSON object: {error}")))?;

    let sql = parsed
        .sql
        .map(|sql| sql.trim().to_string())
        .filter(|sql| !sql.is_empty())
        .ok_or_else(|| MalformedFetchResponse("missing `sql` field".to_string()))?;

    Ok(FetchRequest {
        sql,
        params: parsed.params.unwrap_or_default(),
        reason: parsed.reason.filter(|reason| !reason.trim().is_empty()),
    })
}

fn unfence(text: &str) -> Result<&str, MalformedFetchResponse> {
    if !text.starts_with("```") {
        return Ok(text);
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(MalformedFetchResponse("fenced reply contains no JSON object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_agent_reply, parse_fetch_request, AgentReply, MalformedFetchResponse};

    #[test]
    fn marker_prefix_yields_trimmed_question() {
        assert_eq!(
            parse_agent_reply("CLARIFY: which region?"),
            AgentReply::Clarification("which region?".to_string())
        );
        assert_eq!(
            parse_agent_reply("  clarify:\n  for which quarter?  "),
            AgentReply::Clarification("for which quarter?".to_string())
        );
    }

    #[test]
    fn marker_elsewhere_is_a_final_reply() {
        let reply = "Sure. Clarify: nothing needed.";
        assert_eq!(parse_agent_reply(reply), AgentReply::Final(reply.to_string()));
        assert_eq!(parse_agent_reply("clarify"), AgentReply::Final("clarify".to_string()));
        assert!(!parse_agent_reply("émoji first").is_clarification());
    }

    #[test]
    fn bare_json_fetch_request_parses() {
        let request = parse_fetch_request(
            r#"{"sql":"SELECT * FROM promo WHERE region = :region","params":{"region":"north"},"reason":"top promos"}"#,
        )
        .expect("fetch request");

        assert_eq!(request.sql, "SELECT * FROM promo WHERE region = :region");
        assert_eq!(request.params.get("region"), Some(&json!("north")));
        assert_eq!(request.reason.as_deref(), Some("top promos"));
    }

    #[test]
    fn fenced_json_fetch_request_parses() {
        let raw = "```json\n{\"sql\": \"SELECT id FROM vendor\", \"params\": null}\n```";
        let request = parse_fetch_request(raw).expect("fenced fetch request");

        assert_eq!(request.sql, "SELECT id FROM vendor");
        assert!(request.params.is_empty());
        assert_eq!(request.reason, None);
    }

    #[test]
    fn malformed_fetch_replies_are_rejected() {
        for raw in [
            "I could not build a query.",
            "```\nno json here\n```",
            r#"{"params":{}}"#,
            r#"{"sql":"   "}"#,
            r#"{"sql":"SELECT 1","params":["x"]}"#,
            r#"["SELECT 1"]"#,
            r#"["SELECT 1", {}, "reason"]"#,
            r#""SELECT 1""#,
        ] {
            assert!(
                matches!(parse_fetch_request(raw), Err(MalformedFetchResponse(_))),
                "expected malformed fetch response for {raw}"
            );
        }
    }

    #[test]
    fn positional_json_is_not_a_fetch_request() {
        let error = parse_fetch_request(r#"["SELECT * FROM promo"]"#)
            .expect_err("array replies should be rejected");
        assert_eq!(error, MalformedFetchResponse("expected a JSON object".to_string()));
    }
}
