//! Chat completion response parsing.
//!
//! Turns a non-streaming `/chat/completions` body into one assistant
//! [`Message`]. Tool call arguments are passed through untouched so the tool
//! executor can report malformed payloads back to the model.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::ToolCall;
use crate::agent_core::types::Message;

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    /// Chain-of-thought from reasoning models. Deserialized so it doesn't
    /// trip unknown-field handling; never surfaced.
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    #[serde(default)]
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

/// Parse a non-streaming response body into an assistant message.
pub fn parse_completion_response(body: &str) -> Result<Message, InferenceError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse response body: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.is_empty());

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: tc.function.name,
            arguments: arguments_to_string(tc.function.arguments),
        })
        .collect();

    if tool_calls.is_empty() {
        Ok(Message::assistant(content.unwrap_or_default()))
    } else {
        Ok(Message::assistant_tool_calls(content, tool_calls))
    }
}

/// Some servers return arguments as a JSON object instead of a string.
fn arguments_to_string(arguments: Option<serde_json::Value>) -> String {
    match arguments {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::Role;

    #[test]
    fn test_parse_text_response() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Hello, world!"},
                "finish_reason": "stop"
            }]
        }"#;
        let msg = parse_completion_response(body).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.as_deref(), Some("Hello, world!"));
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_parse_tool_calls_keeps_raw_arguments() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "list_files", "arguments": "{\"path\": \"/tmp\"}"}
                    }, {
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{broken"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let msg = parse_completion_response(body).unwrap();
        assert!(msg.content.is_none());
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].arguments, "{\"path\": \"/tmp\"}");
        assert!(calls[1].id.starts_with("call_"));
        assert_eq!(calls[1].arguments, "{broken");
    }

    #[test]
    fn test_parse_object_arguments() {
        let body = r#"{"choices":[{"message":{"tool_calls":[
            {"id":"c1","function":{"name":"think","arguments":{"thought":"hm"}}}
        ]}}]}"#;
        let msg = parse_completion_response(body).unwrap();
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].arguments, r#"{"thought":"hm"}"#);
    }

    #[test]
    fn test_parse_empty_choices() {
        let err = parse_completion_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(parse_completion_response("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn test_reasoning_only_yields_empty_text() {
        let body = r#"{"choices":[{"message":{"content":"","reasoning":"thinking..."}}]}"#;
        let msg = parse_completion_response(body).unwrap();
        assert_eq!(msg.content.as_deref(), Some(""));
        assert!(msg.tool_calls.is_none());
    }
}
