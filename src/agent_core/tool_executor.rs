//! Tool-Call Executor: resolve, invoke, and capture one tool call.
//!
//! `execute` never fails: malformed arguments, unknown names, tool errors,
//! panics, and timeouts all come back as [`ToolResult::Error`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use crate::inference::types::ToolCall;

use super::tool_registry::ToolRegistry;
use super::types::ToolResult;

/// Default per-call timeout when neither the tool nor the config sets one.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on the tool result text fed back to the model.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 6_000;

/// Runs tool calls against a shared registry.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
    max_result_chars: usize,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_result_chars(mut self, max: usize) -> Self {
        self.max_result_chars = max;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Same limits, different tool set.
    pub fn with_registry(&self, registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            ..self.clone()
        }
    }

    /// Execute one tool call.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let args = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(reason) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, %reason, "malformed tool arguments");
                return ToolResult::error(format!(
                    "malformed arguments for '{}': {reason}",
                    call.name
                ));
            }
        };

        let Some(tool) = self.registry.get(&call.name) else {
            tracing::warn!(tool = %call.name, "unknown tool requested");
            return ToolResult::error(format!("tool not found: '{}'", call.name));
        };

        let limit = tool.timeout().unwrap_or(self.default_timeout);
        let start = std::time::Instant::now();
        let invocation = AssertUnwindSafe(tool.call(args)).catch_unwind();

        let result = match tokio::time::timeout(limit, invocation).await {
            Ok(Ok(Ok(value))) => ToolResult::Success(value),
            Ok(Ok(Err(e))) => ToolResult::error(format!("{e:#}")),
            Ok(Err(panic)) => ToolResult::error(format!(
                "tool '{}' panicked: {}",
                call.name,
                panic_message(panic.as_ref())
            )),
            Err(_) => ToolResult::error(format!(
                "tool '{}' timed out after {}s",
                call.name,
                limit.as_secs_f64()
            )),
        };

        tracing::info!(
            tool = %call.name,
            call_id = %call.id,
            is_error = result.is_error(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool call finished"
        );

        result
    }

    /// Content of the tool message answering `call`, capped in size.
    pub fn render(&self, call: &ToolCall, result: &ToolResult) -> String {
        truncate_tool_result(&result.to_content(), &call.name, self.max_result_chars)
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("tools", &self.registry.len())
            .field("default_timeout", &self.default_timeout)
            .field("max_result_chars", &self.max_result_chars)
            .finish()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Parse the serialized argument payload. Empty means no arguments.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Truncate a string to at most `max_bytes`, respecting UTF-8 char boundaries.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn truncate_tool_result(result: &str, tool_name: &str, max: usize) -> String {
    if result.len() <= max {
        return result.to_string();
    }

    let truncated = truncate_utf8(result, max);
    tracing::warn!(
        tool = %tool_name,
        original_len = result.len(),
        truncated_to = truncated.len(),
        "tool result truncated"
    );
    format!(
        "{truncated}\n\n[... truncated: showing first {} of {} chars]",
        truncated.len(),
        result.len()
    )
}

// ─── Tests ──────────────────────────────────────────────────────────────────
