//! Shared types for the agent core.
//!
//! Conversation messages, tool results, and the execution plan produced by the
//! plan extractor and consumed by the multi-agent executor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::inference::types::{Role, ToolCall};

// ─── Conversation Messages ──────────────────────────────────────────────────

/// One turn in a conversation.
///
/// Messages are appended, never edited. `tool_calls` is only set on assistant
/// turns; `tool_call_id` and `name` only on tool turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant turn requesting tools. Empty `tool_calls` yields a plain
    /// text turn so "has tool calls" is always `tool_calls.is_some()`.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
            name: None,
        }
    }

    /// A tool turn answering the call `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    /// Text content, or `""` for a pure tool-call turn.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Tool calls requested by this turn (empty unless an assistant turn).
    pub fn requested_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.requested_calls().is_empty()
    }
}

// ─── Tool Results ───────────────────────────────────────────────────────────

/// Outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Tool-specific structured payload.
    Success(serde_json::Value),
    /// Human-readable failure description.
    Error { message: String },
}

impl ToolResult {
    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }

    /// Serialize into the `content` of the answering tool message.
    ///
    /// String payloads are sent as-is rather than JSON-quoted.
    pub fn to_content(&self) -> String {
        match self {
            ToolResult::Success(serde_json::Value::String(s)) => s.clone(),
            ToolResult::Success(value) => value.to_string(),
            ToolResult::Error { message } => serde_json::json!({ "error": message }).to_string(),
        }
    }
}

/// A tool call paired with its result, in execution order.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call: ToolCall,
    pub result: ToolResult,
}

// ─── Execution Plan ─────────────────────────────────────────────────────────

/// How the tasks of a plan (or of one phase) are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[serde(alias = "PARALLEL", alias = "Parallel")]
    Parallel,
    #[default]
    #[serde(alias = "SEQUENTIAL", alias = "Sequential")]
    Sequential,
    #[serde(alias = "HYBRID", alias = "Hybrid")]
    Hybrid,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Parallel => "PARALLEL",
            ExecutionMode::Sequential => "SEQUENTIAL",
            ExecutionMode::Hybrid => "HYBRID",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of delegated work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Descriptive label only; never used for dispatch.
    pub role: String,
    pub instructions: String,
}

impl AgentTask {
    pub fn new(role: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            instructions: instructions.into(),
        }
    }
}

/// An ordered group of tasks inside a HYBRID plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// `Parallel` or `Sequential`.
    pub mode: ExecutionMode,
    pub tasks: Vec<AgentTask>,
}

/// Structured plan extracted from the coordinator's answer.
///
/// A simple plan has no tasks and no phases; the request goes to the
/// general-purpose agent. `phases` is only populated in HYBRID mode and
/// `tasks` only outside it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub complex: bool,
    pub mode: ExecutionMode,
    #[serde(default)]
    pub tasks: Vec<AgentTask>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

impl ExecutionPlan {
    /// The plan for a request handled directly by one agent.
    pub fn simple() -> Self {
        Self::default()
    }

    pub fn flat(mode: ExecutionMode, tasks: Vec<AgentTask>) -> Self {
        Self {
            complex: true,
            mode,
            tasks,
            phases: Vec::new(),
        }
    }

    pub fn hybrid(phases: Vec<Phase>) -> Self {
        Self {
            complex: true,
            mode: ExecutionMode::Hybrid,
            tasks: Vec::new(),
            phases,
        }
    }

    /// Total number of tasks across all phases.
    pub fn task_count(&self) -> usize {
        self.tasks.len() + self.phases.iter().map(|p| p.tasks.len()).sum::<usize>()
    }
}

// ─── Agent Outcome ──────────────────────────────────────────────────────────

/// Result of the general-purpose agent path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The loop's own final answer.
    Finished(String),
    /// Hand off to a parallel fan-out, one task per discovered item.
    Redirect(Vec<AgentTask>),
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_tool_calls_empty_is_text_turn() {
        let msg = Message::assistant_tool_calls(Some("done".into()), vec![]);
        assert!(msg.tool_calls.is_none());
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_tool_result_content_string_not_quoted() {
        let ok = ToolResult::Success(serde_json::json!("plain text"));
        assert_eq!(ok.to_content(), "plain text");

        let obj = ToolResult::Success(serde_json::json!({"files": ["a.txt"]}));
        assert_eq!(obj.to_content(), r#"{"files":["a.txt"]}"#);
    }

    #[test]
    fn test_tool_result_error_content() {
        let err = ToolResult::error("tool not found: 'nope'");
        assert!(err.is_error());
        let parsed: serde_json::Value = serde_json::from_str(&err.to_content()).unwrap();
        assert_eq!(parsed["error"], "tool not found: 'nope'");
    }

    #[test]
    fn test_execution_mode_deserialize_any_case() {
        let m: ExecutionMode = serde_json::from_str(r#""PARALLEL""#).unwrap();
        assert_eq!(m, ExecutionMode::Parallel);
        let m: ExecutionMode = serde_json::from_str(r#""hybrid""#).unwrap();
        assert_eq!(m, ExecutionMode::Hybrid);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Sequential);
    }

    #[test]
    fn test_plan_task_count() {
        let plan = ExecutionPlan::hybrid(vec![
            Phase {
                mode: ExecutionMode::Sequential,
                tasks: vec![AgentTask::new("Scout", "find files")],
            },
            Phase {
                mode: ExecutionMode::Parallel,
                tasks: vec![AgentTask::new("A", "x"), AgentTask::new("B", "y")],
            },
        ]);
        assert_eq!(plan.task_count(), 3);
        assert!(plan.complex);
        assert_eq!(ExecutionPlan::simple().task_count(), 0);
    }

    #[test]
    fn test_message_serde_skips_absent_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("name").is_none());
    }
}
