//! Agent Core: orchestration layer for Coworker.
//!
//! Submodules:
//! - `types`: Messages, tool results, execution plans
//! - `conversation`: Tool-call pairing validation and the reset policy
//! - `tool_registry`: Tool trait, registry, built-in `think` / `signal_bulk_operation`
//! - `tool_executor`: Runs one tool call; never fails
//! - `fs_tools`: In-process `list_directory` / `read_file`
//! - `events`: Progress and persistence sinks passed per request
//! - `agent_loop`: Single-agent model ↔ tools state machine
//! - `plan_parser`: Coordinator text → execution plan
//! - `multi_agent`: Sequential / parallel / hybrid sub-agent execution
//! - `dynamic_switch`: One-shot redirect of the general agent into a fan-out
//! - `orchestrator`: Top-level request driver
//! - `database`: SQLite thread store
//! - `errors`: Agent-level error types

pub mod agent_loop;
pub mod conversation;
pub mod database;
pub mod dynamic_switch;
pub mod errors;
pub mod events;
pub mod fs_tools;
pub mod multi_agent;
pub mod orchestrator;
pub mod plan_parser;
pub mod tool_executor;
pub mod tool_registry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use agent_loop::{AgentLoop, LoopRun, StopReason};
pub use conversation::{validate, ConversationManager, ResetPolicy};
pub use database::{ThreadSink, ThreadStore};
pub use dynamic_switch::DynamicSwitch;
pub use errors::AgentError;
pub use events::{EventContext, MessageSink, ProgressSink};
pub use multi_agent::{MultiAgentExecutor, MultiAgentReport, TaskOutcome};
pub use orchestrator::{OrchestrationResult, Orchestrator, Route};
pub use plan_parser::extract_plan;
pub use tool_executor::ToolExecutor;
pub use tool_registry::{FnTool, Tool, ToolRegistry};
pub use types::{
    AgentOutcome, AgentTask, ExecutionMode, ExecutionPlan, Message, Phase, ToolInvocation,
    ToolResult,
};
