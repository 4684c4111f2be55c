//! Single-Agent Loop: model ↔ tools round trips until a final answer.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! AwaitingModel ──(tool calls)──▶ ProcessingTools ──▶ AwaitingModel
//!       │                                               │
//!       └──(text / model error / iteration cap)──▶ Done ◀┘
//! ```
//!
//! Tool calls of one assistant turn run one at a time in emission order.
//! Every appended message goes to the persistence sink of the loop's
//! [`EventContext`].

use std::sync::Arc;

use crate::inference::types::{Role, ToolCall, ToolDefinition};
use crate::inference::ModelClient;

use super::conversation::ConversationManager;
use super::events::EventContext;
use super::tool_executor::ToolExecutor;
use super::tool_registry::THINK_TOOL;
use super::types::{Message, ToolInvocation, ToolResult};

/// Prefix of the assistant message appended when the model call fails.
pub const MODEL_ERROR_PREFIX: &str = "Error:";

// ─── State ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ProcessingTools(Vec<ToolCall>),
    Done(StopReason),
}

/// Why the loop reached `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without tool calls.
    Completed,
    /// The model request failed; an error message was appended.
    ModelError,
    /// The round-trip cap was hit; a notice was appended.
    MaxIterations,
}

/// Everything a finished loop produced.
#[derive(Debug, Clone)]
pub struct LoopRun {
    /// Full conversation: the input followed by everything appended.
    pub conversation: Vec<Message>,
    /// Length of the input conversation.
    pub start_len: usize,
    /// Tool calls and their untruncated results, in execution order.
    pub tool_history: Vec<ToolInvocation>,
    pub stop: StopReason,
    /// Model round trips performed.
    pub iterations: usize,
}

impl LoopRun {
    /// Messages appended by this run.
    pub fn new_messages(&self) -> &[Message] {
        &self.conversation[self.start_len.min(self.conversation.len())..]
    }

    /// Text of the last assistant message this run appended.
    pub fn final_text(&self) -> String {
        self.assistant_texts().last().unwrap_or_default().to_string()
    }

    /// Non-empty assistant texts appended by this run, in order.
    pub fn assistant_texts(&self) -> impl Iterator<Item = &str> {
        self.new_messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content_str())
            .filter(|t| !t.is_empty())
    }

    pub fn failed(&self) -> bool {
        self.stop == StopReason::ModelError
    }
}

// ─── AgentLoop ──────────────────────────────────────────────────────────────

/// One configured agent: a model, a tool set, an iteration cap.
pub struct AgentLoop {
    label: String,
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    tools: Vec<ToolDefinition>,
    max_iterations: usize,
    ctx: EventContext,
}

impl AgentLoop {
    /// The tool catalog offered to the model is the executor's registry.
    pub fn new(
        label: impl Into<String>,
        client: Arc<dyn ModelClient>,
        executor: ToolExecutor,
        max_iterations: usize,
    ) -> Self {
        let tools = executor.registry().definitions();
        Self {
            label: label.into(),
            client,
            executor,
            tools,
            max_iterations: max_iterations.max(1),
            ctx: EventContext::default(),
        }
    }

    pub fn with_context(mut self, ctx: EventContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Drive `conversation` to `Done`.
    pub async fn run(&self, conversation: Vec<Message>) -> LoopRun {
        let start_len = conversation.len();
        let mut conv = ConversationManager::new(conversation);
        let mut tool_history = Vec::new();
        let mut iterations = 0usize;
        let mut state = LoopState::AwaitingModel;

        let stop = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if iterations >= self.max_iterations {
                        tracing::warn!(
                            agent = %self.label,
                            max_iterations = self.max_iterations,
                            "iteration cap reached"
                        );
                        self.append(
                            &mut conv,
                            Message::assistant(format!(
                                "Stopped after reaching the maximum of {} iterations.",
                                self.max_iterations
                            )),
                        );
                        LoopState::Done(StopReason::MaxIterations)
                    } else {
                        iterations += 1;
                        self.await_model(&mut conv, iterations).await
                    }
                }
                LoopState::ProcessingTools(calls) => {
                    for call in &calls {
                        let invocation = self.process_tool(&mut conv, call).await;
                        tool_history.push(invocation);
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(reason) => break reason,
            };
        };

        tracing::info!(
            agent = %self.label,
            ?stop,
            iterations,
            tool_calls = tool_history.len(),
            "agent loop finished"
        );

        LoopRun {
            conversation: conv.into_messages(),
            start_len,
            tool_history,
            stop,
            iterations,
        }
    }

    async fn await_model(&self, conv: &mut ConversationManager, round: usize) -> LoopState {
        tracing::debug!(agent = %self.label, round, messages = conv.len(), "calling model");

        match self.client.complete(conv.messages(), &self.tools).await {
            Err(e) => {
                tracing::error!(agent = %self.label, round, error = %e, "model request failed");
                self.append(
                    conv,
                    Message::assistant(format!(
                        "{MODEL_ERROR_PREFIX} the model request failed: {e}"
                    )),
                );
                LoopState::Done(StopReason::ModelError)
            }
            Ok(message) => {
                let calls = message.requested_calls().to_vec();
                self.append(conv, message);
                if calls.is_empty() {
                    LoopState::Done(StopReason::Completed)
                } else {
                    tracing::info!(agent = %self.label, round, count = calls.len(), "model requested tools");
                    LoopState::ProcessingTools(calls)
                }
            }
        }
    }

    async fn process_tool(&self, conv: &mut ConversationManager, call: &ToolCall) -> ToolInvocation {
        if call.name == THINK_TOOL {
            if let Some(thought) = thought_of(call) {
                tracing::debug!(agent = %self.label, %thought, "think");
                self.ctx.notify(&self.label, &format!("Thinking: {thought}"));
            }
        }
        self.ctx.notify(&self.label, &format!("Running tool: {}", call.name));

        let result = self.executor.execute(call).await;

        match &result {
            ToolResult::Success(_) => {
                self.ctx.notify(&self.label, &format!("Tool {} finished", call.name))
            }
            ToolResult::Error { message } => self
                .ctx
                .notify(&self.label, &format!("Tool {} failed: {message}", call.name)),
        }

        let content = self.executor.render(call, &result);
        self.append(conv, Message::tool_result(&call.id, &call.name, content));

        ToolInvocation {
            call: call.clone(),
            result,
        }
    }

    fn append(&self, conv: &mut ConversationManager, message: Message) {
        let appended = conv.push(message);
        self.ctx.persist(appended);
    }
}

fn thought_of(call: &ToolCall) -> Option<String> {
    let args: serde_json::Value = serde_json::from_str(&call.arguments).ok()?;
    args.get("thought")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::conversation::validate;
    use crate::agent_core::events::MessageSink;
    use crate::agent_core::test_support::{tool_call, ScriptedClient};
    use crate::agent_core::tool_registry::{FnTool, ToolRegistry};
    use crate::inference::InferenceError;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Message>>);

    impl MessageSink for Recorder {
        fn append(&self, message: &Message) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    fn executor_with(order: Arc<Mutex<Vec<String>>>) -> ToolExecutor {
        let mut registry = ToolRegistry::with_builtins();
        let log = Arc::clone(&order);
        registry.register(FnTool::new(
            "list_files",
            "List files",
            json!({"type": "object"}),
            move |args| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(format!("list:{}", args["path"]));
                    Ok(json!(["a.txt", "b.txt"]))
                }
            },
        ));
        let log = Arc::clone(&order);
        registry.register(FnTool::new(
            "write_file",
            "Write a file",
            json!({"type": "object"}),
            move |_| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("write".to_string());
                    Ok(json!({"written": true}))
                }
            },
        ));
        ToolExecutor::new(Arc::new(registry))
    }

    fn base_conversation() -> Vec<Message> {
        vec![Message::system("You are helpful."), Message::user("list files")]
    }

    #[tokio::test]
    async fn test_text_answer_completes_in_one_round() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(Message::assistant("Hi there"))]));
        let agent = AgentLoop::new("Smart Agent", client.clone(), executor_with(Default::default()), 5);

        let run = agent.run(base_conversation()).await;
        assert_eq!(run.stop, StopReason::Completed);
        assert_eq!(run.iterations, 1);
        assert_eq!(run.final_text(), "Hi there");
        assert_eq!(run.new_messages().len(), 1);

        let (_, tools) = &client.requests()[0];
        assert!(tools.contains(&"list_files".to_string()));
    }

    #[tokio::test]
    async fn test_tool_round_trip_then_answer() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(Message::assistant_tool_calls(
                None,
                vec![tool_call("1", "list_files", r#"{"path": "."}"#)],
            )),
            Ok(Message::assistant("Two files: a.txt and b.txt")),
        ]));
        let agent = AgentLoop::new("Smart Agent", client.clone(), executor_with(Default::default()), 5);

        let run = agent.run(base_conversation()).await;
        assert_eq!(run.stop, StopReason::Completed);
        assert_eq!(run.iterations, 2);
        assert_eq!(run.tool_history.len(), 1);
        assert_eq!(run.final_text(), "Two files: a.txt and b.txt");

        // assistant(call), tool(result), assistant(text)
        let new = run.new_messages();
        assert_eq!(new.len(), 3);
        assert_eq!(new[1].role, Role::Tool);
        assert_eq!(new[1].tool_call_id.as_deref(), Some("1"));
        assert_eq!(new[1].content_str(), r#"["a.txt","b.txt"]"#);

        // The second request carried the tool result.
        let (second, _) = &client.requests()[1];
        assert_eq!(second.last().map(|m| m.role), Some(Role::Tool));

        assert_eq!(validate(&run.conversation), run.conversation);
    }

    #[tokio::test]
    async fn test_calls_in_one_turn_run_in_emission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(Message::assistant_tool_calls(
                None,
                vec![
                    tool_call("a", "write_file", "{}"),
                    tool_call("b", "list_files", r#"{"path": "out"}"#),
                    tool_call("c", "nope", "{}"),
                ],
            )),
            Ok(Message::assistant("done")),
        ]));
        let agent = AgentLoop::new("A", client, executor_with(Arc::clone(&order)), 5);

        let run = agent.run(base_conversation()).await;
        assert_eq!(order.lock().unwrap().as_slice(), ["write", "list:\"out\""]);

        let ids: Vec<_> = run
            .new_messages()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(run.tool_history[2].result.is_error());
        assert_eq!(run.stop, StopReason::Completed);
    }

    #[tokio::test]
    async fn test_model_error_is_terminal_message() {
        let client = Arc::new(ScriptedClient::new(vec![Err(InferenceError::HttpError {
            status: 500,
            body: "overloaded".into(),
        })]));
        let agent = AgentLoop::new("A", client.clone(), executor_with(Default::default()), 5);

        let run = agent.run(base_conversation()).await;
        assert_eq!(run.stop, StopReason::ModelError);
        assert!(run.failed());
        assert!(run.final_text().starts_with("Error:"));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_iteration_cap_appends_notice() {
        let looping = || {
            Ok(Message::assistant_tool_calls(
                None,
                vec![tool_call(&uuid::Uuid::new_v4().to_string(), "list_files", "{}")],
            ))
        };
        let client = Arc::new(ScriptedClient::new(vec![looping(), looping(), looping()]));
        let agent = AgentLoop::new("A", client.clone(), executor_with(Default::default()), 2);

        let run = agent.run(base_conversation()).await;
        assert_eq!(run.stop, StopReason::MaxIterations);
        assert_eq!(run.iterations, 2);
        assert_eq!(client.requests().len(), 2);
        assert!(run.final_text().contains("maximum of 2 iterations"));
        // Every call was answered before stopping.
        assert_eq!(validate(&run.conversation), run.conversation);
    }

    #[tokio::test]
    async fn test_think_is_acknowledged_and_reported() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(Message::assistant_tool_calls(
                None,
                vec![tool_call("t", THINK_TOOL, r#"{"thought": "check the folder first"}"#)],
            )),
            Ok(Message::assistant("ok")),
        ]));
        let notes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notes);
        let ctx = EventContext::new().with_progress(Arc::new(move |label: &str, msg: &str| {
            sink.lock().unwrap().push(format!("{label}|{msg}"));
        }));
        let agent =
            AgentLoop::new("Planner", client, executor_with(Default::default()), 5).with_context(ctx);

        let run = agent.run(base_conversation()).await;
        assert!(!run.tool_history[0].result.is_error());

        let notes = notes.lock().unwrap();
        assert_eq!(notes[0], "Planner|Thinking: check the folder first");
        assert_eq!(notes[1], "Planner|Running tool: think");
        assert_eq!(notes[2], "Planner|Tool think finished");
    }

    #[tokio::test]
    async fn test_every_appended_message_is_persisted() {
        let recorder = Arc::new(Recorder::default());
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(Message::assistant_tool_calls(
                None,
                vec![tool_call("1", "list_files", "{}")],
            )),
            Ok(Message::assistant("done")),
        ]));
        let agent = AgentLoop::new("A", client, executor_with(Default::default()), 5)
            .with_context(EventContext::new().with_persistence(recorder.clone()));

        let run = agent.run(base_conversation()).await;
        assert_eq!(recorder.0.lock().unwrap().as_slice(), run.new_messages());
    }
}
