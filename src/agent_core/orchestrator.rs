//! Orchestrator: top-level driver for one user request.
//!
//! 1. **Plan**: a coordinator loop, restricted to the planning tools, answers
//!    with a plan in marker format; the plan parser turns it into an
//!    [`ExecutionPlan`]
//! 2. **Delegate**: a complex plan goes to the multi-agent executor
//! 3. **Direct**: a simple plan goes to the general-purpose agent over the
//!    session history; the dynamic switch may then redirect it to a
//!    parallel fan-out
//!
//! Only the session conversation is persisted. Coordinator and sub-agent
//! conversations are private to their loops.

use std::sync::Arc;

use crate::inference::config::AgentsConfig;
use crate::inference::types::Role;
use crate::inference::ModelClient;

use super::agent_loop::AgentLoop;
use super::conversation::ResetPolicy;
use super::dynamic_switch::DynamicSwitch;
use super::events::EventContext;
use super::multi_agent::MultiAgentExecutor;
use super::plan_parser::extract_plan;
use super::tool_executor::ToolExecutor;
use super::tool_registry::ToolRegistry;
use super::types::{AgentOutcome, ExecutionMode, ExecutionPlan, Message};

const COORDINATOR_LABEL: &str = "Coordinator";
const SMART_AGENT_LABEL: &str = "Smart Agent";

// ─── Prompts ────────────────────────────────────────────────────────────────

/// System prompt for the planning coordinator.
pub const COORDINATOR_PROMPT: &str = r#"You are a coordinator. Decide whether a request can be handled by one agent or needs several cooperating agents. You do NOT carry out the request yourself.

Answer in exactly this format.

For a request one agent can handle:
COMPLEXITY: SIMPLE

For a request that needs several agents:
COMPLEXITY: COMPLEX
EXECUTION: PARALLEL | SEQUENTIAL | HYBRID
- Agent 1: [role] - instructions
- Agent 2: [role] - instructions

Use PARALLEL when the tasks are independent, SEQUENTIAL when each task needs the previous results. Use HYBRID when a discovery step must finish before independent work can start:
COMPLEXITY: COMPLEX
EXECUTION: HYBRID
PHASES:
PHASE 1 (SEQUENTIAL):
- Agent 1: [role] - instructions
PHASE 2 (PARALLEL):
- Agent 2: [role] - instructions
- Agent 3: [role] - instructions"#;

/// System prompt for the general-purpose agent.
pub const SMART_AGENT_PROMPT: &str = r#"You are a capable assistant with access to tools. Use them to complete the user's request, then answer with a clear summary.

If a discovery tool returns many independent items (more than three files or URLs) that each need the same processing, call signal_bulk_operation with the items and what to do with each one, or include the phrase BULK_OPERATION_DETECTED in your answer. Each item will then be handled by its own agent."#;

// ─── Types ──────────────────────────────────────────────────────────────────

/// How a request was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The general-purpose agent answered.
    Direct,
    /// The coordinator planned a multi-agent run.
    Delegated { mode: ExecutionMode, agents: usize },
    /// The general-purpose agent was redirected to a parallel fan-out.
    Redirected { agents: usize },
}

/// Outcome of [`Orchestrator::handle_request`].
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub route: Route,
    /// Final text for the user.
    pub text: String,
    /// Session conversation after this request, ending with the final answer.
    pub conversation: Vec<Message>,
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    settings: AgentsConfig,
    ctx: EventContext,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ModelClient>, registry: ToolRegistry, settings: AgentsConfig) -> Self {
        let executor = ToolExecutor::new(Arc::new(registry))
            .with_timeout(std::time::Duration::from_secs(settings.tool_timeout_secs))
            .with_max_result_chars(settings.max_tool_result_chars);
        Self {
            client,
            executor,
            settings,
            ctx: EventContext::default(),
        }
    }

    /// Listeners for the requests handled by this orchestrator.
    pub fn with_context(mut self, ctx: EventContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Ask the coordinator for a plan. Any failure yields a simple plan.
    pub async fn plan(&self, request: &str) -> ExecutionPlan {
        self.ctx.notify(COORDINATOR_LABEL, "Analyzing request");

        let planning = Arc::new(self.executor.registry().restricted(&self.settings.planning_tools));
        let coordinator = AgentLoop::new(
            COORDINATOR_LABEL,
            Arc::clone(&self.client),
            self.executor.with_registry(planning),
            self.settings.coordinator_max_iterations,
        )
        .with_context(self.ctx.without_persistence());

        let run = coordinator
            .run(vec![Message::system(COORDINATOR_PROMPT), Message::user(request)])
            .await;
        if run.failed() {
            tracing::warn!("coordinator failed, handling request directly");
            return ExecutionPlan::simple();
        }

        let plan = extract_plan(&run.final_text());
        tracing::info!(
            complex = plan.complex,
            mode = %plan.mode,
            tasks = plan.task_count(),
            "coordinator plan extracted"
        );
        plan
    }

    /// Handle one user request on top of the session `history`.
    pub async fn handle_request(&self, history: &[Message], request: &str) -> OrchestrationResult {
        let plan = self.plan(request).await;
        let mut conversation = self.prepare_conversation(history, request);

        if plan.complex {
            let report = self.multi_agent().run(&plan, request).await;
            let text = report.combined_text();
            self.append(&mut conversation, Message::assistant(text.clone()));
            return OrchestrationResult {
                route: Route::Delegated {
                    mode: plan.mode,
                    agents: report.results.len(),
                },
                text,
                conversation,
            };
        }

        let agent = AgentLoop::new(
            SMART_AGENT_LABEL,
            Arc::clone(&self.client),
            self.executor.clone(),
            self.settings.agent_max_iterations,
        )
        .with_context(self.ctx.clone());
        let run = agent.run(conversation).await;

        match DynamicSwitch::from_settings(&self.settings).evaluate(&run) {
            AgentOutcome::Finished(text) => OrchestrationResult {
                route: Route::Direct,
                text,
                conversation: run.conversation,
            },
            AgentOutcome::Redirect(tasks) => {
                self.ctx.notify(
                    SMART_AGENT_LABEL,
                    &format!("Bulk operation detected, handing {} items to parallel agents", tasks.len()),
                );
                let fan_out = ExecutionPlan::flat(ExecutionMode::Parallel, tasks);
                let report = self.multi_agent().run(&fan_out, request).await;
                let text = report.combined_text();
                let mut conversation = run.conversation;
                self.append(&mut conversation, Message::assistant(text.clone()));
                OrchestrationResult {
                    route: Route::Redirected {
                        agents: report.results.len(),
                    },
                    text,
                    conversation,
                }
            }
        }
    }

    /// Session history plus the new user turn, reset and validated.
    /// The system prompt is supplied here and never persisted. A reset is
    /// reported to the persistence sink before the user turn is stored.
    fn prepare_conversation(&self, history: &[Message], request: &str) -> Vec<Message> {
        let mut base = Vec::with_capacity(history.len() + 1);
        if history.first().map(|m| m.role) != Some(Role::System) {
            base.push(Message::system(SMART_AGENT_PROMPT));
        }
        base.extend_from_slice(history);

        let policy = ResetPolicy::new(
            self.settings.error_marker.clone(),
            self.settings.max_conversation_messages,
        );
        if policy.reset_reason(&base).is_some() {
            self.ctx.mark_reset();
        }
        let conversation = policy.prepare(&base, request);
        if let Some(user) = conversation.last() {
            self.ctx.persist(user);
        }
        conversation
    }

    fn multi_agent(&self) -> MultiAgentExecutor {
        MultiAgentExecutor::from_settings(Arc::clone(&self.client), self.executor.clone(), &self.settings)
            .with_context(&self.ctx)
    }

    fn append(&self, conversation: &mut Vec<Message>, message: Message) {
        self.ctx.persist(&message);
        conversation.push(message);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
