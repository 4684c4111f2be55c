//! Multi-Agent Executor: runs the tasks of an [`ExecutionPlan`].
//!
//! Every task gets its own [`AgentLoop`] over a fresh conversation seeded
//! with the original request, the task instructions and, where the mode
//! allows, the finished results of earlier tasks.
//!
//! - SEQUENTIAL: one task at a time; task k sees the results of 1..k-1
//! - PARALLEL: all tasks at once on the current task; siblings never see
//!   each other's output
//! - HYBRID: phases in order, each phase waits for the previous one and
//!   sees all results produced before it
//!
//! A failing task yields a "failed" result and never aborts its siblings.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::inference::config::AgentsConfig;
use crate::inference::ModelClient;

use super::agent_loop::AgentLoop;
use super::events::EventContext;
use super::tool_executor::ToolExecutor;
use super::types::{AgentTask, ExecutionMode, ExecutionPlan, Message};

const PROGRESS_LABEL: &str = "Multi-Agent";

/// System prompt for delegated sub-agents.
pub const SUB_AGENT_PROMPT: &str = "You are a focused sub-agent working on one part of a larger request. \
Use the available tools to complete ONLY your assigned task. \
When you are done, reply with a concise summary of what you did and what you found. \
Do not ask the user questions.";

// ─── Results ────────────────────────────────────────────────────────────────

/// Result of one delegated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub role: String,
    pub output: String,
    pub failed: bool,
}

impl TaskOutcome {
    /// `"{role} completed: {output}"`, or `"{role} failed: {output}"`.
    pub fn summary(&self) -> String {
        let status = if self.failed { "failed" } else { "completed" };
        format!("{} {status}: {}", self.role, self.output)
    }
}

/// All task results of one plan, in plan order.
#[derive(Debug, Clone)]
pub struct MultiAgentReport {
    pub mode: ExecutionMode,
    pub results: Vec<TaskOutcome>,
}

impl MultiAgentReport {
    /// Single text for the caller: the mode, then one block per task.
    pub fn combined_text(&self) -> String {
        let mut text = format!(
            "Execution mode: {} ({} agents)",
            self.mode,
            self.results.len()
        );
        for result in &self.results {
            text.push_str("\n\n");
            text.push_str(&result.summary());
        }
        text
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.failed).count()
    }
}

fn join_summaries(results: &[TaskOutcome]) -> String {
    results
        .iter()
        .map(TaskOutcome::summary)
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── MultiAgentExecutor ─────────────────────────────────────────────────────

pub struct MultiAgentExecutor {
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    max_iterations: usize,
    /// `0` means no limit.
    max_concurrent: usize,
    ctx: EventContext,
}

impl MultiAgentExecutor {
    pub fn new(client: Arc<dyn ModelClient>, executor: ToolExecutor, max_iterations: usize) -> Self {
        Self {
            client,
            executor,
            max_iterations,
            max_concurrent: 0,
            ctx: EventContext::default(),
        }
    }

    pub fn from_settings(
        client: Arc<dyn ModelClient>,
        executor: ToolExecutor,
        settings: &AgentsConfig,
    ) -> Self {
        Self::new(client, executor, settings.sub_agent_max_iterations)
            .with_max_concurrent(settings.max_concurrent_agents)
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sub-agent conversations are private: persistence is always dropped.
    pub fn with_context(mut self, ctx: &EventContext) -> Self {
        self.ctx = ctx.without_persistence();
        self
    }

    /// Run every task of `plan` for `request`.
    pub async fn run(&self, plan: &ExecutionPlan, request: &str) -> MultiAgentReport {
        tracing::info!(
            mode = %plan.mode,
            tasks = plan.task_count(),
            phases = plan.phases.len(),
            "starting multi-agent execution"
        );
        self.ctx.notify(
            PROGRESS_LABEL,
            &format!("Running {} agents in {} mode", plan.task_count(), plan.mode),
        );

        let results = match plan.mode {
            ExecutionMode::Sequential => self.run_sequential(&plan.tasks, request, "", 1).await,
            ExecutionMode::Parallel => self.run_parallel(&plan.tasks, request, "", 1).await,
            ExecutionMode::Hybrid => self.run_hybrid(plan, request).await,
        };

        let report = MultiAgentReport {
            mode: plan.mode,
            results,
        };
        tracing::info!(
            mode = %report.mode,
            agents = report.results.len(),
            failures = report.failures(),
            "multi-agent execution finished"
        );
        report
    }

    async fn run_hybrid(&self, plan: &ExecutionPlan, request: &str) -> Vec<TaskOutcome> {
        let mut results: Vec<TaskOutcome> = Vec::with_capacity(plan.task_count());
        let total = plan.phases.len();

        for (i, phase) in plan.phases.iter().enumerate() {
            tracing::info!(phase = i + 1, mode = %phase.mode, tasks = phase.tasks.len(), "starting phase");
            self.ctx.notify(
                PROGRESS_LABEL,
                &format!(
                    "Phase {}/{total} ({}): {} agents",
                    i + 1,
                    phase.mode,
                    phase.tasks.len()
                ),
            );

            let context = join_summaries(&results);
            let first_number = results.len() + 1;
            let phase_results = match phase.mode {
                ExecutionMode::Parallel => {
                    self.run_parallel(&phase.tasks, request, &context, first_number)
                        .await
                }
                _ => {
                    self.run_sequential(&phase.tasks, request, &context, first_number)
                        .await
                }
            };
            results.extend(phase_results);
        }

        results
    }

    async fn run_sequential(
        &self,
        tasks: &[AgentTask],
        request: &str,
        base_context: &str,
        first_number: usize,
    ) -> Vec<TaskOutcome> {
        let mut results: Vec<TaskOutcome> = Vec::with_capacity(tasks.len());

        for (i, task) in tasks.iter().enumerate() {
            let prior = join_summaries(&results);
            let context = match (base_context.is_empty(), prior.is_empty()) {
                (true, _) => prior,
                (false, true) => base_context.to_string(),
                (false, false) => format!("{base_context}\n\n{prior}"),
            };
            let outcome = self.run_task(first_number + i, task, request, &context).await;
            results.push(outcome);
        }

        results
    }

    async fn run_parallel(
        &self,
        tasks: &[AgentTask],
        request: &str,
        context: &str,
        first_number: usize,
    ) -> Vec<TaskOutcome> {
        let runs = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| self.run_task(first_number + i, task, request, context));

        if self.max_concurrent == 0 {
            futures::future::join_all(runs).await
        } else {
            stream::iter(runs)
                .buffered(self.max_concurrent)
                .collect()
                .await
        }
    }

    async fn run_task(
        &self,
        number: usize,
        task: &AgentTask,
        request: &str,
        context: &str,
    ) -> TaskOutcome {
        let label = format!("Agent {number}: {}", task.role);
        self.ctx.notify(&label, "Started");

        let conversation = vec![
            Message::system(SUB_AGENT_PROMPT),
            Message::user(task_input(task, request, context)),
        ];
        let agent = AgentLoop::new(
            label.clone(),
            Arc::clone(&self.client),
            self.executor.clone(),
            self.max_iterations,
        )
        .with_context(self.ctx.clone());

        let run = agent.run(conversation).await;
        let mut output = run.final_text();
        if output.is_empty() {
            output = "(no output)".to_string();
        }
        let failed = run.failed();

        self.ctx
            .notify(&label, if failed { "Failed" } else { "Completed" });

        TaskOutcome {
            role: task.role.clone(),
            output,
            failed,
        }
    }
}

/// User message for one sub-agent. The instructions are always the last line
/// block so the agent reads them after the context.
fn task_input(task: &AgentTask, request: &str, context: &str) -> String {
    let mut input = format!("Original request: {request}\n\n");
    if !context.is_empty() {
        input.push_str("Results from previous agents:\n");
        input.push_str(context);
        input.push_str("\n\n");
    }
    input.push_str(&format!("Your task as {}:\n{}", task.role, task.instructions));
    input
}

// ─── Tests ──────────────────────────────────────────────────────────────────
