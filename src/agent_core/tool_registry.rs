//! Tool Registry: name → implementation map plus the catalog sent to the model.
//!
//! Tools are external collaborators: the orchestration layer only sees the
//! name, the JSON-schema description, and the arguments/result envelope.
//! Two tools are built in because the loops depend on them: `think` and
//! `signal_bulk_operation`.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::inference::types::ToolDefinition;

/// Name of the built-in reasoning tool.
pub const THINK_TOOL: &str = "think";

/// Name of the built-in tool the model calls to request a fan-out.
pub const BULK_SIGNAL_TOOL: &str = "signal_bulk_operation";

// ─── Tool trait ─────────────────────────────────────────────────────────────

/// One callable tool.
///
/// `call` receives the parsed argument object. Returning `Err` (or panicking)
/// is reported to the model as an error result; it never ends the loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;

    /// Per-tool timeout override. `None` uses the executor default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn call(&self, args: Value) -> anyhow::Result<Value>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}

type BoxedHandler =
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>> + Send + Sync;

/// A tool backed by an async closure.
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    timeout: Option<Duration>,
    handler: Box<BoxedHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            timeout: None,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        (self.handler)(args).await
    }
}

// ─── Built-in tools ─────────────────────────────────────────────────────────

/// Pass-through scratchpad. The thought is acknowledged and otherwise only
/// surfaced to progress listeners by the loop.
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        THINK_TOOL
    }

    fn description(&self) -> &str {
        "Think through the problem step by step before acting. Has no side effects."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": {"type": "string", "description": "Your reasoning"}
            },
            "required": ["thought"]
        })
    }

    async fn call(&self, _args: Value) -> anyhow::Result<Value> {
        Ok(json!({"status": "ok"}))
    }
}

/// Structured fan-out request. The dynamic switch reads the `items` argument
/// from the loop's tool history; the call itself just acknowledges.
pub struct BulkSignalTool;

#[async_trait]
impl Tool for BulkSignalTool {
    fn name(&self) -> &str {
        BULK_SIGNAL_TOOL
    }

    fn description(&self) -> &str {
        "Call this when you have discovered many independent items (files, URLs) \
         that each need the same processing. Each item will be handled by its own agent."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "The discovered items, one per entry"
                },
                "reason": {"type": "string", "description": "What should be done with each item"}
            },
            "required": ["items"]
        })
    }

    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        let count = args
            .get("items")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .ok_or_else(|| anyhow::anyhow!("'items' must be an array of strings"))?;
        Ok(json!({"status": "acknowledged", "items": count}))
    }
}

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Immutable-after-setup registry of tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `think` and `signal_bulk_operation`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ThinkTool);
        registry.register(BulkSignalTool);
        registry
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice; keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Catalog for the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// A registry with only the named tools. Unknown names are ignored.
    pub fn restricted<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let tools = names
            .iter()
            .filter_map(|n| {
                let name = n.as_ref();
                self.tools.get(name).map(|t| (name.to_string(), Arc::clone(t)))
            })
            .collect();
        Self { tools }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> FnTool {
        FnTool::new(
            "echo",
            "Echo the arguments",
            json!({"type": "object"}),
            |args| async move { Ok(args) },
        )
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.tool_names(), vec![BULK_SIGNAL_TOOL, THINK_TOOL]);
        assert!(registry.contains(THINK_TOOL));
    }

    #[test]
    fn test_definitions_sorted_by_name() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(echo_tool());
        let names: Vec<String> = registry
            .definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["echo", BULK_SIGNAL_TOOL, THINK_TOOL]);
    }

    #[test]
    fn test_restricted_keeps_only_named() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(echo_tool());
        let planning = registry.restricted(&["think", "missing"]);
        assert_eq!(planning.len(), 1);
        assert!(planning.get("echo").is_none());
        assert!(planning.get(THINK_TOOL).is_some());
    }

    #[tokio::test]
    async fn test_fn_tool_call() {
        let tool = echo_tool();
        let out = tool.call(json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
        assert!(tool.timeout().is_none());
    }

    #[tokio::test]
    async fn test_bulk_signal_requires_items() {
        let ok = BulkSignalTool
            .call(json!({"items": ["a", "b"], "reason": "summarize"}))
            .await
            .unwrap();
        assert_eq!(ok["items"], 2);
        assert!(BulkSignalTool.call(json!({"reason": "x"})).await.is_err());
    }
}
