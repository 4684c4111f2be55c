//! Dynamic Switch Controller: one-shot redirection of the general agent.
//!
//! After the general-purpose loop finishes, its run is inspected once for a
//! bulk-operation signal. Two signals count:
//!
//! - a call to the `signal_bulk_operation` tool (structured, preferred)
//! - one of the configured marker phrases in the agent's text or thoughts
//!
//! With a signal and more than `threshold` discovered items, the request is
//! redirected to one parallel task per item. Otherwise the loop's own answer
//! stands.

use std::collections::HashSet;

use serde_json::Value;

use crate::inference::config::AgentsConfig;

use super::agent_loop::LoopRun;
use super::tool_registry::{BULK_SIGNAL_TOOL, THINK_TOOL};
use super::types::{AgentOutcome, AgentTask, ToolResult};

/// Object fields that name an item, in preference order.
const ITEM_FIELDS: &[&str] = &["path", "url", "file", "name"];

/// Object fields that hold a list of items.
const LIST_FIELDS: &[&str] = &["files", "urls", "items", "results", "entries", "paths"];

#[derive(Debug, Clone)]
pub struct DynamicSwitch {
    threshold: usize,
    markers: Vec<String>,
    discovery_tools: Vec<String>,
}

/// What the run signalled.
#[derive(Debug, Default)]
struct BulkSignal {
    explicit_items: Vec<String>,
    reason: Option<String>,
    tool_signal: bool,
    marker_signal: bool,
}

impl BulkSignal {
    fn present(&self) -> bool {
        self.tool_signal || self.marker_signal
    }
}

impl DynamicSwitch {
    pub fn new(threshold: usize, markers: Vec<String>, discovery_tools: Vec<String>) -> Self {
        Self {
            threshold,
            markers,
            discovery_tools,
        }
    }

    pub fn from_settings(settings: &AgentsConfig) -> Self {
        Self::new(
            settings.bulk_threshold,
            settings.bulk_markers.clone(),
            settings.discovery_tools.clone(),
        )
    }

    /// Decide between the loop's own answer and a parallel fan-out.
    pub fn evaluate(&self, run: &LoopRun) -> AgentOutcome {
        let signal = self.detect(run);
        if !signal.present() {
            return AgentOutcome::Finished(run.final_text());
        }

        let items = if signal.explicit_items.is_empty() {
            self.discovered_items(run)
        } else {
            signal.explicit_items.clone()
        };

        if items.len() <= self.threshold {
            tracing::info!(
                items = items.len(),
                threshold = self.threshold,
                "bulk signal without enough items, keeping direct answer"
            );
            return AgentOutcome::Finished(run.final_text());
        }

        tracing::info!(
            items = items.len(),
            tool_signal = signal.tool_signal,
            marker_signal = signal.marker_signal,
            "redirecting to parallel fan-out"
        );

        let tasks = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let instructions = match &signal.reason {
                    Some(reason) => format!("{reason}\nHandle only this item: {item}"),
                    None => format!("Handle only this item: {item}"),
                };
                AgentTask::new(format!("Item Processor {}", i + 1), instructions)
            })
            .collect();

        AgentOutcome::Redirect(tasks)
    }

    fn detect(&self, run: &LoopRun) -> BulkSignal {
        let mut signal = BulkSignal::default();
        let mut seen = HashSet::new();

        for invocation in &run.tool_history {
            let call = &invocation.call;
            if call.name == BULK_SIGNAL_TOOL {
                signal.tool_signal = true;
                let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
                if let Some(items) = args.get("items").and_then(Value::as_array) {
                    for item in items.iter().filter_map(Value::as_str) {
                        push_unique(&mut signal.explicit_items, &mut seen, item);
                    }
                }
                if let Some(reason) = args.get("reason").and_then(Value::as_str) {
                    if !reason.trim().is_empty() {
                        signal.reason = Some(reason.trim().to_string());
                    }
                }
            } else if call.name == THINK_TOOL && self.has_marker(&call.arguments) {
                signal.marker_signal = true;
            }
        }

        if run.assistant_texts().any(|t| self.has_marker(t)) {
            signal.marker_signal = true;
        }

        signal
    }

    fn has_marker(&self, text: &str) -> bool {
        self.markers
            .iter()
            .any(|m| !m.is_empty() && text.contains(m.as_str()))
    }

    /// Items found in successful results of discovery tools, deduplicated in
    /// first-seen order.
    pub fn discovered_items(&self, run: &LoopRun) -> Vec<String> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();

        for invocation in &run.tool_history {
            if !self.discovery_tools.iter().any(|t| *t == invocation.call.name) {
                continue;
            }
            if let ToolResult::Success(value) = &invocation.result {
                collect_items(value, &mut items, &mut seen);
            }
        }

        items
    }
}

fn push_unique(items: &mut Vec<String>, seen: &mut HashSet<String>, item: &str) {
    let item = item.trim();
    if !item.is_empty() && seen.insert(item.to_string()) {
        items.push(item.to_string());
    }
}

fn collect_items(value: &Value, items: &mut Vec<String>, seen: &mut HashSet<String>) {
    match value {
        Value::Array(entries) => {
            for entry in entries {
                match entry {
                    Value::String(s) => push_unique(items, seen, s),
                    Value::Object(obj) => {
                        if let Some(name) = ITEM_FIELDS
                            .iter()
                            .find_map(|f| obj.get(*f).and_then(Value::as_str))
                        {
                            push_unique(items, seen, name);
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(obj) => {
            for field in LIST_FIELDS {
                if let Some(list) = obj.get(*field) {
                    collect_items(list, items, seen);
                }
            }
        }
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => collect_items(&parsed, items, seen),
            _ => {
                for line in text.lines() {
                    let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
                    push_unique(items, seen, line);
                }
            }
        },
        _ => {}
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
